//! Attribute-selection rules for product variants.
//!
//! A variant must carry exactly one value for every attribute its product's
//! collection requires. Values for attributes outside the required set are
//! accepted. The same check runs on create and on full update.

use std::collections::{BTreeSet, HashSet};

use crate::catalog::AttributeValue;
use crate::VariantError;

/// Validate a proposed attribute-value selection against the required
/// attribute ids of the product's collection.
///
/// Duplicates are reported before missing attributes. The duplicate reported
/// is the first attribute, in proposal order, that appears twice; missing ids
/// are reported in ascending order.
///
/// # Errors
///
/// Returns [`VariantError::DuplicateAttributeSelection`] or
/// [`VariantError::MissingRequiredAttributes`].
pub fn validate_attribute_selection(
    required_attribute_ids: &[i64],
    proposed: &[AttributeValue],
) -> Result<(), VariantError> {
    let mut provided: HashSet<i64> = HashSet::with_capacity(proposed.len());
    for value in proposed {
        if !provided.insert(value.attribute_id) {
            return Err(VariantError::DuplicateAttributeSelection {
                attribute_id: value.attribute_id,
            });
        }
    }

    let missing: BTreeSet<i64> = required_attribute_ids
        .iter()
        .copied()
        .filter(|id| !provided.contains(id))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(VariantError::MissingRequiredAttributes {
            attribute_ids: missing.into_iter().collect(),
        })
    }
}

/// Resolve requested attribute-value ids against the rows that exist,
/// preserving request order.
///
/// # Errors
///
/// Returns [`VariantError::UnknownAttributeValues`] listing every id with no
/// matching row.
pub fn resolve_attribute_values(
    requested_ids: &[i64],
    found: &[AttributeValue],
) -> Result<Vec<AttributeValue>, VariantError> {
    let mut resolved = Vec::with_capacity(requested_ids.len());
    let mut unknown = BTreeSet::new();
    for id in requested_ids {
        match found.iter().find(|v| v.id == *id) {
            Some(value) => resolved.push(value.clone()),
            None => {
                unknown.insert(*id);
            }
        }
    }

    if unknown.is_empty() {
        Ok(resolved)
    } else {
        Err(VariantError::UnknownAttributeValues {
            attribute_value_ids: unknown.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLOR: i64 = 1;
    const SIZE: i64 = 2;

    fn value(id: i64, attribute_id: i64, v: &str) -> AttributeValue {
        AttributeValue {
            id,
            attribute_id,
            value: v.to_string(),
        }
    }

    #[test]
    fn missing_required_attribute_is_named() {
        let size_m = value(20, SIZE, "M");
        let err = validate_attribute_selection(&[COLOR], &[size_m]).expect_err("must fail");
        assert_eq!(
            err,
            VariantError::MissingRequiredAttributes {
                attribute_ids: vec![COLOR]
            }
        );
    }

    #[test]
    fn extra_attribute_values_are_accepted() {
        let blue = value(10, COLOR, "Blue");
        let size_m = value(20, SIZE, "M");
        assert!(validate_attribute_selection(&[COLOR], &[blue, size_m]).is_ok());
    }

    #[test]
    fn duplicate_selection_for_one_attribute_fails() {
        let blue = value(10, COLOR, "Blue");
        let red = value(11, COLOR, "Red");
        let err = validate_attribute_selection(&[COLOR], &[blue, red]).expect_err("must fail");
        assert_eq!(
            err,
            VariantError::DuplicateAttributeSelection {
                attribute_id: COLOR
            }
        );
    }

    #[test]
    fn duplicates_are_reported_before_missing() {
        let m = value(20, SIZE, "M");
        let l = value(21, SIZE, "L");
        let err = validate_attribute_selection(&[COLOR], &[m, l]).expect_err("must fail");
        assert!(matches!(
            err,
            VariantError::DuplicateAttributeSelection { attribute_id: SIZE }
        ));
    }

    #[test]
    fn missing_ids_are_sorted() {
        let err = validate_attribute_selection(&[9, 3, 5], &[]).expect_err("must fail");
        assert_eq!(
            err,
            VariantError::MissingRequiredAttributes {
                attribute_ids: vec![3, 5, 9]
            }
        );
    }

    #[test]
    fn empty_requirement_accepts_empty_selection() {
        assert!(validate_attribute_selection(&[], &[]).is_ok());
    }

    #[test]
    fn resolve_reports_every_unknown_id() {
        let found = vec![value(10, COLOR, "Blue")];
        let err = resolve_attribute_values(&[10, 99, 42], &found).expect_err("must fail");
        assert_eq!(
            err,
            VariantError::UnknownAttributeValues {
                attribute_value_ids: vec![42, 99]
            }
        );
    }

    #[test]
    fn resolve_keeps_request_order() {
        let found = vec![value(10, COLOR, "Blue"), value(20, SIZE, "M")];
        let resolved = resolve_attribute_values(&[20, 10], &found).expect("resolve");
        assert_eq!(resolved[0].id, 20);
        assert_eq!(resolved[1].id, 10);
    }
}
