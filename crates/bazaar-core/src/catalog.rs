//! Catalog entities: collections, attributes, products, images, and variants.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectionInput {
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent_id: Option<i64>,
}

/// An axis of variation (e.g. "Color") declared by a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: i64,
    pub title: String,
    /// `None` for a global attribute that no collection requires.
    pub collection_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttributeInput {
    pub title: String,
    pub collection_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub id: i64,
    pub attribute_id: i64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeWithValues {
    #[serde(flatten)]
    pub attribute: Attribute,
    pub values: Vec<AttributeValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionDetail {
    #[serde(flatten)]
    pub collection: Collection,
    pub subcollections: Vec<CollectionRef>,
    pub attributes: Vec<AttributeWithValues>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionRef {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub collection_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductInput {
    pub title: String,
    pub description: String,
    pub collection_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: i64,
    pub product_id: i64,
    pub image: String,
}

/// A purchasable configuration of a product.
///
/// `attribute_value_ids` is the full association set; writes always replace it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub price: Option<Decimal>,
    pub stock: i32,
    pub attribute_value_ids: Vec<i64>,
}

/// Fields persisted for a variant create or full update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRecord {
    pub product_id: i64,
    pub price: Option<Decimal>,
    pub stock: i32,
    pub attribute_value_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VariantInput {
    pub product_id: i64,
    pub attribute_ids: Vec<i64>,
    pub price: Option<Decimal>,
    pub stock: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantDetail {
    pub id: i64,
    pub product_id: i64,
    pub attributes: Vec<AttributeValue>,
    pub price: Option<Decimal>,
    pub stock: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<VariantDetail>,
    pub images: Vec<ProductImage>,
}

/// Prices are whole currency units with at most this many digits.
pub const MAX_PRICE_DIGITS: u32 = 12;

/// Check a variant price: non-negative, no fractional part, at most
/// [`MAX_PRICE_DIGITS`] digits. Trailing fractional zeros are dropped.
///
/// # Errors
///
/// Returns a validation error on `price`.
pub fn validate_price(price: Option<Decimal>) -> Result<Option<Decimal>, ValidationError> {
    let Some(price) = price else {
        return Ok(None);
    };
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ValidationError::field(
            "price",
            "ensure this value is greater than or equal to 0",
        ));
    }
    let price = price.normalize();
    if price.scale() > 0 {
        return Err(ValidationError::field(
            "price",
            "ensure that there are no more than 0 decimal places",
        ));
    }
    if price >= Decimal::from(10_i64.pow(MAX_PRICE_DIGITS)) {
        return Err(ValidationError::field(
            "price",
            format!("ensure that there are no more than {MAX_PRICE_DIGITS} digits in total"),
        ));
    }
    Ok(Some(price))
}

/// Product list filter.
///
/// Every `(attribute title, value)` pair must be carried by at least one
/// variant of the product, and at least one variant must be priced within
/// `[min_price, max_price]` when either bound is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub collection_id: Option<i64>,
    pub attributes: Vec<(String, String)>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl ProductFilter {
    /// Parse the `attribute=Color:Red,Size:Small` query syntax.
    ///
    /// # Errors
    ///
    /// Returns a validation error for any pair without a `:` separator or
    /// with an empty side.
    pub fn parse_attribute_pairs(raw: &str) -> Result<Vec<(String, String)>, ValidationError> {
        raw.split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once(':').ok_or_else(|| {
                    ValidationError::field(
                        "attribute",
                        format!("expected 'Title:Value', got '{pair}'"),
                    )
                })?;
                let (key, value) = (key.trim(), value.trim());
                if key.is_empty() || value.is_empty() {
                    return Err(ValidationError::field(
                        "attribute",
                        format!("expected 'Title:Value', got '{pair}'"),
                    ));
                }
                Ok((key.to_string(), value.to_string()))
            })
            .collect()
    }

    #[must_use]
    pub fn has_price_bounds(&self) -> bool {
        self.min_price.is_some() || self.max_price.is_some()
    }

    #[must_use]
    pub fn price_in_bounds(&self, price: Option<Decimal>) -> bool {
        let Some(price) = price else {
            return false;
        };
        self.min_price.is_none_or(|min| price >= min)
            && self.max_price.is_none_or(|max| price <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_attribute_pairs_accepts_multiple_pairs() {
        let pairs = ProductFilter::parse_attribute_pairs("Color:Red, Size:Small").expect("parse");
        assert_eq!(
            pairs,
            vec![
                ("Color".to_string(), "Red".to_string()),
                ("Size".to_string(), "Small".to_string())
            ]
        );
    }

    #[test]
    fn parse_attribute_pairs_rejects_missing_separator() {
        let err = ProductFilter::parse_attribute_pairs("Color").expect_err("should fail");
        assert_eq!(err.field_name(), "attribute");
    }

    #[test]
    fn parse_attribute_pairs_rejects_empty_value() {
        assert!(ProductFilter::parse_attribute_pairs("Color:").is_err());
    }

    #[test]
    fn price_bounds_are_inclusive_and_skip_unpriced_variants() {
        let filter = ProductFilter {
            min_price: Some(Decimal::new(100, 0)),
            max_price: Some(Decimal::new(200, 0)),
            ..ProductFilter::default()
        };
        assert!(filter.price_in_bounds(Some(Decimal::new(100, 0))));
        assert!(filter.price_in_bounds(Some(Decimal::new(200, 0))));
        assert!(!filter.price_in_bounds(Some(Decimal::new(201, 0))));
        assert!(!filter.price_in_bounds(None));
    }
}
