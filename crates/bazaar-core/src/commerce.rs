//! Orders and carts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::ProductVariant;
use crate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(ValidationError::field(
                "status",
                format!("'{other}' is not a valid order status"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_variant_id: i64,
    pub quantity: i32,
    /// Variant price copied when the item was created.
    pub price: Option<Decimal>,
}

/// A validated order line ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_variant_id: i64,
    pub quantity: i32,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Who a cart belongs to: a signed-in user or an anonymous session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartOwner {
    User(i64),
    Session(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: i64,
    pub user_id: Option<i64>,
    pub session_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    #[must_use]
    pub fn is_owned_by(&self, owner: &CartOwner) -> bool {
        match owner {
            CartOwner::User(id) => self.user_id == Some(*id),
            CartOwner::Session(key) => {
                self.user_id.is_none() && self.session_key.as_deref() == Some(key.as_str())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub product_variant_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartDetail {
    #[serde(flatten)]
    pub cart: Cart,
    pub items: Vec<CartItem>,
}

pub const MAX_SESSION_KEY_LEN: usize = 40;

/// Validate an anonymous cart session key.
///
/// # Errors
///
/// Returns a validation error when the key is blank or longer than 40 chars.
pub fn validate_session_key(key: &str) -> Result<String, ValidationError> {
    let key = key.trim();
    if key.is_empty() || key.len() > MAX_SESSION_KEY_LEN {
        return Err(ValidationError::field(
            "session_key",
            format!("session key must be 1-{MAX_SESSION_KEY_LEN} characters"),
        ));
    }
    Ok(key.to_string())
}

/// Validate a positive line quantity.
///
/// # Errors
///
/// Returns a validation error for quantities below one.
pub fn validate_quantity(quantity: i32) -> Result<(), ValidationError> {
    if quantity < 1 {
        return Err(ValidationError::field(
            "quantity",
            "quantity must be at least 1",
        ));
    }
    Ok(())
}

/// Build an order line from a variant, checking the requested quantity
/// against the variant's current stock and snapshotting its price.
///
/// A quantity equal to the stock is accepted.
///
/// # Errors
///
/// Returns [`ValidationError::QuantityExceedsStock`] when `quantity > stock`.
pub fn order_line_for(
    variant: &ProductVariant,
    quantity: i32,
) -> Result<NewOrderItem, ValidationError> {
    validate_quantity(quantity)?;
    if quantity > variant.stock {
        return Err(ValidationError::QuantityExceedsStock {
            variant_id: variant.id,
            requested: quantity,
            available: variant.stock,
        });
    }
    Ok(NewOrderItem {
        product_variant_id: variant.id,
        quantity,
        price: variant.price,
    })
}

/// Order totals are stored as `NUMERIC(20, 0)`.
pub const MAX_TOTAL_DIGITS: u32 = 20;

/// `existing` plus the value of `lines`, provided the result still fits in
/// [`MAX_TOTAL_DIGITS`] digits.
///
/// # Errors
///
/// Returns a validation error on `quantity` when the total would not fit.
pub fn checked_order_total(
    existing: Decimal,
    lines: &[NewOrderItem],
) -> Result<Decimal, ValidationError> {
    let limit = Decimal::from_i128_with_scale(10_i128.pow(MAX_TOTAL_DIGITS), 0);
    let too_large = || {
        ValidationError::field(
            "quantity",
            format!("order total would exceed {MAX_TOTAL_DIGITS} digits"),
        )
    };
    let mut total = existing;
    for line in lines {
        let value = line
            .price
            .unwrap_or(Decimal::ZERO)
            .checked_mul(Decimal::from(line.quantity))
            .ok_or_else(too_large)?;
        total = total.checked_add(value).ok_or_else(too_large)?;
    }
    if total >= limit {
        return Err(too_large());
    }
    Ok(total)
}

/// Sum of `price * quantity` over all lines. Unpriced lines count as zero.
#[must_use]
pub fn order_total<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Option<Decimal>, i32)>,
{
    lines
        .into_iter()
        .map(|(price, quantity)| price.unwrap_or(Decimal::ZERO) * Decimal::from(quantity))
        .sum()
}
