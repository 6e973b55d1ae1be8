//! `orders`, `order_items`, `carts`, and `cart_items`.

use async_trait::async_trait;
use bazaar_core::accounts::NewScoreEvent;
use bazaar_core::commerce::{Cart, CartItem, CartOwner, NewOrderItem, Order, OrderItem, OrderStatus};
use bazaar_core::store::{CartRepo, OrderRepo};
use bazaar_core::StoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};

use crate::accounts::insert_score_event;
use crate::{store_err, PgStore};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: i64,
    pub status: String,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<OrderStatus>().map_err(|_| {
            StoreError::Backend(format!(
                "order {} has unknown status '{}'",
                row.id, row.status
            ))
        })?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            status,
            total: row.total,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    pub product_variant_id: i64,
    pub quantity: i32,
    pub price: Option<Decimal>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_variant_id: row.product_variant_id,
            quantity: row.quantity,
            price: row.price,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub session_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            session_key: row.session_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartItemRow {
    pub id: i64,
    pub cart_id: i64,
    pub product_variant_id: i64,
    pub quantity: i32,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: row.id,
            cart_id: row.cart_id,
            product_variant_id: row.product_variant_id,
            quantity: row.quantity,
        }
    }
}

const ORDER_COLUMNS: &str = "id, user_id, status, total, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_variant_id, quantity, price";
const CART_COLUMNS: &str = "id, user_id, session_key, created_at, updated_at";

// ---------------------------------------------------------------------------
// Shared transactional steps
// ---------------------------------------------------------------------------

/// Insert the lines and recompute the order total from every stored line.
async fn insert_order_items(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i64,
    items: &[NewOrderItem],
) -> Result<Vec<OrderItem>, StoreError> {
    let variant_ids: Vec<i64> = items.iter().map(|i| i.product_variant_id).collect();
    let quantities: Vec<i32> = items.iter().map(|i| i.quantity).collect();
    let prices: Vec<Option<Decimal>> = items.iter().map(|i| i.price).collect();

    let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
        "INSERT INTO order_items (order_id, product_variant_id, quantity, price) \
         SELECT $1, variant_id, quantity, price \
         FROM UNNEST($2::BIGINT[], $3::INT[], $4::NUMERIC[]) AS t(variant_id, quantity, price) \
         RETURNING {ORDER_ITEM_COLUMNS}"
    ))
    .bind(order_id)
    .bind(&variant_ids)
    .bind(&quantities)
    .bind(&prices)
    .fetch_all(&mut **tx)
    .await
    .map_err(store_err)?;

    sqlx::query(
        "UPDATE orders \
         SET total = (SELECT COALESCE(SUM(price * quantity), 0) \
                      FROM order_items WHERE order_id = $1), \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(order_id)
    .execute(&mut **tx)
    .await
    .map_err(store_err)?;

    let mut items: Vec<OrderItem> = rows.into_iter().map(OrderItem::from).collect();
    items.sort_by_key(|i| i.id);
    Ok(items)
}

// ---------------------------------------------------------------------------
// orders / order_items
// ---------------------------------------------------------------------------

#[async_trait]
impl OrderRepo for PgStore {
    async fn create_order(&self, user_id: i64) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (user_id) VALUES ($1) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Order::try_from(row)
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Order::try_from).transpose()
    }

    async fn list_orders(&self, user_id: Option<i64>) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::BIGINT IS NULL OR user_id = $1) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn list_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn add_order_items(
        &self,
        order_id: i64,
        items: &[NewOrderItem],
    ) -> Result<Vec<OrderItem>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;
        if exists.is_none() {
            return Err(StoreError::not_found("order", order_id));
        }

        let inserted = insert_order_items(&mut tx, order_id, items).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(inserted)
    }

    async fn update_order_status(
        &self,
        id: i64,
        status: OrderStatus,
        score: Option<&NewScoreEvent>,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;
        let order = row
            .map(Order::try_from)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("order", id))?;

        // Dropping `tx` on a conflict rolls the status back.
        if let Some(event) = score {
            insert_score_event(&mut *tx, event).await?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(order)
    }
}

// ---------------------------------------------------------------------------
// carts / cart_items
// ---------------------------------------------------------------------------

fn owner_binds(owner: &CartOwner) -> (Option<i64>, Option<&str>) {
    match owner {
        CartOwner::User(id) => (Some(*id), None),
        CartOwner::Session(key) => (None, Some(key.as_str())),
    }
}

#[async_trait]
impl CartRepo for PgStore {
    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, StoreError> {
        let (user_id, session_key) = owner_binds(owner);
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "SELECT {CART_COLUMNS} FROM carts \
             WHERE ($1::BIGINT IS NOT NULL AND user_id = $1) \
                OR ($1::BIGINT IS NULL AND user_id IS NULL AND session_key = $2) \
             LIMIT 1"
        ))
        .bind(user_id)
        .bind(session_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Cart::from))
    }

    async fn create_cart(&self, owner: &CartOwner) -> Result<Cart, StoreError> {
        let (user_id, session_key) = owner_binds(owner);
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "INSERT INTO carts (user_id, session_key) VALUES ($1, $2) RETURNING {CART_COLUMNS}"
        ))
        .bind(user_id)
        .bind(session_key)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn list_cart_items(&self, cart_id: i64) -> Result<Vec<CartItem>, StoreError> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            "SELECT id, cart_id, product_variant_id, quantity FROM cart_items \
             WHERE cart_id = $1 ORDER BY id",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(CartItem::from).collect())
    }

    async fn add_cart_item(
        &self,
        cart_id: i64,
        variant_id: i64,
        quantity: i32,
    ) -> Result<CartItem, StoreError> {
        let row = sqlx::query_as::<_, CartItemRow>(
            "INSERT INTO cart_items (cart_id, product_variant_id, quantity) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (cart_id, product_variant_id) \
             DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity \
             RETURNING id, cart_id, product_variant_id, quantity",
        )
        .bind(cart_id)
        .bind(variant_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn set_cart_item_quantity(
        &self,
        cart_id: i64,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartItem, StoreError> {
        let row = sqlx::query_as::<_, CartItemRow>(
            "UPDATE cart_items SET quantity = $3 WHERE id = $2 AND cart_id = $1 \
             RETURNING id, cart_id, product_variant_id, quantity",
        )
        .bind(cart_id)
        .bind(item_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(CartItem::from)
            .ok_or_else(|| StoreError::not_found("cart item", item_id))
    }

    async fn remove_cart_item(&self, cart_id: i64, item_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $2 AND cart_id = $1")
            .bind(cart_id)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        crate::deleted(result.rows_affected(), "cart item", item_id)
    }

    async fn checkout_cart(
        &self,
        cart_id: i64,
        user_id: i64,
        items: &[NewOrderItem],
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let touched = sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::not_found("cart", cart_id));
        }

        let order_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO orders (user_id) VALUES ($1) RETURNING id",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        insert_order_items(&mut tx, order_id, items).await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Order::try_from(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_row(status: &str) -> OrderRow {
        let now = Utc::now();
        OrderRow {
            id: 3,
            user_id: 1,
            status: status.to_string(),
            total: Decimal::new(4500, 0),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn order_row_parses_known_status() {
        let order = Order::try_from(order_row("processing")).expect("known status");
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.total, Decimal::new(4500, 0));
    }

    #[test]
    fn order_row_with_unknown_status_is_backend_error() {
        let err = Order::try_from(order_row("shipped")).expect_err("unknown status");
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("shipped")));
    }

    #[test]
    fn session_owner_binds_only_the_key() {
        let owner = CartOwner::Session("abc".to_string());
        assert_eq!(owner_binds(&owner), (None, Some("abc")));
        assert_eq!(owner_binds(&CartOwner::User(9)), (Some(9), None));
    }
}
