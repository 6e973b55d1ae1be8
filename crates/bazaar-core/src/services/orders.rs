//! Orders and shopping carts.
//!
//! Stock is checked when a line is created but never decremented.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::accounts::User;
use crate::commerce::{
    checked_order_total, order_line_for, validate_quantity, Cart, CartDetail, CartItem,
    CartOwner, NewOrderItem, Order, OrderDetail, OrderItem, OrderStatus,
};
use crate::services::{found, order_completed_event};
use crate::store::{CartRepo, OrderRepo, VariantRepo};
use crate::{ServiceError, StoreError, ValidationError};

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepo>,
    variants: Arc<dyn VariantRepo>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderRepo>, variants: Arc<dyn VariantRepo>) -> Self {
        Self { orders, variants }
    }

    /// Open an empty pending order for `user`.
    ///
    /// # Errors
    ///
    /// Returns a store error on backend failure.
    pub async fn create_order(&self, user: &User) -> Result<Order, ServiceError> {
        let order = self.orders.create_order(user.id).await?;
        tracing::info!(order_id = order.id, user_id = user.id, "order created");
        Ok(order)
    }

    /// The caller's orders, or every order for staff.
    ///
    /// # Errors
    ///
    /// Returns a store error on backend failure.
    pub async fn list_orders(&self, user: &User) -> Result<Vec<Order>, ServiceError> {
        let scope = (!user.is_staff).then_some(user.id);
        Ok(self.orders.list_orders(scope).await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order or one the caller may not see.
    pub async fn get_order(&self, user: &User, id: i64) -> Result<OrderDetail, ServiceError> {
        let order = self.visible_order(user, id).await?;
        let items = self.orders.list_order_items(order.id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Add a line, snapshotting the variant's price and recomputing the total.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown variant, a quantity below
    /// one, or a quantity above the variant's stock.
    pub async fn add_item(
        &self,
        user: &User,
        order_id: i64,
        variant_id: i64,
        quantity: i32,
    ) -> Result<OrderItem, ServiceError> {
        let order = self.visible_order(user, order_id).await?;
        let line = line_for(self.variants.as_ref(), variant_id, quantity).await?;
        checked_order_total(order.total, std::slice::from_ref(&line))?;
        let mut items = self.orders.add_order_items(order.id, &[line]).await?;
        items
            .pop()
            .ok_or_else(|| StoreError::Backend("order item was not returned".into()).into())
    }

    /// Change an order's status. Moving into `completed` records the order's
    /// score event with the status change; if the event conflicts, the status
    /// is left as it was.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order, or a store conflict if the
    /// order was already scored.
    pub async fn update_status(&self, id: i64, status: OrderStatus) -> Result<Order, ServiceError> {
        let before = found(self.orders.get_order(id).await?, "order", id)?;
        let score = (status == OrderStatus::Completed && before.status != OrderStatus::Completed)
            .then(|| order_completed_event(before.user_id, id, Utc::now().date_naive()));

        let order = self
            .orders
            .update_order_status(id, status, score.as_ref())
            .await?;
        tracing::info!(
            order_id = id,
            from = %before.status,
            to = %status,
            scored = score.is_some(),
            "order status changed"
        );
        Ok(order)
    }

    async fn visible_order(&self, user: &User, id: i64) -> Result<Order, ServiceError> {
        match self.orders.get_order(id).await? {
            Some(order) if user.is_staff || order.user_id == user.id => Ok(order),
            _ => Err(StoreError::not_found("order", id).into()),
        }
    }
}

#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartRepo>,
    orders: Arc<dyn OrderRepo>,
    variants: Arc<dyn VariantRepo>,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartRepo>,
        orders: Arc<dyn OrderRepo>,
        variants: Arc<dyn VariantRepo>,
    ) -> Self {
        Self {
            carts,
            orders,
            variants,
        }
    }

    /// The owner's cart, created empty on first access.
    ///
    /// # Errors
    ///
    /// Returns a store error on backend failure.
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<CartDetail, ServiceError> {
        let cart = self.cart_for(owner).await?;
        let items = self.carts.list_cart_items(cart.id).await?;
        Ok(CartDetail { cart, items })
    }

    /// Add `quantity` of a variant. An existing line for the same variant is
    /// merged, and the merged quantity must still fit the stock.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown variant, a quantity below
    /// one, or a merged quantity above stock.
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        variant_id: i64,
        quantity: i32,
    ) -> Result<CartItem, ServiceError> {
        validate_quantity(quantity)?;
        let cart = self.cart_for(owner).await?;
        let already = self
            .carts
            .list_cart_items(cart.id)
            .await?
            .into_iter()
            .find(|item| item.product_variant_id == variant_id)
            .map_or(0, |item| item.quantity);
        let merged = already.saturating_add(quantity);
        line_for(self.variants.as_ref(), variant_id, merged).await?;

        Ok(self
            .carts
            .add_cart_item(cart.id, variant_id, quantity)
            .await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for a line outside the owner's cart, or a
    /// validation error for a bad quantity.
    pub async fn update_item(
        &self,
        owner: &CartOwner,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartItem, ServiceError> {
        let cart = self.cart_for(owner).await?;
        let item = self.cart_item(&cart, item_id).await?;
        line_for(self.variants.as_ref(), item.product_variant_id, quantity).await?;
        Ok(self
            .carts
            .set_cart_item_quantity(cart.id, item_id, quantity)
            .await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for a line outside the owner's cart.
    pub async fn remove_item(&self, owner: &CartOwner, item_id: i64) -> Result<(), ServiceError> {
        let cart = self.cart_for(owner).await?;
        self.cart_item(&cart, item_id).await?;
        Ok(self.carts.remove_cart_item(cart.id, item_id).await?)
    }

    /// Turn the user's cart into a pending order and empty the cart.
    ///
    /// Every line goes through the same stock check and price snapshot as
    /// [`OrderService::add_item`].
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty cart or any line that no
    /// longer fits its variant's stock.
    pub async fn checkout(&self, user: &User) -> Result<OrderDetail, ServiceError> {
        let cart = self.cart_for(&CartOwner::User(user.id)).await?;
        let items = self.carts.list_cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(ValidationError::field("items", "cart is empty").into());
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            lines.push(line_for(self.variants.as_ref(), item.product_variant_id, item.quantity).await?);
        }
        checked_order_total(Decimal::ZERO, &lines)?;

        let order = self.carts.checkout_cart(cart.id, user.id, &lines).await?;
        tracing::info!(order_id = order.id, cart_id = cart.id, lines = lines.len(), "cart checked out");
        let items = self.orders.list_order_items(order.id).await?;
        Ok(OrderDetail { order, items })
    }

    async fn cart_for(&self, owner: &CartOwner) -> Result<Cart, ServiceError> {
        if let Some(cart) = self.carts.find_cart(owner).await? {
            return Ok(cart);
        }
        Ok(self.carts.create_cart(owner).await?)
    }

    async fn cart_item(&self, cart: &Cart, item_id: i64) -> Result<CartItem, ServiceError> {
        self.carts
            .list_cart_items(cart.id)
            .await?
            .into_iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| StoreError::not_found("cart item", item_id).into())
    }
}

async fn line_for(
    variants: &dyn VariantRepo,
    variant_id: i64,
    quantity: i32,
) -> Result<NewOrderItem, ServiceError> {
    let variant = variants.get_variant(variant_id).await?.ok_or_else(|| {
        ValidationError::field(
            "product_variant_id",
            format!("invalid pk \"{variant_id}\" - object does not exist"),
        )
    })?;
    Ok(order_line_for(&variant, quantity)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CollectionInput, ProductInput, VariantRecord};
    use crate::memory::MemoryStore;
    use crate::services::ScoreService;
    use crate::store::{CollectionRepo, ProductRepo, UserRepo};

    struct Fixture {
        store: Arc<MemoryStore>,
        orders: OrderService,
        carts: CartService,
        user: User,
        variant_id: i64,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let collection = store
            .create_collection(&CollectionInput {
                title: "Bags".into(),
                ..CollectionInput::default()
            })
            .await
            .expect("collection");
        let product = store
            .create_product(
                &ProductInput {
                    title: "Tote".into(),
                    description: String::new(),
                    collection_id: collection.id,
                },
                &[],
            )
            .await
            .expect("product");
        let variant = store
            .create_variant(&VariantRecord {
                product_id: product.id,
                price: Some(Decimal::new(1500, 0)),
                stock: 3,
                attribute_value_ids: vec![],
            })
            .await
            .expect("variant");
        let (user, _) = store.get_or_create_user("09121234567").await.expect("user");

        Fixture {
            orders: OrderService::new(store.clone(), store.clone()),
            carts: CartService::new(store.clone(), store.clone(), store.clone()),
            store,
            user,
            variant_id: variant.id,
        }
    }

    #[tokio::test]
    async fn quantity_equal_to_stock_is_accepted() {
        let f = fixture().await;
        let order = f.orders.create_order(&f.user).await.expect("order");
        let item = f
            .orders
            .add_item(&f.user, order.id, f.variant_id, 3)
            .await
            .expect("item");
        assert_eq!(item.price, Some(Decimal::new(1500, 0)));

        let detail = f.orders.get_order(&f.user, order.id).await.expect("detail");
        assert_eq!(detail.order.total, Decimal::new(4500, 0));
    }

    #[tokio::test]
    async fn quantity_above_stock_is_rejected() {
        let f = fixture().await;
        let order = f.orders.create_order(&f.user).await.expect("order");
        let err = f
            .orders
            .add_item(&f.user, order.id, f.variant_id, 4)
            .await
            .expect_err("over stock");
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::QuantityExceedsStock {
                requested: 4,
                available: 3,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn total_beyond_storable_digits_is_rejected() {
        let f = fixture().await;
        let variant = f
            .store
            .get_variant(f.variant_id)
            .await
            .expect("lookup")
            .expect("variant");
        f.store
            .replace_variant(
                variant.id,
                &VariantRecord {
                    product_id: variant.product_id,
                    price: Some(Decimal::new(999_999_999_999, 0)),
                    stock: i32::MAX,
                    attribute_value_ids: vec![],
                },
            )
            .await
            .expect("reprice");

        let order = f.orders.create_order(&f.user).await.expect("order");
        let err = f
            .orders
            .add_item(&f.user, order.id, f.variant_id, i32::MAX)
            .await
            .expect_err("total too large");
        assert!(matches!(err, ServiceError::Validation(_)));

        let detail = f.orders.get_order(&f.user, order.id).await.expect("detail");
        assert!(detail.items.is_empty());
    }

    #[tokio::test]
    async fn price_snapshot_survives_later_price_change() {
        let f = fixture().await;
        let order = f.orders.create_order(&f.user).await.expect("order");
        f.orders
            .add_item(&f.user, order.id, f.variant_id, 1)
            .await
            .expect("item");

        let variant = f
            .store
            .get_variant(f.variant_id)
            .await
            .expect("lookup")
            .expect("variant");
        f.store
            .replace_variant(
                variant.id,
                &VariantRecord {
                    product_id: variant.product_id,
                    price: Some(Decimal::new(9999, 0)),
                    stock: variant.stock,
                    attribute_value_ids: vec![],
                },
            )
            .await
            .expect("reprice");

        let detail = f.orders.get_order(&f.user, order.id).await.expect("detail");
        assert_eq!(detail.items[0].price, Some(Decimal::new(1500, 0)));
    }

    #[tokio::test]
    async fn other_users_order_is_hidden() {
        let f = fixture().await;
        let order = f.orders.create_order(&f.user).await.expect("order");
        let (stranger, _) = f
            .store
            .get_or_create_user("09350000000")
            .await
            .expect("stranger");
        let err = f
            .orders
            .get_order(&stranger, order.id)
            .await
            .expect_err("hidden");
        assert!(matches!(err, ServiceError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn completing_an_order_scores_it_once() {
        let f = fixture().await;
        let order = f.orders.create_order(&f.user).await.expect("order");
        f.orders
            .update_status(order.id, OrderStatus::Completed)
            .await
            .expect("complete");
        f.orders
            .update_status(order.id, OrderStatus::Completed)
            .await
            .expect("re-complete is not rescored");

        let summary = ScoreService::new(f.store.clone())
            .summary(f.user.id)
            .await
            .expect("summary");
        assert_eq!(summary.events.len(), 1);
    }

    #[tokio::test]
    async fn rescoring_conflict_keeps_previous_status() {
        let f = fixture().await;
        let order = f.orders.create_order(&f.user).await.expect("order");
        f.orders
            .update_status(order.id, OrderStatus::Completed)
            .await
            .expect("complete");
        f.orders
            .update_status(order.id, OrderStatus::Pending)
            .await
            .expect("reopen");

        let err = f
            .orders
            .update_status(order.id, OrderStatus::Completed)
            .await
            .expect_err("order already scored");
        assert!(matches!(err, ServiceError::Store(StoreError::Conflict(_))));

        let stored = f
            .store
            .get_order(order.id)
            .await
            .expect("lookup")
            .expect("order");
        assert_eq!(stored.status, OrderStatus::Pending);
        let summary = ScoreService::new(f.store.clone())
            .summary(f.user.id)
            .await
            .expect("summary");
        assert_eq!(summary.events.len(), 1);
    }

    #[tokio::test]
    async fn cart_lines_merge_and_check_stock() {
        let f = fixture().await;
        let owner = CartOwner::Session("anon-1".into());
        f.carts.add_item(&owner, f.variant_id, 1).await.expect("first");
        let merged = f.carts.add_item(&owner, f.variant_id, 2).await.expect("merge");
        assert_eq!(merged.quantity, 3);

        let err = f
            .carts
            .add_item(&owner, f.variant_id, 1)
            .await
            .expect_err("merged quantity exceeds stock");
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::QuantityExceedsStock { .. })
        ));

        let cart = f.carts.get_cart(&owner).await.expect("cart");
        assert_eq!(cart.items.len(), 1);
    }

    #[tokio::test]
    async fn checkout_creates_order_and_empties_cart() {
        let f = fixture().await;
        let owner = CartOwner::User(f.user.id);
        f.carts.add_item(&owner, f.variant_id, 2).await.expect("add");

        let order = f.carts.checkout(&f.user).await.expect("checkout");
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.order.total, Decimal::new(3000, 0));
        assert_eq!(order.order.status, OrderStatus::Pending);

        let cart = f.carts.get_cart(&owner).await.expect("cart");
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn empty_cart_cannot_check_out() {
        let f = fixture().await;
        let err = f.carts.checkout(&f.user).await.expect_err("empty");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn removing_a_foreign_line_is_not_found() {
        let f = fixture().await;
        let mine = CartOwner::Session("a".into());
        let theirs = CartOwner::Session("b".into());
        let item = f.carts.add_item(&mine, f.variant_id, 1).await.expect("add");
        let err = f
            .carts
            .remove_item(&theirs, item.id)
            .await
            .expect_err("foreign line");
        assert!(matches!(err, ServiceError::Store(StoreError::NotFound { .. })));
        f.carts.remove_item(&mine, item.id).await.expect("own line");
    }
}
