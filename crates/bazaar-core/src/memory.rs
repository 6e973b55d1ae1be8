//! In-process implementation of every repository trait.
//!
//! Mirrors the Postgres schema's constraints closely enough for service and
//! HTTP tests: unique keys raise [`StoreError::Conflict`], restricted deletes
//! raise [`StoreError::Protected`], and cascades remove dependent rows.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::accounts::{BlacklistedAccessToken, NewScoreEvent, ScoreEvent, User};
use crate::catalog::{
    Attribute, AttributeInput, AttributeValue, Collection, CollectionInput, Product,
    ProductFilter, ProductImage, ProductInput, ProductVariant, VariantRecord,
};
use crate::commerce::{
    order_total, Cart, CartItem, CartOwner, NewOrderItem, Order, OrderItem, OrderStatus,
};
use crate::content::{
    Highlight, HighlightInput, HighlightMedia, HighlightMediaInput, Post, PostImage, PostInput,
};
use crate::otp::{NewOtp, Otp};
use crate::store::{
    AttributeRepo, CartRepo, CollectionRepo, HighlightRepo, OrderRepo, OtpRepo, PostRepo,
    ProductRepo, ScoreRepo, TokenBlacklistRepo, UserRepo, VariantRepo,
};
use crate::StoreError;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    users: Vec<User>,
    collections: Vec<Collection>,
    attributes: Vec<Attribute>,
    attribute_values: Vec<AttributeValue>,
    products: Vec<Product>,
    product_images: Vec<ProductImage>,
    variants: Vec<ProductVariant>,
    orders: Vec<Order>,
    order_items: Vec<OrderItem>,
    carts: Vec<Cart>,
    cart_items: Vec<CartItem>,
    otps: Vec<Otp>,
    blacklist: Vec<BlacklistedAccessToken>,
    score_events: Vec<ScoreEvent>,
    posts: Vec<Post>,
    post_images: Vec<PostImage>,
    highlights: Vec<Highlight>,
    highlight_media: Vec<HighlightMedia>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn drop_variants_where(&mut self, doomed: impl Fn(&ProductVariant) -> bool) {
        let ids: Vec<i64> = self
            .variants
            .iter()
            .filter(|v| doomed(v))
            .map(|v| v.id)
            .collect();
        self.variants.retain(|v| !ids.contains(&v.id));
        self.order_items
            .retain(|i| !ids.contains(&i.product_variant_id));
        self.cart_items
            .retain(|i| !ids.contains(&i.product_variant_id));
    }

    fn drop_attribute_values_where(&mut self, doomed: impl Fn(&AttributeValue) -> bool) {
        let ids: Vec<i64> = self
            .attribute_values
            .iter()
            .filter(|v| doomed(v))
            .map(|v| v.id)
            .collect();
        self.attribute_values.retain(|v| !ids.contains(&v.id));
        for variant in &mut self.variants {
            variant.attribute_value_ids.retain(|id| !ids.contains(id));
        }
    }

    fn push_images(&mut self, product_id: i64, images: &[String]) -> Vec<ProductImage> {
        images
            .iter()
            .map(|image| {
                let row = ProductImage {
                    id: self.id(),
                    product_id,
                    image: image.clone(),
                };
                self.product_images.push(row.clone());
                row
            })
            .collect()
    }

    fn check_score_event(&self, event: &NewScoreEvent) -> Result<(), StoreError> {
        if self.score_events.iter().any(|e| event.collides_with(e)) {
            return Err(StoreError::Conflict(format!(
                "duplicate {} score event for user {}",
                event.score_title, event.user_id
            )));
        }
        Ok(())
    }

    fn push_score_event(&mut self, event: &NewScoreEvent) -> ScoreEvent {
        let row = ScoreEvent {
            id: self.id(),
            user_id: event.user_id,
            score_title: event.score_title.clone(),
            points: event.points,
            event_date: event.event_date,
            order_id: event.order_id,
            created_at: Utc::now(),
        };
        self.score_events.push(row.clone());
        row
    }

    fn recompute_total(&mut self, order_id: i64) {
        let total = order_total(
            self.order_items
                .iter()
                .filter(|i| i.order_id == order_id)
                .map(|i| (i.price, i.quantity)),
        );
        if let Some(order) = self.orders.iter_mut().find(|o| o.id == order_id) {
            order.total = total;
            order.updated_at = Utc::now();
        }
    }

    fn insert_order_items(&mut self, order_id: i64, items: &[NewOrderItem]) -> Result<Vec<OrderItem>, StoreError> {
        for item in items {
            if item.quantity < 1 {
                return Err(StoreError::Conflict("order item quantity must be positive".into()));
            }
            if !self.variants.iter().any(|v| v.id == item.product_variant_id) {
                return Err(missing_reference("product_variant", item.product_variant_id));
            }
        }
        let mut saved = Vec::with_capacity(items.len());
        for item in items {
            let row = OrderItem {
                id: self.id(),
                order_id,
                product_variant_id: item.product_variant_id,
                quantity: item.quantity,
                price: item.price,
            };
            self.order_items.push(row.clone());
            saved.push(row);
        }
        self.recompute_total(order_id);
        Ok(saved)
    }

    fn product_matches(&self, product: &Product, filter: &ProductFilter) -> bool {
        if filter.collection_id.is_some_and(|c| c != product.collection_id) {
            return false;
        }
        let variants: Vec<&ProductVariant> = self
            .variants
            .iter()
            .filter(|v| v.product_id == product.id)
            .collect();

        let pair_matches = |title: &str, value: &str| {
            variants.iter().any(|variant| {
                variant.attribute_value_ids.iter().any(|value_id| {
                    self.attribute_values
                        .iter()
                        .find(|v| v.id == *value_id)
                        .is_some_and(|v| {
                            v.value == value
                                && self
                                    .attributes
                                    .iter()
                                    .any(|a| a.id == v.attribute_id && a.title == title)
                        })
                })
            })
        };
        if !filter
            .attributes
            .iter()
            .all(|(title, value)| pair_matches(title, value))
        {
            return false;
        }

        !filter.has_price_bounds() || variants.iter().any(|v| filter.price_in_bounds(v.price))
    }
}

fn missing_reference(entity: &str, id: i64) -> StoreError {
    StoreError::Conflict(format!("referenced {entity} {id} does not exist"))
}

fn validate_variant_record(state: &State, record: &VariantRecord) -> Result<(), StoreError> {
    if record.stock < 0 {
        return Err(StoreError::Conflict("variant stock must not be negative".into()));
    }
    if !state.products.iter().any(|p| p.id == record.product_id) {
        return Err(missing_reference("product", record.product_id));
    }
    if let Some(id) = record
        .attribute_value_ids
        .iter()
        .find(|id| !state.attribute_values.iter().any(|v| v.id == **id))
    {
        return Err(missing_reference("attribute_value", *id));
    }
    Ok(())
}

/// Dedup while keeping first-seen order, like a join table's primary key.
fn distinct(ids: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[async_trait]
impl CollectionRepo for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<Collection>, StoreError> {
        Ok(self.lock().collections.clone())
    }

    async fn get_collection(&self, id: i64) -> Result<Option<Collection>, StoreError> {
        Ok(self.lock().collections.iter().find(|c| c.id == id).cloned())
    }

    async fn list_subcollections(&self, parent_id: i64) -> Result<Vec<Collection>, StoreError> {
        Ok(self
            .lock()
            .collections
            .iter()
            .filter(|c| c.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn create_collection(&self, input: &CollectionInput) -> Result<Collection, StoreError> {
        let mut state = self.lock();
        if let Some(parent_id) = input.parent_id {
            if !state.collections.iter().any(|c| c.id == parent_id) {
                return Err(missing_reference("collection", parent_id));
            }
        }
        let collection = Collection {
            id: state.id(),
            title: input.title.clone(),
            description: input.description.clone(),
            image: input.image.clone(),
            parent_id: input.parent_id,
        };
        state.collections.push(collection.clone());
        Ok(collection)
    }

    async fn update_collection(
        &self,
        id: i64,
        input: &CollectionInput,
    ) -> Result<Collection, StoreError> {
        let mut state = self.lock();
        let collection = state
            .collections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::not_found("collection", id))?;
        collection.title.clone_from(&input.title);
        collection.description.clone_from(&input.description);
        collection.image.clone_from(&input.image);
        collection.parent_id = input.parent_id;
        Ok(collection.clone())
    }

    async fn delete_collection(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.collections.iter().any(|c| c.id == id) {
            return Err(StoreError::not_found("collection", id));
        }
        if state.products.iter().any(|p| p.collection_id == id) {
            return Err(StoreError::Protected(format!(
                "collection {id} still has products"
            )));
        }
        if state.collections.iter().any(|c| c.parent_id == Some(id)) {
            return Err(StoreError::Protected(format!(
                "collection {id} still has subcollections"
            )));
        }
        state.collections.retain(|c| c.id != id);

        let attribute_ids: Vec<i64> = state
            .attributes
            .iter()
            .filter(|a| a.collection_id == Some(id))
            .map(|a| a.id)
            .collect();
        state.attributes.retain(|a| a.collection_id != Some(id));
        state.drop_attribute_values_where(|v| attribute_ids.contains(&v.attribute_id));
        Ok(())
    }
}

#[async_trait]
impl AttributeRepo for MemoryStore {
    async fn list_attributes(
        &self,
        collection_id: Option<i64>,
    ) -> Result<Vec<Attribute>, StoreError> {
        Ok(self
            .lock()
            .attributes
            .iter()
            .filter(|a| collection_id.is_none() || a.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn get_attribute(&self, id: i64) -> Result<Option<Attribute>, StoreError> {
        Ok(self.lock().attributes.iter().find(|a| a.id == id).cloned())
    }

    async fn create_attribute(&self, input: &AttributeInput) -> Result<Attribute, StoreError> {
        let mut state = self.lock();
        if let Some(collection_id) = input.collection_id {
            if !state.collections.iter().any(|c| c.id == collection_id) {
                return Err(missing_reference("collection", collection_id));
            }
        }
        let attribute = Attribute {
            id: state.id(),
            title: input.title.clone(),
            collection_id: input.collection_id,
        };
        state.attributes.push(attribute.clone());
        Ok(attribute)
    }

    async fn update_attribute(
        &self,
        id: i64,
        input: &AttributeInput,
    ) -> Result<Attribute, StoreError> {
        let mut state = self.lock();
        let attribute = state
            .attributes
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::not_found("attribute", id))?;
        attribute.title.clone_from(&input.title);
        attribute.collection_id = input.collection_id;
        Ok(attribute.clone())
    }

    async fn delete_attribute(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.attributes.iter().any(|a| a.id == id) {
            return Err(StoreError::not_found("attribute", id));
        }
        state.attributes.retain(|a| a.id != id);
        state.drop_attribute_values_where(|v| v.attribute_id == id);
        Ok(())
    }

    async fn required_attribute_ids(&self, collection_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .lock()
            .attributes
            .iter()
            .filter(|a| a.collection_id == Some(collection_id))
            .map(|a| a.id)
            .collect())
    }

    async fn create_attribute_value(
        &self,
        attribute_id: i64,
        value: &str,
    ) -> Result<AttributeValue, StoreError> {
        let mut state = self.lock();
        if !state.attributes.iter().any(|a| a.id == attribute_id) {
            return Err(missing_reference("attribute", attribute_id));
        }
        let row = AttributeValue {
            id: state.id(),
            attribute_id,
            value: value.to_string(),
        };
        state.attribute_values.push(row.clone());
        Ok(row)
    }

    async fn delete_attribute_value(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.attribute_values.iter().any(|v| v.id == id) {
            return Err(StoreError::not_found("attribute value", id));
        }
        state.drop_attribute_values_where(|v| v.id == id);
        Ok(())
    }

    async fn get_attribute_values(&self, ids: &[i64]) -> Result<Vec<AttributeValue>, StoreError> {
        Ok(self
            .lock()
            .attribute_values
            .iter()
            .filter(|v| ids.contains(&v.id))
            .cloned()
            .collect())
    }

    async fn list_values_for_attributes(
        &self,
        attribute_ids: &[i64],
    ) -> Result<Vec<AttributeValue>, StoreError> {
        Ok(self
            .lock()
            .attribute_values
            .iter()
            .filter(|v| attribute_ids.contains(&v.attribute_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProductRepo for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let state = self.lock();
        Ok(state
            .products
            .iter()
            .filter(|p| state.product_matches(p, filter))
            .cloned()
            .collect())
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        Ok(self.lock().products.iter().find(|p| p.id == id).cloned())
    }

    async fn create_product(
        &self,
        input: &ProductInput,
        images: &[String],
    ) -> Result<Product, StoreError> {
        let mut state = self.lock();
        if !state.collections.iter().any(|c| c.id == input.collection_id) {
            return Err(missing_reference("collection", input.collection_id));
        }
        let now = Utc::now();
        let product = Product {
            id: state.id(),
            title: input.title.clone(),
            description: input.description.clone(),
            collection_id: input.collection_id,
            created_at: now,
            updated_at: now,
        };
        state.products.push(product.clone());
        state.push_images(product.id, images);
        Ok(product)
    }

    async fn update_product(&self, id: i64, input: &ProductInput) -> Result<Product, StoreError> {
        let mut state = self.lock();
        if !state.collections.iter().any(|c| c.id == input.collection_id) {
            return Err(missing_reference("collection", input.collection_id));
        }
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        product.title.clone_from(&input.title);
        product.description.clone_from(&input.description);
        product.collection_id = input.collection_id;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.products.iter().any(|p| p.id == id) {
            return Err(StoreError::not_found("product", id));
        }
        state.products.retain(|p| p.id != id);
        state.product_images.retain(|i| i.product_id != id);
        state.drop_variants_where(|v| v.product_id == id);
        Ok(())
    }

    async fn add_product_images(
        &self,
        product_id: i64,
        images: &[String],
    ) -> Result<Vec<ProductImage>, StoreError> {
        let mut state = self.lock();
        if !state.products.iter().any(|p| p.id == product_id) {
            return Err(missing_reference("product", product_id));
        }
        Ok(state.push_images(product_id, images))
    }

    async fn list_product_images(
        &self,
        product_ids: &[i64],
    ) -> Result<Vec<ProductImage>, StoreError> {
        Ok(self
            .lock()
            .product_images
            .iter()
            .filter(|i| product_ids.contains(&i.product_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl VariantRepo for MemoryStore {
    async fn list_variants(
        &self,
        product_ids: Option<&[i64]>,
    ) -> Result<Vec<ProductVariant>, StoreError> {
        Ok(self
            .lock()
            .variants
            .iter()
            .filter(|v| product_ids.is_none_or(|ids| ids.contains(&v.product_id)))
            .cloned()
            .collect())
    }

    async fn get_variant(&self, id: i64) -> Result<Option<ProductVariant>, StoreError> {
        Ok(self.lock().variants.iter().find(|v| v.id == id).cloned())
    }

    async fn create_variant(&self, record: &VariantRecord) -> Result<ProductVariant, StoreError> {
        let mut state = self.lock();
        validate_variant_record(&state, record)?;
        let variant = ProductVariant {
            id: state.id(),
            product_id: record.product_id,
            price: record.price,
            stock: record.stock,
            attribute_value_ids: distinct(&record.attribute_value_ids),
        };
        state.variants.push(variant.clone());
        Ok(variant)
    }

    async fn replace_variant(
        &self,
        id: i64,
        record: &VariantRecord,
    ) -> Result<ProductVariant, StoreError> {
        let mut state = self.lock();
        validate_variant_record(&state, record)?;
        let variant = state
            .variants
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| StoreError::not_found("variant", id))?;
        variant.product_id = record.product_id;
        variant.price = record.price;
        variant.stock = record.stock;
        variant.attribute_value_ids = distinct(&record.attribute_value_ids);
        Ok(variant.clone())
    }

    async fn delete_variant(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.variants.iter().any(|v| v.id == id) {
            return Err(StoreError::not_found("variant", id));
        }
        state.drop_variants_where(|v| v.id == id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orders and carts
// ---------------------------------------------------------------------------

#[async_trait]
impl OrderRepo for MemoryStore {
    async fn create_order(&self, user_id: i64) -> Result<Order, StoreError> {
        let mut state = self.lock();
        if !state.users.iter().any(|u| u.id == user_id) {
            return Err(missing_reference("user", user_id));
        }
        let now = Utc::now();
        let order = Order {
            id: state.id(),
            user_id,
            status: OrderStatus::Pending,
            total: rust_decimal::Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        Ok(self.lock().orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, user_id: Option<i64>) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .iter()
            .filter(|o| user_id.is_none_or(|u| o.user_id == u))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn list_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .lock()
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn add_order_items(
        &self,
        order_id: i64,
        items: &[NewOrderItem],
    ) -> Result<Vec<OrderItem>, StoreError> {
        let mut state = self.lock();
        if !state.orders.iter().any(|o| o.id == order_id) {
            return Err(StoreError::not_found("order", order_id));
        }
        state.insert_order_items(order_id, items)
    }

    async fn update_order_status(
        &self,
        id: i64,
        status: OrderStatus,
        score: Option<&NewScoreEvent>,
    ) -> Result<Order, StoreError> {
        let mut state = self.lock();
        if !state.orders.iter().any(|o| o.id == id) {
            return Err(StoreError::not_found("order", id));
        }
        if let Some(event) = score {
            state.check_score_event(event)?;
            state.push_score_event(event);
        }
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}

#[async_trait]
impl CartRepo for MemoryStore {
    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, StoreError> {
        Ok(self
            .lock()
            .carts
            .iter()
            .find(|c| c.is_owned_by(owner))
            .cloned())
    }

    async fn create_cart(&self, owner: &CartOwner) -> Result<Cart, StoreError> {
        let mut state = self.lock();
        if state.carts.iter().any(|c| c.is_owned_by(owner)) {
            return Err(StoreError::Conflict("cart already exists for owner".into()));
        }
        let (user_id, session_key) = match owner {
            CartOwner::User(id) => {
                if !state.users.iter().any(|u| u.id == *id) {
                    return Err(missing_reference("user", *id));
                }
                (Some(*id), None)
            }
            CartOwner::Session(key) => (None, Some(key.clone())),
        };
        let now = Utc::now();
        let cart = Cart {
            id: state.id(),
            user_id,
            session_key,
            created_at: now,
            updated_at: now,
        };
        state.carts.push(cart.clone());
        Ok(cart)
    }

    async fn list_cart_items(&self, cart_id: i64) -> Result<Vec<CartItem>, StoreError> {
        Ok(self
            .lock()
            .cart_items
            .iter()
            .filter(|i| i.cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn add_cart_item(
        &self,
        cart_id: i64,
        variant_id: i64,
        quantity: i32,
    ) -> Result<CartItem, StoreError> {
        let mut state = self.lock();
        if !state.carts.iter().any(|c| c.id == cart_id) {
            return Err(StoreError::not_found("cart", cart_id));
        }
        if !state.variants.iter().any(|v| v.id == variant_id) {
            return Err(missing_reference("product_variant", variant_id));
        }
        if let Some(item) = state
            .cart_items
            .iter_mut()
            .find(|i| i.cart_id == cart_id && i.product_variant_id == variant_id)
        {
            item.quantity = item.quantity.saturating_add(quantity);
            return Ok(item.clone());
        }
        let item = CartItem {
            id: state.id(),
            cart_id,
            product_variant_id: variant_id,
            quantity,
        };
        state.cart_items.push(item.clone());
        Ok(item)
    }

    async fn set_cart_item_quantity(
        &self,
        cart_id: i64,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartItem, StoreError> {
        let mut state = self.lock();
        let item = state
            .cart_items
            .iter_mut()
            .find(|i| i.id == item_id && i.cart_id == cart_id)
            .ok_or_else(|| StoreError::not_found("cart item", item_id))?;
        item.quantity = quantity;
        Ok(item.clone())
    }

    async fn remove_cart_item(&self, cart_id: i64, item_id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        let before = state.cart_items.len();
        state
            .cart_items
            .retain(|i| !(i.id == item_id && i.cart_id == cart_id));
        if state.cart_items.len() == before {
            return Err(StoreError::not_found("cart item", item_id));
        }
        Ok(())
    }

    async fn checkout_cart(
        &self,
        cart_id: i64,
        user_id: i64,
        items: &[NewOrderItem],
    ) -> Result<Order, StoreError> {
        let mut state = self.lock();
        if !state.carts.iter().any(|c| c.id == cart_id) {
            return Err(StoreError::not_found("cart", cart_id));
        }
        if !state.users.iter().any(|u| u.id == user_id) {
            return Err(missing_reference("user", user_id));
        }
        let now = Utc::now();
        let order_id = state.id();
        state.orders.push(Order {
            id: order_id,
            user_id,
            status: OrderStatus::Pending,
            total: rust_decimal::Decimal::ZERO,
            created_at: now,
            updated_at: now,
        });
        if let Err(e) = state.insert_order_items(order_id, items) {
            state.orders.retain(|o| o.id != order_id);
            return Err(e);
        }
        state.cart_items.retain(|i| i.cart_id != cart_id);
        if let Some(cart) = state.carts.iter_mut().find(|c| c.id == cart_id) {
            cart.updated_at = now;
        }
        state
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", order_id))
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[async_trait]
impl UserRepo for MemoryStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.phone_number == phone_number)
            .cloned())
    }

    async fn get_or_create_user(&self, phone_number: &str) -> Result<(User, bool), StoreError> {
        let mut state = self.lock();
        if let Some(user) = state.users.iter().find(|u| u.phone_number == phone_number) {
            return Ok((user.clone(), false));
        }
        let user = User {
            id: state.id(),
            phone_number: phone_number.to_string(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
        };
        state.users.push(user.clone());
        Ok((user, true))
    }

    async fn upsert_staff_user(&self, phone_number: &str) -> Result<User, StoreError> {
        let mut state = self.lock();
        if let Some(user) = state
            .users
            .iter_mut()
            .find(|u| u.phone_number == phone_number)
        {
            user.is_staff = true;
            user.is_superuser = true;
            return Ok(user.clone());
        }
        let user = User {
            id: state.id(),
            phone_number: phone_number.to_string(),
            is_active: true,
            is_staff: true,
            is_superuser: true,
            date_joined: Utc::now(),
        };
        state.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl OtpRepo for MemoryStore {
    async fn insert_otp(&self, otp: &NewOtp) -> Result<Otp, StoreError> {
        let mut state = self.lock();
        let row = Otp {
            id: state.id(),
            phone_number: otp.phone_number.clone(),
            code: otp.code.clone(),
            created_at: otp.created_at,
            expires_at: otp.expires_at,
        };
        state.otps.push(row.clone());
        Ok(row)
    }

    async fn latest_matching_otp(
        &self,
        phone_number: &str,
        code: &str,
    ) -> Result<Option<Otp>, StoreError> {
        Ok(self
            .lock()
            .otps
            .iter()
            .filter(|o| o.phone_number == phone_number && o.code == code)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }
}

#[async_trait]
impl TokenBlacklistRepo for MemoryStore {
    async fn blacklist_jti(&self, jti: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.blacklist.iter().any(|t| t.jti == jti) {
            state.blacklist.push(BlacklistedAccessToken {
                jti: jti.to_string(),
                blacklisted_at: at,
            });
        }
        Ok(())
    }

    async fn is_jti_blacklisted(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(self.lock().blacklist.iter().any(|t| t.jti == jti))
    }
}

#[async_trait]
impl ScoreRepo for MemoryStore {
    async fn insert_score_event(&self, event: &NewScoreEvent) -> Result<ScoreEvent, StoreError> {
        let mut state = self.lock();
        state.check_score_event(event)?;
        Ok(state.push_score_event(event))
    }

    async fn list_score_events(&self, user_id: i64) -> Result<Vec<ScoreEvent>, StoreError> {
        Ok(self
            .lock()
            .score_events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

#[async_trait]
impl PostRepo for MemoryStore {
    async fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        let mut posts = self.lock().posts.clone();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(posts)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, StoreError> {
        Ok(self.lock().posts.iter().find(|p| p.id == id).cloned())
    }

    async fn create_post(
        &self,
        author_id: Option<i64>,
        input: &PostInput,
    ) -> Result<Post, StoreError> {
        let mut state = self.lock();
        let now = Utc::now();
        let post = Post {
            id: state.id(),
            title: input.title.clone(),
            content: input.content.clone(),
            author_id,
            created_at: now,
            updated_at: now,
        };
        state.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: i64, input: &PostInput) -> Result<Post, StoreError> {
        let mut state = self.lock();
        let post = state
            .posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("post", id))?;
        post.title.clone_from(&input.title);
        post.content.clone_from(&input.content);
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn delete_post(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.posts.iter().any(|p| p.id == id) {
            return Err(StoreError::not_found("post", id));
        }
        state.posts.retain(|p| p.id != id);
        state.post_images.retain(|i| i.post_id != Some(id));
        Ok(())
    }

    async fn add_post_image(
        &self,
        post_id: Option<i64>,
        image: &str,
    ) -> Result<PostImage, StoreError> {
        let mut state = self.lock();
        if let Some(post_id) = post_id {
            if !state.posts.iter().any(|p| p.id == post_id) {
                return Err(missing_reference("post", post_id));
            }
        }
        let row = PostImage {
            id: state.id(),
            post_id,
            image: image.to_string(),
        };
        state.post_images.push(row.clone());
        Ok(row)
    }

    async fn list_post_images(&self, post_ids: &[i64]) -> Result<Vec<PostImage>, StoreError> {
        Ok(self
            .lock()
            .post_images
            .iter()
            .filter(|i| i.post_id.is_some_and(|id| post_ids.contains(&id)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HighlightRepo for MemoryStore {
    async fn list_highlights(&self) -> Result<Vec<Highlight>, StoreError> {
        Ok(self.lock().highlights.clone())
    }

    async fn get_highlight(&self, id: i64) -> Result<Option<Highlight>, StoreError> {
        Ok(self.lock().highlights.iter().find(|h| h.id == id).cloned())
    }

    async fn create_highlight(&self, input: &HighlightInput) -> Result<Highlight, StoreError> {
        let mut state = self.lock();
        let highlight = Highlight {
            id: state.id(),
            title: input.title.clone(),
            cover_image: input.cover_image.clone(),
            created_at: Utc::now(),
        };
        state.highlights.push(highlight.clone());
        Ok(highlight)
    }

    async fn update_highlight(
        &self,
        id: i64,
        input: &HighlightInput,
    ) -> Result<Highlight, StoreError> {
        let mut state = self.lock();
        let highlight = state
            .highlights
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| StoreError::not_found("highlight", id))?;
        highlight.title.clone_from(&input.title);
        highlight.cover_image.clone_from(&input.cover_image);
        Ok(highlight.clone())
    }

    async fn delete_highlight(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.highlights.iter().any(|h| h.id == id) {
            return Err(StoreError::not_found("highlight", id));
        }
        state.highlights.retain(|h| h.id != id);
        state.highlight_media.retain(|m| m.highlight_id != id);
        Ok(())
    }

    async fn add_highlight_media(
        &self,
        highlight_id: i64,
        input: &HighlightMediaInput,
    ) -> Result<HighlightMedia, StoreError> {
        let mut state = self.lock();
        if !state.highlights.iter().any(|h| h.id == highlight_id) {
            return Err(missing_reference("highlight", highlight_id));
        }
        let row = HighlightMedia {
            id: state.id(),
            highlight_id,
            media_type: input.media_type,
            media_file: input.media_file.clone(),
            created_at: Utc::now(),
        };
        state.highlight_media.push(row.clone());
        Ok(row)
    }

    async fn list_highlight_media(
        &self,
        highlight_ids: &[i64],
    ) -> Result<Vec<HighlightMedia>, StoreError> {
        Ok(self
            .lock()
            .highlight_media
            .iter()
            .filter(|m| highlight_ids.contains(&m.highlight_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deleting_attribute_value_strips_it_from_variants() {
        let store = MemoryStore::new();
        let collection = store
            .create_collection(&CollectionInput {
                title: "Shirts".into(),
                ..CollectionInput::default()
            })
            .await
            .expect("collection");
        let attribute = store
            .create_attribute(&AttributeInput {
                title: "Color".into(),
                collection_id: Some(collection.id),
            })
            .await
            .expect("attribute");
        let red = store
            .create_attribute_value(attribute.id, "Red")
            .await
            .expect("value");
        let product = store
            .create_product(
                &ProductInput {
                    title: "Tee".into(),
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
                price: None,
                stock: 0,
                attribute_value_ids: vec![red.id, red.id],
            })
            .await
            .expect("variant");
        assert_eq!(variant.attribute_value_ids, vec![red.id]);

        store.delete_attribute_value(red.id).await.expect("delete");
        let variant = store
            .get_variant(variant.id)
            .await
            .expect("lookup")
            .expect("variant");
        assert!(variant.attribute_value_ids.is_empty());
    }

    #[tokio::test]
    async fn product_and_images_are_created_together() {
        let store = MemoryStore::new();
        let images = vec!["front.jpg".to_string(), "back.jpg".to_string()];
        let orphan = ProductInput {
            title: "Tee".into(),
            description: String::new(),
            collection_id: 404,
        };
        let err = store
            .create_product(&orphan, &images)
            .await
            .expect_err("unknown collection");
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.lock().product_images.is_empty());

        let collection = store
            .create_collection(&CollectionInput {
                title: "Shirts".into(),
                ..CollectionInput::default()
            })
            .await
            .expect("collection");
        let product = store
            .create_product(
                &ProductInput {
                    collection_id: collection.id,
                    ..orphan
                },
                &images,
            )
            .await
            .expect("product");
        let saved = store
            .list_product_images(&[product.id])
            .await
            .expect("images");
        let refs: Vec<&str> = saved.iter().map(|i| i.image.as_str()).collect();
        assert_eq!(refs, ["front.jpg", "back.jpg"]);
    }

    #[tokio::test]
    async fn negative_stock_violates_constraint() {
        let store = MemoryStore::new();
        let err = store
            .create_variant(&VariantRecord {
                product_id: 1,
                price: None,
                stock: -1,
                attribute_value_ids: vec![],
            })
            .await
            .expect_err("check constraint");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn latest_otp_wins_for_same_code() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for offset in [0, 60] {
            store
                .insert_otp(&NewOtp {
                    phone_number: "0912".into(),
                    code: "123456".into(),
                    created_at: now + chrono::Duration::seconds(offset),
                    expires_at: now + chrono::Duration::seconds(offset + 120),
                })
                .await
                .expect("insert");
        }
        let latest = store
            .latest_matching_otp("0912", "123456")
            .await
            .expect("lookup")
            .expect("row");
        assert_eq!(latest.created_at, now + chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn session_and_user_carts_are_distinct() {
        let store = MemoryStore::new();
        let (user, created) = store.get_or_create_user("0912").await.expect("user");
        assert!(created);
        let (again, created) = store.get_or_create_user("0912").await.expect("user");
        assert!(!created);
        assert_eq!(again.id, user.id);

        let session = store
            .create_cart(&CartOwner::Session("abc".into()))
            .await
            .expect("session cart");
        let mine = store
            .create_cart(&CartOwner::User(user.id))
            .await
            .expect("user cart");
        assert_ne!(session.id, mine.id);
        assert!(store
            .create_cart(&CartOwner::User(user.id))
            .await
            .is_err());
    }
}
