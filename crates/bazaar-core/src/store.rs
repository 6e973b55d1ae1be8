//! Repository interfaces, one per entity.
//!
//! Services depend on these traits only. `bazaar-db` implements them over
//! Postgres and [`crate::memory::MemoryStore`] implements them in memory.
//! Implementations must report uniqueness/integrity violations as
//! [`StoreError::Conflict`] and blocked deletes as [`StoreError::Protected`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::accounts::{NewScoreEvent, ScoreEvent, User};
use crate::catalog::{
    Attribute, AttributeInput, AttributeValue, Collection, CollectionInput, Product,
    ProductFilter, ProductImage, ProductInput, ProductVariant, VariantRecord,
};
use crate::commerce::{Cart, CartItem, CartOwner, NewOrderItem, Order, OrderItem, OrderStatus};
use crate::content::{
    Highlight, HighlightInput, HighlightMedia, HighlightMediaInput, Post, PostImage, PostInput,
};
use crate::otp::{NewOtp, Otp};
use crate::StoreError;

#[async_trait]
pub trait CollectionRepo: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<Collection>, StoreError>;
    async fn get_collection(&self, id: i64) -> Result<Option<Collection>, StoreError>;
    async fn list_subcollections(&self, parent_id: i64) -> Result<Vec<Collection>, StoreError>;
    async fn create_collection(&self, input: &CollectionInput) -> Result<Collection, StoreError>;
    async fn update_collection(
        &self,
        id: i64,
        input: &CollectionInput,
    ) -> Result<Collection, StoreError>;
    /// Fails with `Protected` while products or subcollections reference it.
    async fn delete_collection(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AttributeRepo: Send + Sync {
    async fn list_attributes(
        &self,
        collection_id: Option<i64>,
    ) -> Result<Vec<Attribute>, StoreError>;
    async fn get_attribute(&self, id: i64) -> Result<Option<Attribute>, StoreError>;
    async fn create_attribute(&self, input: &AttributeInput) -> Result<Attribute, StoreError>;
    async fn update_attribute(
        &self,
        id: i64,
        input: &AttributeInput,
    ) -> Result<Attribute, StoreError>;
    async fn delete_attribute(&self, id: i64) -> Result<(), StoreError>;
    /// Ids of the attributes tied directly to `collection_id`.
    async fn required_attribute_ids(&self, collection_id: i64) -> Result<Vec<i64>, StoreError>;
    async fn create_attribute_value(
        &self,
        attribute_id: i64,
        value: &str,
    ) -> Result<AttributeValue, StoreError>;
    async fn delete_attribute_value(&self, id: i64) -> Result<(), StoreError>;
    /// Values with the given ids; unknown ids are simply absent.
    async fn get_attribute_values(&self, ids: &[i64]) -> Result<Vec<AttributeValue>, StoreError>;
    async fn list_values_for_attributes(
        &self,
        attribute_ids: &[i64],
    ) -> Result<Vec<AttributeValue>, StoreError>;
}

#[async_trait]
pub trait ProductRepo: Send + Sync {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;
    async fn get_product(&self, id: i64) -> Result<Option<Product>, StoreError>;
    /// Insert the product together with `images`; neither is kept if
    /// either insert fails.
    async fn create_product(
        &self,
        input: &ProductInput,
        images: &[String],
    ) -> Result<Product, StoreError>;
    async fn update_product(&self, id: i64, input: &ProductInput) -> Result<Product, StoreError>;
    async fn delete_product(&self, id: i64) -> Result<(), StoreError>;
    async fn add_product_images(
        &self,
        product_id: i64,
        images: &[String],
    ) -> Result<Vec<ProductImage>, StoreError>;
    async fn list_product_images(
        &self,
        product_ids: &[i64],
    ) -> Result<Vec<ProductImage>, StoreError>;
}

#[async_trait]
pub trait VariantRepo: Send + Sync {
    async fn list_variants(
        &self,
        product_ids: Option<&[i64]>,
    ) -> Result<Vec<ProductVariant>, StoreError>;
    async fn get_variant(&self, id: i64) -> Result<Option<ProductVariant>, StoreError>;
    /// Insert the variant and its attribute-value set in one transaction.
    async fn create_variant(&self, record: &VariantRecord) -> Result<ProductVariant, StoreError>;
    /// Overwrite the variant and replace (not merge) its attribute-value set
    /// in one transaction.
    async fn replace_variant(
        &self,
        id: i64,
        record: &VariantRecord,
    ) -> Result<ProductVariant, StoreError>;
    async fn delete_variant(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderRepo: Send + Sync {
    async fn create_order(&self, user_id: i64) -> Result<Order, StoreError>;
    async fn get_order(&self, id: i64) -> Result<Option<Order>, StoreError>;
    /// All orders when `user_id` is `None`.
    async fn list_orders(&self, user_id: Option<i64>) -> Result<Vec<Order>, StoreError>;
    async fn list_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError>;
    /// Insert the lines and recompute the order total in one transaction.
    async fn add_order_items(
        &self,
        order_id: i64,
        items: &[NewOrderItem],
    ) -> Result<Vec<OrderItem>, StoreError>;
    /// Set the status and, when given, insert `score` in the same
    /// transaction. A score conflict leaves the status unchanged.
    async fn update_order_status(
        &self,
        id: i64,
        status: OrderStatus,
        score: Option<&NewScoreEvent>,
    ) -> Result<Order, StoreError>;
}

#[async_trait]
pub trait CartRepo: Send + Sync {
    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, StoreError>;
    async fn create_cart(&self, owner: &CartOwner) -> Result<Cart, StoreError>;
    async fn list_cart_items(&self, cart_id: i64) -> Result<Vec<CartItem>, StoreError>;
    /// Add `quantity` to the line for `variant_id`, creating it if absent.
    async fn add_cart_item(
        &self,
        cart_id: i64,
        variant_id: i64,
        quantity: i32,
    ) -> Result<CartItem, StoreError>;
    async fn set_cart_item_quantity(
        &self,
        cart_id: i64,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartItem, StoreError>;
    async fn remove_cart_item(&self, cart_id: i64, item_id: i64) -> Result<(), StoreError>;
    /// Create an order for `user_id` from `items`, then empty the cart, in
    /// one transaction.
    async fn checkout_cart(
        &self,
        cart_id: i64,
        user_id: i64,
        items: &[NewOrderItem],
    ) -> Result<Order, StoreError>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, StoreError>;
    /// Returns the user and whether it was created by this call.
    async fn get_or_create_user(&self, phone_number: &str) -> Result<(User, bool), StoreError>;
    /// Create the user if needed and grant staff + superuser flags.
    async fn upsert_staff_user(&self, phone_number: &str) -> Result<User, StoreError>;
}

#[async_trait]
pub trait OtpRepo: Send + Sync {
    async fn insert_otp(&self, otp: &NewOtp) -> Result<Otp, StoreError>;
    /// Most recently created row matching both phone number and code exactly.
    async fn latest_matching_otp(
        &self,
        phone_number: &str,
        code: &str,
    ) -> Result<Option<Otp>, StoreError>;
}

#[async_trait]
pub trait TokenBlacklistRepo: Send + Sync {
    /// Get-or-create: revoking an already revoked `jti` is a no-op.
    async fn blacklist_jti(&self, jti: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn is_jti_blacklisted(&self, jti: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ScoreRepo: Send + Sync {
    async fn insert_score_event(&self, event: &NewScoreEvent) -> Result<ScoreEvent, StoreError>;
    async fn list_score_events(&self, user_id: i64) -> Result<Vec<ScoreEvent>, StoreError>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn list_posts(&self) -> Result<Vec<Post>, StoreError>;
    async fn get_post(&self, id: i64) -> Result<Option<Post>, StoreError>;
    async fn create_post(&self, author_id: Option<i64>, input: &PostInput)
        -> Result<Post, StoreError>;
    async fn update_post(&self, id: i64, input: &PostInput) -> Result<Post, StoreError>;
    async fn delete_post(&self, id: i64) -> Result<(), StoreError>;
    async fn add_post_image(
        &self,
        post_id: Option<i64>,
        image: &str,
    ) -> Result<PostImage, StoreError>;
    async fn list_post_images(&self, post_ids: &[i64]) -> Result<Vec<PostImage>, StoreError>;
}

#[async_trait]
pub trait HighlightRepo: Send + Sync {
    async fn list_highlights(&self) -> Result<Vec<Highlight>, StoreError>;
    async fn get_highlight(&self, id: i64) -> Result<Option<Highlight>, StoreError>;
    async fn create_highlight(&self, input: &HighlightInput) -> Result<Highlight, StoreError>;
    async fn update_highlight(
        &self,
        id: i64,
        input: &HighlightInput,
    ) -> Result<Highlight, StoreError>;
    async fn delete_highlight(&self, id: i64) -> Result<(), StoreError>;
    async fn add_highlight_media(
        &self,
        highlight_id: i64,
        input: &HighlightMediaInput,
    ) -> Result<HighlightMedia, StoreError>;
    async fn list_highlight_media(
        &self,
        highlight_ids: &[i64],
    ) -> Result<Vec<HighlightMedia>, StoreError>;
}

/// Every repository, implemented by a single backing store.
pub trait Store:
    CollectionRepo
    + AttributeRepo
    + ProductRepo
    + VariantRepo
    + OrderRepo
    + CartRepo
    + UserRepo
    + OtpRepo
    + TokenBlacklistRepo
    + ScoreRepo
    + PostRepo
    + HighlightRepo
{
}

impl<T> Store for T where
    T: CollectionRepo
        + AttributeRepo
        + ProductRepo
        + VariantRepo
        + OrderRepo
        + CartRepo
        + UserRepo
        + OtpRepo
        + TokenBlacklistRepo
        + ScoreRepo
        + PostRepo
        + HighlightRepo
{
}
