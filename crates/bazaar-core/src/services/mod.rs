//! Application services. Each one owns the repositories it needs and is
//! cheap to clone.

mod auth;
mod catalog;
mod content;
mod orders;
mod scoring;

use std::sync::Arc;

use chrono::Duration;

pub use auth::{AuthService, Session};
pub use catalog::CatalogService;
pub use content::ContentService;
pub use orders::{CartService, OrderService};
pub use scoring::{
    order_completed_event, ScoreService, DAILY_LOGIN_POINTS, ORDER_COMPLETED_POINTS,
};

use crate::store::Store;
use crate::{StoreError, TokenService};

#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub auth: AuthService,
    pub orders: OrderService,
    pub carts: CartService,
    pub scores: ScoreService,
    pub content: ContentService,
}

impl Services {
    /// Wire every service to a single backing store.
    pub fn from_store<S: Store + 'static>(store: Arc<S>, tokens: TokenService, otp_ttl: Duration) -> Self {
        Self {
            catalog: CatalogService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
            ),
            auth: AuthService::new(store.clone(), store.clone(), store.clone(), tokens, otp_ttl),
            orders: OrderService::new(store.clone(), store.clone()),
            carts: CartService::new(store.clone(), store.clone(), store.clone()),
            scores: ScoreService::new(store.clone()),
            content: ContentService::new(store.clone(), store.clone(), store),
        }
    }
}

/// Turn a missing row into [`StoreError::NotFound`].
pub(crate) fn found<T>(row: Option<T>, entity: &'static str, id: i64) -> Result<T, StoreError> {
    row.ok_or_else(|| StoreError::not_found(entity, id))
}
