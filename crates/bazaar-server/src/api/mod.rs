mod auth;
mod carts;
mod catalog;
mod content;
mod orders;
mod scores;

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use bazaar_core::{AuthError, ServiceError, Services, StoreError};
use bazaar_db::PgStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    authenticate, enforce_rate_limit, request_id, RateLimitState, RequestId, SESSION_KEY_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    /// `None` when the services run on a non-Postgres store.
    pub db: Option<PgStore>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                fields: None,
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: &str, message: impl Into<String>) -> Self {
        self.error
            .fields
            .get_or_insert_with(BTreeMap::new)
            .entry(field.to_string())
            .or_default()
            .push(message.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Wrap `data` in the success envelope.
pub(super) fn respond<T: Serialize>(req_id: &RequestId, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0.clone()),
    })
}

pub(super) fn created<T: Serialize>(
    req_id: &RequestId,
    data: T,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, respond(req_id, data))
}

/// Translate a service failure into the error envelope.
pub fn map_service_error(request_id: &str, error: ServiceError) -> ApiError {
    match error {
        ServiceError::Validation(e) => {
            tracing::debug!(error = %e, "request failed validation");
            let message = e.to_string();
            ApiError::new(request_id, "validation_error", message.clone())
                .with_field(e.field_name(), message)
        }
        ServiceError::Auth(e @ (AuthError::NoSuchOtp | AuthError::OtpExpired)) => {
            let message = e.to_string();
            ApiError::new(request_id, "validation_error", message.clone())
                .with_field("code", message)
        }
        ServiceError::Auth(AuthError::Forbidden) => {
            ApiError::new(request_id, "forbidden", AuthError::Forbidden.to_string())
        }
        ServiceError::Auth(e) => ApiError::new(request_id, "unauthorized", e.to_string()),
        ServiceError::Store(e) => map_store_error(request_id, &e),
    }
}

fn map_store_error(request_id: &str, error: &StoreError) -> ApiError {
    match error {
        StoreError::NotFound { .. } => ApiError::new(request_id, "not_found", error.to_string()),
        StoreError::Conflict(detail) => {
            tracing::info!(detail = %detail, "store integrity violation");
            ApiError::new(request_id, "conflict", "the request conflicts with existing data")
        }
        StoreError::Protected(detail) => {
            tracing::info!(detail = %detail, "delete blocked by referencing rows");
            ApiError::new(
                request_id,
                "conflict",
                "cannot delete: other records still reference this one",
            )
        }
        StoreError::Backend(detail) => {
            tracing::error!(error = %detail, "store operation failed");
            ApiError::new(request_id, "internal_error", "store operation failed")
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static(SESSION_KEY_HEADER),
        ])
}

/// OTP and token endpoints, behind the rate limiter.
fn auth_router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/auth/send-otp", post(auth::send_otp))
        .route("/api/v1/auth/verify-otp", post(auth::verify_otp))
        .route("/api/v1/auth/token/refresh", post(auth::refresh_token))
        .route("/api/v1/auth/logout", post(auth::logout))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ))
}

fn catalog_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/collections",
            get(catalog::list_collections).post(catalog::create_collection),
        )
        .route(
            "/api/v1/collections/{id}",
            get(catalog::get_collection)
                .put(catalog::update_collection)
                .delete(catalog::delete_collection),
        )
        .route(
            "/api/v1/collections/{id}/products",
            get(catalog::collection_products),
        )
        .route(
            "/api/v1/attributes",
            get(catalog::list_attributes).post(catalog::create_attribute),
        )
        .route(
            "/api/v1/attributes/{id}",
            get(catalog::get_attribute)
                .put(catalog::update_attribute)
                .delete(catalog::delete_attribute),
        )
        .route(
            "/api/v1/attributes/{id}/add_value",
            post(catalog::add_attribute_value),
        )
        .route(
            "/api/v1/attribute-values/{id}",
            delete(catalog::delete_attribute_value),
        )
        .route(
            "/api/v1/products",
            get(catalog::list_products).post(catalog::create_product),
        )
        .route(
            "/api/v1/products/{id}",
            get(catalog::get_product)
                .put(catalog::update_product)
                .delete(catalog::delete_product),
        )
        .route(
            "/api/v1/products/{id}/images",
            post(catalog::add_product_images),
        )
        .route(
            "/api/v1/variants",
            get(catalog::list_variants).post(catalog::create_variant),
        )
        .route(
            "/api/v1/variants/{id}",
            get(catalog::get_variant)
                .put(catalog::replace_variant)
                .delete(catalog::delete_variant),
        )
}

fn commerce_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route("/api/v1/orders/{id}", get(orders::get_order))
        .route("/api/v1/orders/{id}/items", post(orders::add_order_item))
        .route("/api/v1/orders/{id}/status", put(orders::update_order_status))
        .route("/api/v1/cart", get(carts::get_cart))
        .route("/api/v1/cart/items", post(carts::add_cart_item))
        .route(
            "/api/v1/cart/items/{id}",
            put(carts::update_cart_item).delete(carts::remove_cart_item),
        )
        .route("/api/v1/cart/checkout", post(carts::checkout))
        .route("/api/v1/scores", get(scores::list_scores))
        .route("/api/v1/scores/daily-login", post(scores::daily_login))
}

fn content_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/posts",
            get(content::list_posts).post(content::create_post),
        )
        .route(
            "/api/v1/posts/{id}",
            get(content::get_post)
                .put(content::update_post)
                .delete(content::delete_post),
        )
        .route("/api/v1/post-images", post(content::add_post_image))
        .route("/api/v1/wysiwyg-upload", post(content::wysiwyg_upload))
        .route(
            "/api/v1/highlights",
            get(content::list_highlights).post(content::create_highlight),
        )
        .route(
            "/api/v1/highlights/{id}",
            get(content::get_highlight)
                .put(content::update_highlight)
                .delete(content::delete_highlight),
        )
        .route(
            "/api/v1/highlights/{id}/media",
            post(content::add_highlight_media),
        )
}

pub fn build_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    let api_routes = Router::new()
        .merge(auth_router(rate_limit))
        .merge(catalog_router())
        .merge(commerce_router())
        .merge(content_router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authenticate,
        ));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http())
                .layer(build_cors()),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    let Some(db) = state.db else {
        return (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "not_configured",
                },
                meta,
            }),
        );
    };

    match bazaar_db::health_check(db.pool()).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use bazaar_core::accounts::User;
    use bazaar_core::catalog::{CollectionInput, ProductInput, VariantInput};
    use bazaar_core::memory::MemoryStore;
    use bazaar_core::store::UserRepo;
    use bazaar_core::{Services, TokenService};
    use chrono::Duration;
    use tower::ServiceExt;

    use super::{build_app, AppState};
    use crate::middleware::RateLimitState;

    pub struct TestApp {
        pub store: Arc<MemoryStore>,
        pub services: Services,
        pub router: Router,
    }

    impl TestApp {
        pub fn new() -> Self {
            Self::with_rate_limit(RateLimitState::per_minute(1_000))
        }

        pub fn with_rate_limit(rate_limit: RateLimitState) -> Self {
            let store = Arc::new(MemoryStore::new());
            let tokens = TokenService::new(
                "test-secret",
                "bazaar",
                Duration::minutes(5),
                Duration::days(1),
            );
            let services = Services::from_store(store.clone(), tokens, Duration::minutes(2));
            let router = build_app(
                AppState {
                    services: services.clone(),
                    db: None,
                },
                rate_limit,
            );
            Self {
                store,
                services,
                router,
            }
        }

        /// A signed-in customer and their access token.
        pub async fn customer(&self, phone: &str) -> (User, String) {
            let (user, _) = self
                .store
                .get_or_create_user(phone)
                .await
                .expect("create user");
            let pair = self.services.auth.tokens().issue_pair(&user).expect("tokens");
            (user, pair.access)
        }

        /// A signed-in staff user and their access token.
        pub async fn staff(&self) -> (User, String) {
            let user = self
                .services
                .auth
                .create_staff("09990000000")
                .await
                .expect("create staff");
            let pair = self.services.auth.tokens().issue_pair(&user).expect("tokens");
            (user, pair.access)
        }

        /// A variant in a fresh attribute-less collection; returns its id.
        pub async fn variant(&self, price: &str, stock: i32) -> i64 {
            let catalog = &self.services.catalog;
            let collection = catalog
                .create_collection(CollectionInput {
                    title: "General".to_string(),
                    ..CollectionInput::default()
                })
                .await
                .expect("collection");
            let product = catalog
                .create_product(
                    ProductInput {
                        title: "Mug".to_string(),
                        description: String::new(),
                        collection_id: collection.id,
                    },
                    Vec::new(),
                )
                .await
                .expect("product");
            catalog
                .create_variant(VariantInput {
                    product_id: product.product.id,
                    attribute_ids: Vec::new(),
                    price: Some(price.parse().expect("price")),
                    stock,
                })
                .await
                .expect("variant")
                .id
        }

        pub async fn send(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            self.send_with(method, uri, token, &[], body).await
        }

        pub async fn send_with(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            headers: &[(&str, &str)],
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Bearer {token}"));
            }
            for (name, value) in headers {
                builder = builder.header(*name, *value);
            }
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string())),
                None => builder.body(Body::empty()),
            }
            .expect("request");
            self.dispatch(request).await
        }

        /// Send `body` verbatim, with an optional content type.
        pub async fn send_raw(
            &self,
            method: &str,
            uri: &str,
            content_type: Option<&str>,
            body: &str,
        ) -> (StatusCode, serde_json::Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(content_type) = content_type {
                builder = builder.header("content-type", content_type);
            }
            let request = builder
                .body(Body::from(body.to_string()))
                .expect("request");
            self.dispatch(request).await
        }

        async fn dispatch(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
            let response = self
                .router
                .clone()
                .oneshot(request)
                .await
                .expect("response");
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("body bytes");
            let json = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).expect("json parse")
            };
            (status, json)
        }
    }
}
