use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bazaar_core::accounts::User;
use bazaar_core::commerce::{validate_session_key, CartOwner};
use bazaar_core::{AuthError, ServiceError};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{map_service_error, ApiError, AppState};

pub const SESSION_KEY_HEADER: &str = "x-session-key";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The verified bearer access token of the current request.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter for the OTP and token endpoints.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }

    #[must_use]
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

pub(crate) fn request_id_of(parts_ext: &axum::http::Extensions) -> String {
    parts_ext
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Resolve an `Authorization: Bearer <access>` header to a user.
///
/// Requests without the header pass through anonymously. A header that is
/// present but malformed, invalid, or revoked is rejected with 401.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(header) = req.headers().get(AUTHORIZATION) else {
        return next.run(req).await;
    };

    let rid = request_id_of(req.extensions());
    let Some(token) = extract_bearer_token(header) else {
        return map_service_error(&rid, AuthError::MalformedAuthorizationHeader.into())
            .into_response();
    };
    let token = token.to_owned();

    match state.services.auth.authenticate(&token).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            req.extensions_mut().insert(BearerToken(token));
            next.run(req).await
        }
        Err(e) => map_service_error(&rid, e).into_response(),
    }
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        drop(window);
        tracing::warn!("auth rate limit exceeded");
        return ApiError::new(
            request_id_of(req.extensions()),
            "rate_limited",
            "rate limit exceeded",
        )
        .into_response();
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

fn extract_bearer_token(value: &HeaderValue) -> Option<&str> {
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.contains(' '))
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// An authenticated user; rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// An authenticated staff user; 401 when anonymous, 403 otherwise.
#[derive(Debug, Clone)]
pub struct StaffUser(pub User);

fn reject(parts: &Parts, error: AuthError) -> ApiError {
    map_service_error(&request_id_of(&parts.extensions), ServiceError::Auth(error))
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| reject(parts, AuthError::MissingCredentials))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for StaffUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.is_staff {
            Ok(StaffUser(user))
        } else {
            Err(reject(parts, AuthError::Forbidden))
        }
    }
}

/// Cart owner: the authenticated user, else the `x-session-key` header.
#[derive(Debug, Clone)]
pub struct CartOwnerKey(pub CartOwner);

impl<S: Send + Sync> FromRequestParts<S> for CartOwnerKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(CartOwnerKey(CartOwner::User(user.id)));
        }
        let rid = request_id_of(&parts.extensions);
        let raw = parts
            .headers
            .get(SESSION_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        validate_session_key(raw)
            .map(|key| CartOwnerKey(CartOwner::Session(key)))
            .map_err(|e| map_service_error(&rid, e.into()))
    }
}
