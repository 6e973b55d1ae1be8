//! Body, query, and path extractors that reject with the API error envelope.
//!
//! axum's stock `Json`, `Query`, and `Path` answer bad input with plain-text
//! 400/415/422 responses. These wrappers run the same extraction and turn
//! any rejection into a 400 `validation_error`.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::api::ApiError;
use crate::middleware::request_id_of;

fn invalid_input(request_id: String, detail: &str) -> ApiError {
    tracing::debug!(detail, "request rejected before reaching the handler");
    ApiError::new(request_id, "validation_error", detail)
}

/// A JSON request body.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let rid = request_id_of(req.extensions());
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(invalid_input(rid, &rejection.body_text())),
        }
    }
}

/// URL query parameters.
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(invalid_input(
                request_id_of(&parts.extensions),
                &rejection.body_text(),
            )),
        }
    }
}

/// Path parameters, e.g. a numeric `{id}`.
#[derive(Debug, Clone)]
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(invalid_input(
                request_id_of(&parts.extensions),
                &rejection.body_text(),
            )),
        }
    }
}
