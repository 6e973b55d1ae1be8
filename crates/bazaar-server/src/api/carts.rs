//! Cart endpoints. Signed-in callers use their own cart; anonymous callers
//! identify theirs with the `x-session-key` header.

use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use bazaar_core::commerce::{CartDetail, CartItem, OrderDetail};
use serde::Deserialize;

use crate::extract::{ApiJson, ApiPath};
use crate::middleware::{CartOwnerKey, CurrentUser, RequestId};

use super::{created, map_service_error, respond, ApiError, ApiResponse, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct AddCartItemRequest {
    product_variant_id: i64,
    quantity: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct QuantityRequest {
    quantity: i32,
}

/// GET /api/v1/cart, created on first access.
pub(super) async fn get_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CartOwnerKey(owner): CartOwnerKey,
) -> Result<Json<ApiResponse<CartDetail>>, ApiError> {
    let cart = state
        .services
        .carts
        .get_cart(&owner)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, cart))
}

/// POST /api/v1/cart/items; merges with an existing line for the variant.
pub(super) async fn add_cart_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CartOwnerKey(owner): CartOwnerKey,
    ApiJson(body): ApiJson<AddCartItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CartItem>>), ApiError> {
    let item = state
        .services
        .carts
        .add_item(&owner, body.product_variant_id, body.quantity)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, item))
}

pub(super) async fn update_cart_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CartOwnerKey(owner): CartOwnerKey,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<QuantityRequest>,
) -> Result<Json<ApiResponse<CartItem>>, ApiError> {
    let item = state
        .services
        .carts
        .update_item(&owner, id, body.quantity)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, item))
}

pub(super) async fn remove_cart_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CartOwnerKey(owner): CartOwnerKey,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .carts
        .remove_item(&owner, id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/cart/checkout: requires a signed-in user.
pub(super) async fn checkout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ApiError> {
    let order = state
        .services
        .carts
        .checkout(&user)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, order))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::TestApp;

    const SESSION: (&str, &str) = ("x-session-key", "anon-session-1");

    #[tokio::test]
    async fn anonymous_cart_needs_a_session_key() {
        let app = TestApp::new();
        let (status, body) = app.send("GET", "/api/v1/cart", None, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["fields"]["session_key"].is_array());
    }

    #[tokio::test]
    async fn session_cart_merges_lines_up_to_stock() {
        let app = TestApp::new();
        let variant = app.variant("4", 3).await;
        let add = |quantity: i32| json!({ "product_variant_id": variant, "quantity": quantity });

        let (status, _) = app
            .send_with("POST", "/api/v1/cart/items", None, &[SESSION], Some(add(2)))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = app
            .send_with("POST", "/api/v1/cart/items", None, &[SESSION], Some(add(1)))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["quantity"], 3);

        let (status, _) = app
            .send_with("POST", "/api/v1/cart/items", None, &[SESSION], Some(add(1)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = app
            .send_with("GET", "/api/v1/cart", None, &[SESSION], None)
            .await;
        assert_eq!(body["data"]["session_key"], "anon-session-1");
        assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn checkout_turns_cart_into_order() {
        let app = TestApp::new();
        let variant = app.variant("725", 10).await;
        let (_, token) = app.customer("09120000020").await;

        let (status, body) = app
            .send(
                "POST",
                "/api/v1/cart/items",
                Some(&token),
                Some(json!({ "product_variant_id": variant, "quantity": 4 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let item = body["data"]["id"].as_i64().expect("item id");

        let (status, body) = app
            .send(
                "PUT",
                &format!("/api/v1/cart/items/{item}"),
                Some(&token),
                Some(json!({ "quantity": 2 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["quantity"], 2);

        let (status, body) = app
            .send("POST", "/api/v1/cart/checkout", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["total"], "1450");
        assert_eq!(body["data"]["items"][0]["price"], "725");

        let (_, body) = app.send("GET", "/api/v1/cart", Some(&token), None).await;
        assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));

        let (status, _) = app
            .send("POST", "/api/v1/cart/checkout", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn checkout_requires_sign_in() {
        let app = TestApp::new();
        let (status, _) = app
            .send_with("POST", "/api/v1/cart/checkout", None, &[SESSION], None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn removing_a_foreign_line_is_not_found() {
        let app = TestApp::new();
        let variant = app.variant("1", 5).await;
        let (_, token) = app.customer("09120000021").await;
        let (_, body) = app
            .send(
                "POST",
                "/api/v1/cart/items",
                Some(&token),
                Some(json!({ "product_variant_id": variant, "quantity": 1 })),
            )
            .await;
        let item = body["data"]["id"].as_i64().expect("item id");

        let (status, _) = app
            .send_with(
                "DELETE",
                &format!("/api/v1/cart/items/{item}"),
                None,
                &[SESSION],
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .send(
                "DELETE",
                &format!("/api/v1/cart/items/{item}"),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
