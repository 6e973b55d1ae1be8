use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use bazaar_core::commerce::{Order, OrderDetail, OrderItem, OrderStatus};
use serde::Deserialize;

use crate::extract::{ApiJson, ApiPath};
use crate::middleware::{CurrentUser, RequestId, StaffUser};

use super::{created, map_service_error, respond, ApiError, ApiResponse, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct AddItemRequest {
    product_variant_id: i64,
    quantity: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct StatusRequest {
    status: String,
}

/// GET /api/v1/orders: own orders, or all of them for staff.
pub(super) async fn list_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<Vec<Order>>>, ApiError> {
    let orders = state
        .services
        .orders
        .list_orders(&user)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, orders))
}

/// POST /api/v1/orders: open an empty pending order.
pub(super) async fn create_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ApiError> {
    let order = state
        .services
        .orders
        .create_order(&user)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, order))
}

pub(super) async fn get_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ApiResponse<OrderDetail>>, ApiError> {
    let order = state
        .services
        .orders
        .get_order(&user, id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, order))
}

/// POST /api/v1/orders/{id}/items
pub(super) async fn add_order_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<AddItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderItem>>), ApiError> {
    let item = state
        .services
        .orders
        .add_item(&user, id, body.product_variant_id, body.quantity)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, item))
}

/// PUT /api/v1/orders/{id}/status (staff)
pub(super) async fn update_order_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let status: OrderStatus = body
        .status
        .parse()
        .map_err(|e: bazaar_core::ValidationError| map_service_error(&req_id.0, e.into()))?;
    let order = state
        .services
        .orders
        .update_status(id, status)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, order))
}
