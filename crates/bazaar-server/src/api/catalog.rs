//! Collections, attributes, products, and variants.
//!
//! Reads are public. Writes require a staff account.

use std::str::FromStr;

use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use bazaar_core::catalog::{
    Attribute, AttributeInput, AttributeValue, AttributeWithValues, Collection, CollectionDetail,
    CollectionInput, ProductDetail, ProductFilter, ProductImage, ProductInput, VariantDetail,
    VariantInput,
};
use bazaar_core::ValidationError;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{RequestId, StaffUser};

use super::{created, map_service_error, respond, ApiError, ApiResponse, AppState};

// ---------------------------------------------------------------------------
// Query and body types
// ---------------------------------------------------------------------------

/// `GET /products?collection=1&attribute=Color:Red,Size:L&min_price=10&max_price=50`
#[derive(Debug, Default, Deserialize)]
pub(super) struct ProductQuery {
    collection: Option<String>,
    attribute: Option<String>,
    min_price: Option<String>,
    max_price: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct AttributeQuery {
    collection: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct VariantQuery {
    product: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CreateProductRequest {
    #[serde(flatten)]
    product: ProductInput,
    images: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct AttributeValueRequest {
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ProductImagesRequest {
    images: Vec<String>,
}

fn parse_id(field: &'static str, raw: Option<&str>) -> Result<Option<i64>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ValidationError::field(field, format!("'{s}' is not a valid id"))),
    }
}

fn parse_price(field: &'static str, raw: Option<&str>) -> Result<Option<Decimal>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Decimal::from_str(s)
            .map(Some)
            .map_err(|_| ValidationError::field(field, format!("'{s}' is not a valid number"))),
    }
}

impl ProductQuery {
    fn into_filter(self) -> Result<ProductFilter, ValidationError> {
        Ok(ProductFilter {
            collection_id: parse_id("collection", self.collection.as_deref())?,
            attributes: match self.attribute.as_deref() {
                Some(raw) => ProductFilter::parse_attribute_pairs(raw)?,
                None => Vec::new(),
            },
            min_price: parse_price("min_price", self.min_price.as_deref())?,
            max_price: parse_price("max_price", self.max_price.as_deref())?,
        })
    }
}

fn invalid(req_id: &RequestId, e: ValidationError) -> ApiError {
    map_service_error(&req_id.0, e.into())
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// GET /api/v1/collections
pub(super) async fn list_collections(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<Collection>>>, ApiError> {
    let collections = state
        .services
        .catalog
        .list_collections()
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, collections))
}

/// GET /api/v1/collections/{id} with subcollections and attributes.
pub(super) async fn get_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ApiResponse<CollectionDetail>>, ApiError> {
    let detail = state
        .services
        .catalog
        .get_collection(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, detail))
}

pub(super) async fn create_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiJson(body): ApiJson<CollectionInput>,
) -> Result<(StatusCode, Json<ApiResponse<Collection>>), ApiError> {
    let collection = state
        .services
        .catalog
        .create_collection(body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, collection))
}

pub(super) async fn update_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<CollectionInput>,
) -> Result<Json<ApiResponse<Collection>>, ApiError> {
    let collection = state
        .services
        .catalog
        .update_collection(id, body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, collection))
}

/// DELETE /api/v1/collections/{id}; 409 while products or subcollections
/// still reference it.
pub(super) async fn delete_collection(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .catalog
        .delete_collection(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/collections/{id}/products, accepting the product filters.
pub(super) async fn collection_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<Json<ApiResponse<Vec<ProductDetail>>>, ApiError> {
    let filter = query.into_filter().map_err(|e| invalid(&req_id, e))?;
    let products = state
        .services
        .catalog
        .collection_products(id, filter)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, products))
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// GET /api/v1/attributes?collection={id}
pub(super) async fn list_attributes(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiQuery(query): ApiQuery<AttributeQuery>,
) -> Result<Json<ApiResponse<Vec<AttributeWithValues>>>, ApiError> {
    let collection_id =
        parse_id("collection", query.collection.as_deref()).map_err(|e| invalid(&req_id, e))?;
    let attributes = state
        .services
        .catalog
        .list_attributes(collection_id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, attributes))
}

pub(super) async fn get_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ApiResponse<AttributeWithValues>>, ApiError> {
    let attribute = state
        .services
        .catalog
        .get_attribute(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, attribute))
}

pub(super) async fn create_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiJson(body): ApiJson<AttributeInput>,
) -> Result<(StatusCode, Json<ApiResponse<Attribute>>), ApiError> {
    let attribute = state
        .services
        .catalog
        .create_attribute(body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, attribute))
}

pub(super) async fn update_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<AttributeInput>,
) -> Result<Json<ApiResponse<Attribute>>, ApiError> {
    let attribute = state
        .services
        .catalog
        .update_attribute(id, body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, attribute))
}

pub(super) async fn delete_attribute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .catalog
        .delete_attribute(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/attributes/{id}/add_value
pub(super) async fn add_attribute_value(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<AttributeValueRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AttributeValue>>), ApiError> {
    let value = state
        .services
        .catalog
        .add_attribute_value(id, &body.value)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, value))
}

pub(super) async fn delete_attribute_value(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .catalog
        .delete_attribute_value(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// GET /api/v1/products
pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<Json<ApiResponse<Vec<ProductDetail>>>, ApiError> {
    let filter = query.into_filter().map_err(|e| invalid(&req_id, e))?;
    let products = state
        .services
        .catalog
        .list_products(&filter)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, products))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let product = state
        .services
        .catalog
        .get_product(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, product))
}

/// POST /api/v1/products with optional `images` references.
pub(super) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiJson(body): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductDetail>>), ApiError> {
    let product = state
        .services
        .catalog
        .create_product(body.product, body.images)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, product))
}

pub(super) async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<ProductInput>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let product = state
        .services
        .catalog
        .update_product(id, body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, product))
}

pub(super) async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .catalog
        .delete_product(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn add_product_images(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<ProductImagesRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<ProductImage>>>), ApiError> {
    let images = state
        .services
        .catalog
        .add_product_images(id, body.images)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, images))
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// GET /api/v1/variants?product={id}
pub(super) async fn list_variants(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiQuery(query): ApiQuery<VariantQuery>,
) -> Result<Json<ApiResponse<Vec<VariantDetail>>>, ApiError> {
    let product_id =
        parse_id("product", query.product.as_deref()).map_err(|e| invalid(&req_id, e))?;
    let variants = state
        .services
        .catalog
        .list_variants(product_id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, variants))
}

pub(super) async fn get_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ApiResponse<VariantDetail>>, ApiError> {
    let variant = state
        .services
        .catalog
        .get_variant(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, variant))
}

/// POST /api/v1/variants; the attribute selection is validated against the
/// product's collection.
pub(super) async fn create_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiJson(body): ApiJson<VariantInput>,
) -> Result<(StatusCode, Json<ApiResponse<VariantDetail>>), ApiError> {
    let variant = state
        .services
        .catalog
        .create_variant(body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(created(&req_id, variant))
}

/// PUT /api/v1/variants/{id}: full replacement, attribute set included.
pub(super) async fn replace_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<VariantInput>,
) -> Result<Json<ApiResponse<VariantDetail>>, ApiError> {
    let variant = state
        .services
        .catalog
        .replace_variant(id, body)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(respond(&req_id, variant))
}

pub(super) async fn delete_variant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    StaffUser(_staff): StaffUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .catalog
        .delete_variant(id)
        .await
        .map_err(|e| map_service_error(&req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}
