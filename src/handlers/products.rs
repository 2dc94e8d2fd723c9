use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::product, errors::ServiceError, services::catalog::CreateProductRequest, ApiResponse,
    AppState, PaginatedResponse,
};

/// Query parameters for the product listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub category: Option<String>,
    pub in_stock: Option<bool>,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

// POST /api/v1/products (admin)
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<product::Model>>), ServiceError> {
    let product = state.services.catalog.create_product(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

// GET /api/v1/products
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<product::Model>>>, ServiceError> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);

    let (items, total) = state
        .services
        .catalog
        .list_products(page, limit, query.category, query.in_stock)
        .await?;

    let total_pages = (total + limit - 1) / limit;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    })))
}

// GET /api/v1/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<product::Model>>, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

// GET /api/v1/products/category/{category}
pub async fn list_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<ApiResponse<Vec<product::Model>>>, ServiceError> {
    let products = state.services.catalog.list_by_category(&category).await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Body for the stock toggle endpoint.
#[derive(Debug, Deserialize)]
pub struct ChangeStockRequest {
    pub in_stock: bool,
}

// PUT /api/v1/products/{id}/stock (admin)
pub async fn change_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeStockRequest>,
) -> Result<Json<ApiResponse<product::Model>>, ServiceError> {
    let product = state
        .services
        .catalog
        .change_stock(id, request.in_stock)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}
