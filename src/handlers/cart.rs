use std::collections::BTreeMap;

use axum::{extract::State, response::Json, Extension};
use serde::Deserialize;
use uuid::Uuid;

use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, AppState};

/// Body for replacing the authenticated user's cart. Keys are product ids,
/// values are quantities; the whole request is rejected if any entry is
/// malformed or non-positive.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub cart_items: serde_json::Map<String, serde_json::Value>,
}

// PUT /api/v1/cart
pub async fn update_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UpdateCartRequest>,
) -> Result<Json<ApiResponse<BTreeMap<Uuid, i64>>>, ServiceError> {
    let cart = state
        .services
        .cart
        .update_cart(user.user_id, &request.cart_items)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

// GET /api/v1/cart
pub async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<BTreeMap<Uuid, i64>>>, ServiceError> {
    let cart = state.services.cart.get_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}
