use axum::{extract::State, http::StatusCode, response::Json, Extension};

use crate::{
    auth::AuthUser, entities::address, errors::ServiceError,
    services::addresses::CreateAddressRequest, ApiResponse, AppState,
};

// POST /api/v1/addresses
pub async fn create_address(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateAddressRequest>,
) -> Result<(StatusCode, Json<ApiResponse<address::Model>>), ServiceError> {
    let created = state
        .services
        .addresses
        .create_address(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

// GET /api/v1/addresses
pub async fn list_addresses(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<address::Model>>>, ServiceError> {
    let addresses = state.services.addresses.list_addresses(user.user_id).await?;
    Ok(Json(ApiResponse::success(addresses)))
}
