use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Json,
    Extension,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::orders::{OrderDetails, PlaceOrderRequest, PlacedOnlineOrder},
    services::reconciliation::VerificationOutcome,
    ApiResponse, AppState,
};

// POST /api/v1/orders/cod
pub async fn place_cod_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), ServiceError> {
    let order_id = state
        .services
        .orders
        .place_cod_order(user.user_id, request)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(json!({ "order_id": order_id }))),
    ))
}

// POST /api/v1/orders/checkout
//
// The Origin header tells us where to send the buyer back after the hosted
// payment page; placement is rejected when it is absent.
pub async fn place_online_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PlacedOnlineOrder>>), ServiceError> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let placed = state
        .services
        .orders
        .place_online_order(user.user_id, request, origin)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(placed))))
}

// GET /api/v1/orders/mine
pub async fn list_my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<OrderDetails>>>, ServiceError> {
    let orders = state.services.orders.list_my_orders(user.user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

// GET /api/v1/orders (admin)
pub async fn list_all_orders(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<OrderDetails>>>, ServiceError> {
    let orders = state.services.orders.list_all_orders().await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Body for the payment verification endpoint. The order is matched by the
/// checkout session id together with the authenticated user.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub session_id: String,
}

// POST /api/v1/orders/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<VerificationOutcome>>, ServiceError> {
    if request.session_id.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "session_id is required".to_string(),
        ));
    }

    let outcome = state
        .services
        .reconciliation
        .verify_payment(&request.session_id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}
