use crate::{
    errors::ApiError,
    handlers::common::{created_response, map_service_error, validate_input},
    services::checkout::CheckoutRequest,
    ApiResponse, AppState,
};
use axum::{extract::State, response::Response, Json};

/// POST /api/v1/checkout
///
/// Places an order from the customer's cart. Returns 201 with the order
/// id, total, estimated delivery and points earned; a repeated
/// idempotency key replays the original order instead of creating a new
/// one.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed"),
        (status = 400, description = "Validation failure or empty cart"),
        (status = 409, description = "Insufficient stock or unavailable product"),
    ),
    tag = "checkout"
)]
pub async fn place_order(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;

    let outcome = state
        .services
        .checkout
        .place_order(request)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(ApiResponse::success(outcome)))
}
