use crate::{
    entities::{CartCouponModel, CartItemModel},
    errors::ApiError,
    handlers::common::{map_service_error, no_content_response, success_response, validate_input},
    services::carts::CartView,
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart_id: Uuid,
    pub customer_id: Uuid,
    pub currency: String,
    pub subtotal: Decimal,
    pub items: Vec<CartItemModel>,
    pub coupon: Option<CartCouponModel>,
    pub updated_at: DateTime<Utc>,
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        Self {
            cart_id: view.cart.id,
            customer_id: view.cart.customer_id,
            currency: view.cart.currency,
            subtotal: view.cart.subtotal,
            items: view.items,
            coupon: view.coupon,
            updated_at: view.cart.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub weight_option_id: Option<Uuid>,
    #[validate(range(min = 1, max = 999))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateItemRequest {
    #[validate(range(min = 0, max = 999))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
}

async fn resolve_customer(state: &AppState, identifier: &str) -> Result<Uuid, ApiError> {
    state
        .services
        .customers
        .resolve(&*state.db, identifier)
        .await
        .map(|c| c.id)
        .map_err(map_service_error)
}

/// GET /api/v1/customers/:customer_id/cart
pub async fn get_cart(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let view = state
        .services
        .carts
        .get_view(customer_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ApiResponse::success(CartResponse::from(
        view,
    ))))
}

/// POST /api/v1/customers/:customer_id/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<AddItemRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let view = state
        .services
        .carts
        .add_item(
            customer_id,
            request.product_id,
            request.weight_option_id,
            request.quantity,
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ApiResponse::success(CartResponse::from(
        view,
    ))))
}

/// PUT /api/v1/customers/:customer_id/cart/items/:item_id
pub async fn update_item(
    State(state): State<AppState>,
    Path((customer_id, item_id)): Path<(String, Uuid)>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let view = state
        .services
        .carts
        .update_item_quantity(customer_id, item_id, request.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ApiResponse::success(CartResponse::from(
        view,
    ))))
}

/// DELETE /api/v1/customers/:customer_id/cart/items/:item_id
pub async fn remove_item(
    State(state): State<AppState>,
    Path((customer_id, item_id)): Path<(String, Uuid)>,
) -> Result<Response, ApiError> {
    let customer_id = resolve_customer(&state, &customer_id).await?;
    state
        .services
        .carts
        .remove_item(customer_id, item_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// POST /api/v1/customers/:customer_id/cart/coupon
pub async fn apply_coupon(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let view = state
        .services
        .carts
        .select_coupon(&state.services.coupons, customer_id, &request.code)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ApiResponse::success(CartResponse::from(
        view,
    ))))
}

/// DELETE /api/v1/customers/:customer_id/cart/coupon
pub async fn remove_coupon(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let view = state
        .services
        .carts
        .remove_coupon(customer_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ApiResponse::success(CartResponse::from(
        view,
    ))))
}
