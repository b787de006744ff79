use crate::{
    entities::{OrderItemModel, OrderLogModel, OrderModel, OrderStatus},
    errors::{ApiError, ServiceError},
    handlers::common::{
        map_service_error, success_response, validate_input, PaginatedResponse, PaginationParams,
    },
    services::orders::OrderView,
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

impl From<OrderView> for OrderResponse {
    fn from(view: OrderView) -> Self {
        Self {
            order: view.order,
            items: view.items,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1, max = 20))]
    pub status: String,
    #[validate(length(min = 1, max = 50))]
    pub actor: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    #[validate(length(min = 1, max = 50))]
    pub actor: String,
    pub reason: Option<String>,
}

fn parse_status(status: &str) -> Result<OrderStatus, ServiceError> {
    match status.to_ascii_lowercase().as_str() {
        "pending" => Ok(OrderStatus::Pending),
        "confirmed" => Ok(OrderStatus::Confirmed),
        "packed" => Ok(OrderStatus::Packed),
        "dispatched" => Ok(OrderStatus::Dispatched),
        "delivered" => Ok(OrderStatus::Delivered),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        other => Err(ServiceError::InvalidStatus(format!(
            "Unknown order status: {other}"
        ))),
    }
}

/// GET /api/v1/orders/:order_id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let view = state
        .services
        .orders
        .get(order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ApiResponse::success(OrderResponse::from(
        view,
    ))))
}

/// GET /api/v1/customers/:customer_id/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let customer = state
        .services
        .customers
        .resolve(&*state.db, &customer_id)
        .await
        .map_err(map_service_error)?;

    let (orders, total) = state
        .services
        .orders
        .list_for_customer(customer.id, params.page(), params.per_page())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        orders,
        params.page(),
        params.per_page(),
        total,
    )))
}

/// GET /api/v1/orders/:order_id/logs
pub async fn get_order_logs(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let logs: Vec<OrderLogModel> = state
        .services
        .orders
        .logs(order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ApiResponse::success(logs)))
}

/// PUT /api/v1/orders/:order_id/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    let status = parse_status(&request.status).map_err(map_service_error)?;

    let order = state
        .services
        .orders
        .update_status(order_id, status, &request.actor, request.note)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ApiResponse::success(order)))
}

/// POST /api/v1/orders/:order_id/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;

    let order = state
        .services
        .orders
        .cancel(order_id, &request.actor, request.reason)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ApiResponse::success(order)))
}
