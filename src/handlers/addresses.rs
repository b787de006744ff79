use crate::{
    errors::ApiError,
    handlers::common::{
        created_response, map_service_error, no_content_response, success_response, validate_input,
    },
    services::addresses::ShippingAddress,
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAddressRequest {
    #[validate]
    #[serde(flatten)]
    pub address: ShippingAddress,
    #[serde(default)]
    pub make_default: bool,
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

/// GET /api/v1/customers/:customer_id/addresses
pub async fn list_addresses(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let addresses = state
        .services
        .addresses
        .list(customer_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ApiResponse::success(addresses)))
}

/// POST /api/v1/customers/:customer_id/addresses
pub async fn create_address(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<CreateAddressRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let address = state
        .services
        .addresses
        .create(customer_id, request.address, request.make_default)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(ApiResponse::success(address)))
}

/// PUT /api/v1/customers/:customer_id/addresses/:address_id/default
pub async fn set_default_address(
    State(state): State<AppState>,
    Path((customer_id, address_id)): Path<(String, Uuid)>,
) -> Result<Response, ApiError> {
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let address = state
        .services
        .addresses
        .set_default(customer_id, address_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ApiResponse::success(address)))
}

/// DELETE /api/v1/customers/:customer_id/addresses/:address_id
pub async fn delete_address(
    State(state): State<AppState>,
    Path((customer_id, address_id)): Path<(String, Uuid)>,
) -> Result<Response, ApiError> {
    let customer_id = resolve_customer(&state, &customer_id).await?;
    state
        .services
        .addresses
        .delete(customer_id, address_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
