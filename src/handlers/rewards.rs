use crate::{
    errors::ApiError,
    handlers::common::{
        map_service_error, success_response, validate_input, PaginatedResponse, PaginationParams,
    },
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
pub struct RewardBalanceResponse {
    pub customer_id: Uuid,
    pub balance: i64,
    pub lifetime_earned: i64,
    pub lifetime_redeemed: i64,
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustRewardsRequest {
    #[validate(range(min = -1_000_000, max = 1_000_000))]
    pub amount: i64,
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
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

/// GET /api/v1/customers/:customer_id/rewards
///
/// A customer with no account yet reads as an empty, active balance.
pub async fn get_balance(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let account = state
        .services
        .rewards
        .get_account(customer_id)
        .await
        .map_err(map_service_error)?;

    let response = match account {
        Some(a) => RewardBalanceResponse {
            customer_id,
            balance: a.balance,
            lifetime_earned: a.lifetime_earned,
            lifetime_redeemed: a.lifetime_redeemed,
            is_active: a.is_active,
        },
        None => RewardBalanceResponse {
            customer_id,
            balance: 0,
            lifetime_earned: 0,
            lifetime_redeemed: 0,
            is_active: true,
        },
    };
    Ok(success_response(ApiResponse::success(response)))
}

/// GET /api/v1/customers/:customer_id/rewards/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let customer_id = resolve_customer(&state, &customer_id).await?;
    let (transactions, total) = state
        .services
        .rewards
        .list_transactions(customer_id, params.page(), params.per_page())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        transactions,
        params.page(),
        params.per_page(),
        total,
    )))
}

/// POST /api/v1/customers/:customer_id/rewards/adjust
///
/// Admin-side signed adjustment; the resulting balance never goes below
/// zero.
pub async fn adjust_balance(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(request): Json<AdjustRewardsRequest>,
) -> Result<Response, ApiError> {
    validate_input(&request)?;
    let customer_id = resolve_customer(&state, &customer_id).await?;

    let account = state
        .services
        .rewards
        .adjust(customer_id, request.amount, &request.reason)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ApiResponse::success(RewardBalanceResponse {
        customer_id,
        balance: account.balance,
        lifetime_earned: account.lifetime_earned,
        lifetime_redeemed: account.lifetime_redeemed,
        is_active: account.is_active,
    })))
}
