pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{config::AppConfig, events::EventSender, handlers::AppServices};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
    pub event_sender: Arc<EventSender>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let services = AppServices::new(db.clone(), event_sender.clone(), &config);
        Self {
            db,
            config,
            services,
            event_sender,
        }
    }
}

/// Uniform JSON envelope for API responses.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

async fn api_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = state.db.ping().await.is_ok();
    Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": if db_ok { "up" } else { "down" },
    }))
}

/// All versioned API routes, nested under `/api/v1` by the caller.
pub fn api_v1_routes() -> Router<AppState> {
    let checkout = Router::new().route("/checkout", post(handlers::checkout::place_order));

    let carts = Router::new()
        .route("/customers/:customer_id/cart", get(handlers::carts::get_cart))
        .route(
            "/customers/:customer_id/cart/items",
            post(handlers::carts::add_item),
        )
        .route(
            "/customers/:customer_id/cart/items/:item_id",
            put(handlers::carts::update_item).delete(handlers::carts::remove_item),
        )
        .route(
            "/customers/:customer_id/cart/coupon",
            post(handlers::carts::apply_coupon).delete(handlers::carts::remove_coupon),
        );

    let orders = Router::new()
        .route("/orders/:order_id", get(handlers::orders::get_order))
        .route("/orders/:order_id/logs", get(handlers::orders::get_order_logs))
        .route(
            "/orders/:order_id/status",
            put(handlers::orders::update_order_status),
        )
        .route("/orders/:order_id/cancel", post(handlers::orders::cancel_order))
        .route(
            "/customers/:customer_id/orders",
            get(handlers::orders::list_orders),
        );

    let rewards = Router::new()
        .route(
            "/customers/:customer_id/rewards",
            get(handlers::rewards::get_balance),
        )
        .route(
            "/customers/:customer_id/rewards/transactions",
            get(handlers::rewards::list_transactions),
        )
        .route(
            "/customers/:customer_id/rewards/adjust",
            post(handlers::rewards::adjust_balance),
        );

    let addresses = Router::new()
        .route(
            "/customers/:customer_id/addresses",
            get(handlers::addresses::list_addresses).post(handlers::addresses::create_address),
        )
        .route(
            "/customers/:customer_id/addresses/:address_id",
            delete(handlers::addresses::delete_address),
        )
        .route(
            "/customers/:customer_id/addresses/:address_id/default",
            put(handlers::addresses::set_default_address),
        );

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(checkout)
        .merge(carts)
        .merge(orders)
        .merge(rewards)
        .merge(addresses)
}
