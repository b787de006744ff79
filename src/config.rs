use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Checkout-specific tunables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Flat delivery charge for normal delivery (rupees).
    #[serde(default = "default_delivery_charge_normal")]
    pub delivery_charge_normal: Decimal,

    /// Flat delivery charge for expedited delivery (rupees).
    #[serde(default = "default_delivery_charge_expedited")]
    pub delivery_charge_expedited: Decimal,

    /// Days until estimated delivery, normal.
    #[serde(default = "default_delivery_days_normal")]
    pub estimated_delivery_days_normal: i64,

    /// Days until estimated delivery, expedited.
    #[serde(default = "default_delivery_days_expedited")]
    pub estimated_delivery_days_expedited: i64,

    /// When true, a requested reward redemption that cannot be honored
    /// fails the checkout instead of being skipped with zero discount.
    #[serde(default)]
    pub strict_reward_redemption: bool,

    /// When true (default), a missing or inactive product at checkout maps
    /// to 409 Conflict; when false it is reported as an internal error for
    /// clients depending on the legacy status class.
    #[serde(default = "default_true_bool")]
    pub product_unavailable_is_client_error: bool,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            delivery_charge_normal: default_delivery_charge_normal(),
            delivery_charge_expedited: default_delivery_charge_expedited(),
            estimated_delivery_days_normal: default_delivery_days_normal(),
            estimated_delivery_days_expedited: default_delivery_days_expedited(),
            strict_reward_redemption: false,
            product_unavailable_is_client_error: true,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// ISO currency code used for carts and orders
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Checkout tunables
    #[serde(default)]
    #[validate]
    pub checkout: CheckoutConfig,
}

impl AppConfig {
    /// Construct a configuration programmatically (tests and tools).
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            currency: default_currency(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            event_channel_capacity: default_event_channel_capacity(),
            checkout: CheckoutConfig::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_db_max_connections() -> u32 {
    16
}

fn default_db_min_connections() -> u32 {
    2
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_delivery_charge_normal() -> Decimal {
    Decimal::from(50)
}

fn default_delivery_charge_expedited() -> Decimal {
    Decimal::from(100)
}

fn default_delivery_days_normal() -> i64 {
    5
}

fn default_delivery_days_expedited() -> i64 {
    2
}

fn default_true_bool() -> bool {
    true
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes the tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
