use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_CART_DELAY_MS: u64 = 15_000;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SETTINGS_CACHE_TTL_SECS: u64 = 300;

/// Default platform commission: 4.99% + a fixed fee of 100 cents.
const DEFAULT_COMMISSION_BASIS_POINTS: u32 = 499;
const DEFAULT_FIXED_FEE_CENTS: i64 = 100;

/// PIX gateway connection settings.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    #[validate(length(min = 1))]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub api_key: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Timers of the checkout payment state machine.
#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutConfig {
    /// Fixed delay between two status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Global deadline for a single charge's polling cycle.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Inactivity delay before an abandoned-cart record is created.
    #[serde(default = "default_cart_delay_ms")]
    pub abandoned_cart_delay_ms: u64,
}

impl CheckoutConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn abandoned_cart_delay(&self) -> Duration {
        Duration::from_millis(self.abandoned_cart_delay_ms)
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            abandoned_cart_delay_ms: DEFAULT_CART_DELAY_MS,
        }
    }
}

/// Platform-wide commission defaults, used when a merchant has no
/// settings row of their own.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CommissionConfig {
    /// Percentage in basis points (499 = 4.99%).
    #[serde(default = "default_commission_basis_points")]
    #[validate(range(max = 10000))]
    pub percentage_basis_points: u32,
    #[serde(default = "default_fixed_fee_cents")]
    pub fixed_fee_cents: i64,
}

impl CommissionConfig {
    pub fn percentage(&self) -> Decimal {
        Decimal::new(self.percentage_basis_points as i64, 4)
    }
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            percentage_basis_points: DEFAULT_COMMISSION_BASIS_POINTS,
            fixed_fee_cents: DEFAULT_FIXED_FEE_CENTS,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret for merchant bearer tokens
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// TTL for the merchant-settings cache keyed by owner id.
    #[serde(default = "default_settings_cache_ttl_secs")]
    pub settings_cache_ttl_secs: u64,

    #[validate]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub checkout: CheckoutConfig,

    #[serde(default)]
    #[validate]
    pub commission: CommissionConfig,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn settings_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_cache_ttl_secs)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

fn default_cart_delay_ms() -> u64 {
    DEFAULT_CART_DELAY_MS
}

fn default_settings_cache_ttl_secs() -> u64 {
    DEFAULT_SETTINGS_CACHE_TTL_SECS
}

fn default_commission_basis_points() -> u32 {
    DEFAULT_COMMISSION_BASIS_POINTS
}

fn default_fixed_fee_cents() -> i64 {
    DEFAULT_FIXED_FEE_CENTS
}

/// Loads configuration from `config/default`, `config/{environment}` and
/// `APP__`-prefixed environment variables, in that order of precedence.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let config: AppConfig = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    info!(environment = %config.environment, "configuration loaded");
    Ok(config)
}

/// Initializes the tracing subscriber. Call once at startup.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn commission_basis_points_resolve_to_decimal() {
        let commission = CommissionConfig {
            percentage_basis_points: 499,
            fixed_fee_cents: 100,
        };
        assert_eq!(commission.percentage(), dec!(0.0499));
    }

    #[test]
    fn checkout_defaults_match_contract() {
        let checkout = CheckoutConfig::default();
        assert_eq!(checkout.poll_interval(), Duration::from_secs(5));
        assert_eq!(checkout.poll_deadline(), Duration::from_secs(300));
        assert_eq!(checkout.abandoned_cart_delay(), Duration::from_secs(15));
    }
}
