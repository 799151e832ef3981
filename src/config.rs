use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_MARKUP_PERCENT: u32 = 30;
const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Receiving policy knobs.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ReceivingConfig {
    /// Markup percentage applied when a receipt line for an existing product
    /// omits a selling price. Inherited from the legacy storefront behavior;
    /// treat as provisional until confirmed by the product owner.
    #[serde(default = "default_markup_percent")]
    pub default_markup_percent: u32,

    /// How many times a receipt is retried after losing an optimistic
    /// concurrency race before the conflict is surfaced to the caller.
    #[serde(default = "default_max_conflict_retries")]
    #[validate(range(min = 1, max = 10))]
    pub max_conflict_retries: u32,
}

impl Default for ReceivingConfig {
    fn default() -> Self {
        Self {
            default_markup_percent: default_markup_percent(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

impl ReceivingConfig {
    /// Multiplier derived from the configured markup percentage.
    pub fn markup_factor(&self) -> Decimal {
        Decimal::ONE + Decimal::from(self.default_markup_percent) / Decimal::ONE_HUNDRED
    }
}

/// Application configuration, layered from `config/{default,<env>}.toml`
/// files and `APP_`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
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

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Receiving policy
    #[serde(default)]
    pub receiving: ReceivingConfig,
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn new(database_url: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            database_url: database_url.into(),
            host: host.into(),
            port,
            environment: "test".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            receiving: ReceivingConfig::default(),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads configuration: defaults file, then the environment-specific file,
/// then `APP_*` environment variables (double underscore for nesting, e.g.
/// `APP_RECEIVING__DEFAULT_MARKUP_PERCENT`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let settings = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let cfg: AppConfig = settings.try_deserialize()?;
    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("Invalid configuration: {}", e)))?;
    Ok(cfg)
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init_tracing(log_level: &str, log_json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
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
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_markup_percent() -> u32 {
    DEFAULT_MARKUP_PERCENT
}
fn default_max_conflict_retries() -> u32 {
    DEFAULT_MAX_CONFLICT_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn markup_factor_from_percent() {
        let receiving = ReceivingConfig {
            default_markup_percent: 30,
            ..Default::default()
        };
        assert_eq!(receiving.markup_factor(), dec!(1.30));

        let flat = ReceivingConfig {
            default_markup_percent: 0,
            ..Default::default()
        };
        assert_eq!(flat.markup_factor(), dec!(1));
    }

    #[test]
    fn test_constructor_defaults_are_sane() {
        let cfg = AppConfig::new("sqlite::memory:", "127.0.0.1", 18080);
        assert_eq!(cfg.server_addr(), "127.0.0.1:18080");
        assert_eq!(cfg.receiving.max_conflict_retries, 3);
        assert!(cfg.validate().is_ok());
    }
}
