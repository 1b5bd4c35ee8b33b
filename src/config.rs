use config::{Config, ConfigError, Environment, File};
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
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// Shared HS256 secret used to verify bearer tokens issued by the auth module
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Expected `iss` claim
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    /// Capacity of the post-commit event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Mail relay endpoint; notifications are only logged when unset
    #[serde(default)]
    pub notification_relay_url: Option<String>,

    /// Prefix prepended to every notification subject
    #[serde(default = "default_notification_subject_prefix")]
    pub notification_subject_prefix: String,

    /// Default page size for paginated API responses
    #[serde(default = "default_api_page_size")]
    #[validate(range(min = 1))]
    pub api_default_page_size: u64,

    /// Maximum page size allowed for paginated API responses
    #[serde(default = "default_api_max_page_size")]
    #[validate(range(min = 1))]
    pub api_max_page_size: u64,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, jwt_secret: String, environment: String) -> Self {
        Self {
            database_url,
            host: "0.0.0.0".to_string(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            jwt_secret,
            jwt_issuer: default_jwt_issuer(),
            event_channel_capacity: default_event_channel_capacity(),
            notification_relay_url: None,
            notification_subject_prefix: default_notification_subject_prefix(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Clamps a requested page size into `[1, api_max_page_size]`, falling
    /// back to the default size when none was requested.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.api_default_page_size)
            .clamp(1, self.api_max_page_size.max(1))
    }
}

/// Configuration loading errors
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

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_jwt_issuer() -> String {
    "kitchen-auth".to_string()
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_notification_subject_prefix() -> String {
    "[Kitchen Logistics]".to_string()
}

fn default_api_page_size() -> u64 {
    10
}

fn default_api_max_page_size() -> u64 {
    100
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

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    const DISALLOWED: [&str; 3] = ["your-secret-key", "default-secret-key", "changeme"];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("kitchen_logistics={},tower_http=debug", level);
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

/// Loads application configuration
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

    // jwt_secret has no default; it must come from a file or APP__JWT_SECRET.
    let config = Config::builder()
        .set_default("database_url", "sqlite://kitchen.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "kitchen_logistics_test_secret_0123456789abcdef".into(),
            "production".into(),
        )
    }

    #[test]
    fn valid_config_passes_validation() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert!(!cfg.is_development());
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "too-short".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("jwt_secret"));
    }

    #[test]
    fn repeated_character_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "a".repeat(48);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut cfg = base_config();
        cfg.log_level = "verbose".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("log_level"));
    }

    #[test]
    fn page_size_is_clamped() {
        let cfg = base_config();
        assert_eq!(cfg.page_size(None), 10);
        assert_eq!(cfg.page_size(Some(0)), 1);
        assert_eq!(cfg.page_size(Some(25)), 25);
        assert_eq!(cfg.page_size(Some(10_000)), 100);
    }
}
