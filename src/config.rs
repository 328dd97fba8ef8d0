use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_RATE_LIMIT_NAMESPACE: &str = "storefront:rl";
const DEFAULT_JWT_ISSUER: &str = "storefront-api";
const DEV_DEFAULT_JWT_SECRET: &str = "development_only_secret_for_local_storefront_runs";

/// Admission-control settings: one window/limit pair per policy plus the
/// route prefixes that select the stricter policies.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,

    #[validate(range(min = 1))]
    pub general_window_secs: u64,
    #[validate(range(min = 1))]
    pub general_max_requests: u32,

    #[validate(range(min = 1))]
    pub auth_window_secs: u64,
    #[validate(range(min = 1))]
    pub auth_max_requests: u32,

    #[validate(range(min = 1))]
    pub password_reset_window_secs: u64,
    #[validate(range(min = 1))]
    pub password_reset_max_requests: u32,

    /// Comma-separated path prefixes governed by the auth policy
    pub auth_path_prefixes: String,
    /// Comma-separated path prefixes governed by the password-reset policy
    pub password_reset_path_prefixes: String,
    /// Comma-separated path prefixes that bypass rate limiting entirely
    pub exempt_path_prefixes: String,

    /// Emit X-RateLimit-* headers on every response
    pub enable_headers: bool,
    /// Key clients by `X-Forwarded-For`/`X-Real-IP`; enable only behind a
    /// proxy that sets them
    pub trust_forwarded_headers: bool,

    /// Count in Redis instead of process memory
    pub use_redis: bool,
    pub redis_url: String,
    pub namespace: String,

    /// Interval of the expired-bucket sweep
    #[validate(range(min = 1))]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            general_window_secs: 15 * 60,
            general_max_requests: 100,
            auth_window_secs: 5 * 60,
            auth_max_requests: 10,
            password_reset_window_secs: 15 * 60,
            password_reset_max_requests: 5,
            auth_path_prefixes: "/api/v1/auth/login,/api/v1/auth/register".to_string(),
            password_reset_path_prefixes: "/api/v1/auth/forgot-password,/api/v1/auth/reset-password"
                .to_string(),
            exempt_path_prefixes: "/health,/api/v1/health,/metrics".to_string(),
            enable_headers: true,
            trust_forwarded_headers: false,
            use_redis: false,
            redis_url: "redis://localhost:6379".to_string(),
            namespace: DEFAULT_RATE_LIMIT_NAMESPACE.to_string(),
            cleanup_interval_secs: 60,
        }
    }
}

impl RateLimitSettings {
    pub fn general_window(&self) -> Duration {
        Duration::from_secs(self.general_window_secs)
    }

    pub fn auth_window(&self) -> Duration {
        Duration::from_secs(self.auth_window_secs)
    }

    pub fn password_reset_window(&self) -> Duration {
        Duration::from_secs(self.password_reset_window_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Splits a comma-separated setting into trimmed, non-empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
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

    /// HS256 signing secret for bearer tokens
    #[validate(custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    /// Lifetime of tokens issued by the CLI (seconds)
    #[serde(default = "default_jwt_expiration_secs")]
    pub jwt_expiration_secs: u64,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool settings
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// Default page size for paginated API responses
    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u64,

    /// Maximum page size allowed for paginated API responses
    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u64,

    #[serde(default)]
    #[validate]
    pub rate_limit: RateLimitSettings,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials.
    pub fn new(database_url: String, jwt_secret: String, environment: String) -> Self {
        Self {
            database_url,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: default_log_level(),
            log_json: false,
            jwt_secret,
            jwt_issuer: default_jwt_issuer(),
            jwt_expiration_secs: default_jwt_expiration_secs(),
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
            rate_limit: RateLimitSettings::default(),
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

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    /// Configured CORS origins, if any
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(split_list)
            .unwrap_or_default()
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Clamps a requested page size into the configured bounds.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.api_default_page_size)
            .clamp(1, self.api_max_page_size)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS outside development \
                 or opt in with APP__CORS_ALLOW_ANY_ORIGIN=true"
                    .into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The development JWT secret must not be used outside development. \
                 Set APP__JWT_SECRET."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.api_default_page_size == 0 || self.api_default_page_size > self.api_max_page_size {
            let mut err = ValidationError::new("api_default_page_size");
            err.message = Some("api_default_page_size must be within 1..=api_max_page_size".into());
            errors.add("api_default_page_size", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
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

fn default_jwt_issuer() -> String {
    DEFAULT_JWT_ISSUER.to_string()
}

fn default_jwt_expiration_secs() -> u64 {
    3600
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

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_api_page_size() -> u64 {
    20
}

fn default_api_max_page_size() -> u64 {
    100
}

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
    if trimmed.len() < 32 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be at least 32 characters".into());
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

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(default_directive));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
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
            "Config directory '{}' not found; \
             relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?;

    if run_env.eq_ignore_ascii_case(DEFAULT_ENV) {
        builder = builder.set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?;
    }

    let config = builder
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!(
            "JWT secret is not configured. \
             Set APP__JWT_SECRET to a random string of at least 32 characters."
        );
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;
    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
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
            "a_perfectly_reasonable_test_signing_secret".into(),
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://shop.example.com, ".into());
        assert_eq!(cfg.cors_origins(), vec!["https://shop.example.com".to_string()]);
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn dev_secret_rejected_outside_development() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.jwt_secret = DEV_DEFAULT_JWT_SECRET.into();
        assert!(cfg.validate_additional_constraints().is_err());
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn short_or_repeated_secrets_fail_validation() {
        assert!(validate_jwt_secret("too-short").is_err());
        assert!(validate_jwt_secret(&"x".repeat(40)).is_err());
        assert!(validate_jwt_secret("a_perfectly_reasonable_test_signing_secret").is_ok());
    }

    #[test]
    fn rate_limit_defaults_match_policy_table() {
        let rl = RateLimitSettings::default();
        assert_eq!(rl.general_window(), Duration::from_secs(900));
        assert_eq!(rl.general_max_requests, 100);
        assert_eq!(rl.auth_window(), Duration::from_secs(300));
        assert_eq!(rl.auth_max_requests, 10);
        assert_eq!(rl.password_reset_window(), Duration::from_secs(900));
        assert_eq!(rl.password_reset_max_requests, 5);
        assert!(split_list(&rl.exempt_path_prefixes).contains(&"/health".to_string()));
        assert!(!rl.trust_forwarded_headers);
    }

    #[test]
    fn page_size_is_clamped() {
        let cfg = base_config();
        assert_eq!(cfg.page_size(None), 20);
        assert_eq!(cfg.page_size(Some(0)), 1);
        assert_eq!(cfg.page_size(Some(10_000)), 100);
    }

    #[test]
    fn zero_event_channel_capacity_is_rejected() {
        let mut cfg = base_config();
        assert!(cfg.validate().is_ok());
        cfg.event_channel_capacity = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.field_errors().contains_key("event_channel_capacity"));
    }

    #[test]
    fn nested_rate_limit_settings_are_validated() {
        let mut cfg = base_config();
        cfg.rate_limit.auth_max_requests = 0;
        assert!(cfg.validate().is_err());
    }
}
