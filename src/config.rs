use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_DATABASE_URL: &str = "sqlite://shopkeeper.db?mode=rwc";
const DEFAULT_SESSION_COOKIE: &str = "shopkeeper_session";
const DEFAULT_SESSION_TTL_SECS: u64 = 14 * 24 * 60 * 60;
const DEFAULT_SESSION_CLEANUP_SECS: u64 = 60 * 60;

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
    #[serde(default = "default_true_bool")]
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

    /// Name of the cookie carrying the session id
    #[serde(default = "default_session_cookie_name")]
    #[validate(length(min = 1, max = 64))]
    pub session_cookie_name: String,

    /// Idle session lifetime in seconds, refreshed whenever the session is saved
    #[serde(default = "default_session_ttl_secs")]
    #[validate(range(min = 60, max = 31536000))]
    pub session_ttl_secs: u64,

    /// Mark the session cookie `Secure`
    #[serde(default)]
    pub session_cookie_secure: bool,

    /// How often expired sessions are purged
    #[serde(default = "default_session_cleanup_interval_secs")]
    #[validate(range(min = 1))]
    pub session_cleanup_interval_secs: u64,

    /// Page size of the customer list on the home page
    #[serde(default = "default_customers_per_page")]
    #[validate(range(min = 1, max = 100))]
    pub customers_per_page: u64,

    /// Two visits closer than this are considered a contact
    #[serde(default = "default_contact_tracing_window_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub contact_tracing_window_minutes: i64,

    /// How far back contact tracing looks at a customer's visits
    #[serde(default = "default_contact_tracing_lookback_days")]
    #[validate(range(min = 1, max = 365))]
    pub contact_tracing_lookback_days: i64,

    /// Minimum password length accepted at registration
    #[serde(default = "default_password_min_length")]
    #[validate(range(min = 8, max = 128))]
    pub password_min_length: usize,
}

impl AppConfig {
    /// Creates a new configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: default_true_bool(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            session_cookie_name: default_session_cookie_name(),
            session_ttl_secs: default_session_ttl_secs(),
            session_cookie_secure: false,
            session_cleanup_interval_secs: default_session_cleanup_interval_secs(),
            customers_per_page: default_customers_per_page(),
            contact_tracing_window_minutes: default_contact_tracing_window_minutes(),
            contact_tracing_lookback_days: default_contact_tracing_lookback_days(),
            password_min_length: default_password_min_length(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        // Production cookies are only sent over HTTPS
        if self.is_production() && !self.session_cookie_secure {
            let mut err = ValidationError::new("session_cookie_secure_required");
            err.message = Some(
                "Session cookies must be Secure in production. Set APP__SESSION_COOKIE_SECURE=true."
                    .into(),
            );
            errors.add("session_cookie_secure", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections cannot exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        // Cookie names are tokens (RFC 6265); no separators or whitespace
        if !self
            .session_cookie_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            let mut err = ValidationError::new("session_cookie_name");
            err.message =
                Some("Cookie name may only contain ASCII letters, digits, '_' and '-'".into());
            errors.add("session_cookie_name", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Runs derive-based and cross-field validation
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.validate_additional_constraints()
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

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    16
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

fn default_session_cookie_name() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_session_cleanup_interval_secs() -> u64 {
    DEFAULT_SESSION_CLEANUP_SECS
}

fn default_customers_per_page() -> u64 {
    10
}

fn default_contact_tracing_window_minutes() -> i64 {
    30
}

fn default_contact_tracing_lookback_days() -> i64 {
    14
}

fn default_password_min_length() -> usize {
    8
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

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    // Our crate at the configured level, plus per-request spans from tower-http
    let default_directive = format!("shopkeeper={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
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
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] but reads TOML files from `config_dir`
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    // Later sources win: defaults < default.toml < {env}.toml < APP__* variables
    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(
            File::with_name(&config_dir.join("default").to_string_lossy()).required(false),
        )
        .add_source(File::with_name(&config_dir.join(&run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate_all().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn production_requires_secure_cookie() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn production_with_secure_cookie_passes() {
        let mut cfg = base_config();
        cfg.session_cookie_secure = true;
        assert!(cfg.validate_all().is_ok());
    }

    #[test]
    fn development_allows_plain_cookie() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_all().is_ok());
    }

    #[test]
    fn rejects_bad_cookie_name_and_page_size() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.session_cookie_name = "bad name;".into();
        assert!(cfg.validate_all().is_err());

        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.customers_per_page = 0;
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn reports_unknown_keys_as_load_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("default.toml"), "no_such_setting = 1\n").unwrap();

        assert_matches!(load_config_from(dir.path()), Err(AppConfigError::Load(_)));
    }

    #[test]
    fn reports_invalid_values_as_validation_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("default.toml"), "customers_per_page = 0\n").unwrap();

        assert_matches!(
            load_config_from(dir.path()),
            Err(AppConfigError::Validation(_))
        );
    }

    #[test]
    fn loads_values_from_config_dir() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
            database_url = "sqlite::memory:"
            port = 9191
            customers_per_page = 25
            contact_tracing_window_minutes = 45
            "#
        )
        .unwrap();

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.port, 9191);
        assert_eq!(cfg.customers_per_page, 25);
        assert_eq!(cfg.contact_tracing_window_minutes, 45);
        assert_eq!(cfg.session_cookie_name, DEFAULT_SESSION_COOKIE);
    }
}
