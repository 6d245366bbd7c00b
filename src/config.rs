use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::middleware_helpers::RetryConfig;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8000;
const CONFIG_DIR: &str = "config";
const DEFAULT_STORAGE_DIR: &str = "uploads";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:8080,http://127.0.0.1:8080";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_RECENT_FILES_LIMIT: usize = 10;
const DEFAULT_AI_BASE_URL: &str = "https://api.mistral.ai";
const DEFAULT_AI_MODEL: &str = "mistral-large-latest";

/// Settings for the invoice interpretation model
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AiConfig {
    /// API key; interpretation is skipped when unset
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    /// Attempts per document, including the first
    #[serde(default = "default_ai_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    #[serde(default = "default_ai_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_ai_timeout_secs")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            max_attempts: default_ai_max_attempts(),
            initial_backoff_ms: default_ai_initial_backoff_ms(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

impl AiConfig {
    /// Returns the API key when one is configured and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_millis(self.initial_backoff_ms.saturating_mul(8)),
            backoff_factor: 2.0,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    #[validate(custom = "validate_port")]
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

    /// Directory holding processed-file JSON documents
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// CORS: comma-separated list of allowed origins
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Option<String>,

    /// Allow any origin instead of the list above
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default = "default_true_bool")]
    pub cors_allow_credentials: bool,

    /// Maximum accepted request body for uploads
    #[serde(default = "default_max_upload_bytes")]
    #[validate(range(min = 1024))]
    pub max_upload_bytes: usize,

    /// Number of entries in the dashboard's recent file list
    #[serde(default = "default_recent_files_limit")]
    #[validate(range(min = 1, max = 100))]
    pub recent_files_limit: usize,

    /// Optional price list (CSV or JSON) used for the dashboard discount rate
    #[serde(default)]
    pub price_list_path: Option<PathBuf>,

    #[serde(default)]
    #[validate]
    pub ai: AiConfig,
}

impl AppConfig {
    /// Development configuration rooted at `storage_dir`.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            storage_dir: storage_dir.into(),
            cors_allowed_origins: default_cors_origins(),
            cors_allow_any_origin: false,
            cors_allow_credentials: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            recent_files_limit: DEFAULT_RECENT_FILES_LIMIT,
            price_list_path: None,
            ai: AiConfig::default(),
        }
    }

    /// Parsed, trimmed list of allowed CORS origins.
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_DIR)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
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

fn default_storage_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_DIR)
}

fn default_cors_origins() -> Option<String> {
    Some(DEFAULT_CORS_ORIGINS.to_string())
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_recent_files_limit() -> usize {
    DEFAULT_RECENT_FILES_LIMIT
}

fn default_ai_base_url() -> String {
    DEFAULT_AI_BASE_URL.to_string()
}

fn default_ai_model() -> String {
    DEFAULT_AI_MODEL.to_string()
}

fn default_ai_max_attempts() -> u32 {
    4
}

fn default_ai_initial_backoff_ms() -> u64 {
    2000
}

fn default_ai_timeout_secs() -> u64 {
    60
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

fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        let mut err = ValidationError::new("port");
        err.message = Some("port must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("oreka_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
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
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Loads the `run_env` profile from `config_dir`. `environment` defaults to
/// the profile name.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let default_file = config_dir.join("default");
    let profile_file = config_dir.join(run_env);
    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&default_file.to_string_lossy()).required(false))
        .add_source(File::with_name(&profile_file.to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if app_config.ai.api_key().is_none() {
        info!("No AI API key configured; PDF uploads will not be interpreted");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.environment, "development");
        assert_eq!(cfg.storage_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.max_upload_bytes, 20 * 1024 * 1024);
        assert!(cfg.cors_allow_credentials);
    }

    #[test]
    fn environment_follows_selected_profile() {
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join(CONFIG_DIR);
        let cfg = load_config_from(&shipped, "production").unwrap();
        assert_eq!(cfg.environment, "production");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.recent_files_limit, 10);

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.toml"), "host = \"127.0.0.1\"\n").unwrap();
        std::fs::write(
            dir.path().join("staging.toml"),
            "port = 9100\nenvironment = \"stage\"\n",
        )
        .unwrap();
        let cfg = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.environment, "stage");
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let mut cfg = AppConfig::default();
        assert_eq!(
            cfg.cors_origins(),
            vec!["http://localhost:8080", "http://127.0.0.1:8080"]
        );

        cfg.cors_allowed_origins = Some(" https://a.example , ,https://b.example".into());
        assert_eq!(
            cfg.cors_origins(),
            vec!["https://a.example", "https://b.example"]
        );

        cfg.cors_allowed_origins = None;
        assert!(cfg.cors_origins().is_empty());
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.log_level = "verbose".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("log_level"));
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.port = 0;
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("port"));

        cfg.port = 8080;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn recent_files_limit_is_bounded() {
        let mut cfg = AppConfig::default();
        cfg.recent_files_limit = 0;
        assert!(cfg.validate().is_err());
        cfg.recent_files_limit = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn nested_ai_settings_are_validated() {
        let mut cfg = AppConfig::default();
        cfg.ai.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut ai = AiConfig::default();
        assert_eq!(ai.api_key(), None);
        ai.api_key = Some("   ".into());
        assert_eq!(ai.api_key(), None);
        ai.api_key = Some("sk-test".into());
        assert_eq!(ai.api_key(), Some("sk-test"));
    }

    #[test]
    fn retry_config_follows_ai_settings() {
        let ai = AiConfig {
            max_attempts: 3,
            initial_backoff_ms: 250,
            ..AiConfig::default()
        };
        let retry = ai.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(250));
        assert_eq!(retry.max_delay, Duration::from_millis(2000));
    }
}
