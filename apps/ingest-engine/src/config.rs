//! Configuration loading and validation.
//!
//! Settings come from a YAML file with serde defaults for every field, then a
//! small set of environment overrides for deploy-time values
//! (`DATABASE_URL`, `PORT`, `COINGECKO_API_KEY`). Rate limits are validated
//! strictly positive so a permanently-empty token bucket cannot be configured.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// ETL runner and scheduler configuration.
    #[serde(default)]
    pub etl: EtlConfig,
    /// Per-source configuration.
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://data/coinflow.db".to_string()
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub host: String,
    /// HTTP port.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_bind_address(),
            port: default_http_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
const fn default_http_port() -> u16 {
    8000
}

/// ETL runner and scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Attempts per run before recording failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the exponential retry backoff, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    /// Minutes between scheduled full runs.
    #[serde(default = "default_schedule_minutes")]
    pub schedule_minutes: u64,
    /// Run all sources once at startup.
    #[serde(default)]
    pub run_on_startup: bool,
    /// Fan sources out over the worker pool instead of running sequentially.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            schedule_minutes: default_schedule_minutes(),
            run_on_startup: false,
            parallel: true,
        }
    }
}

const fn default_max_retries() -> u32 {
    3
}
const fn default_backoff_base() -> f64 {
    2.0
}
const fn default_schedule_minutes() -> u64 {
    30
}
const fn default_true() -> bool {
    true
}

/// Per-source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourcesConfig {
    /// CoinGecko source.
    #[serde(default)]
    pub coingecko: CoinGeckoConfig,
    /// CoinPaprika source.
    #[serde(default)]
    pub coinpaprika: CoinPaprikaConfig,
    /// Local CSV source.
    #[serde(default)]
    pub csv: CsvConfig,
}

/// CoinGecko source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinGeckoConfig {
    /// Register this source with the orchestrator.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API base URL.
    #[serde(default = "default_coingecko_base_url")]
    pub base_url: String,
    /// Requests per minute.
    #[serde(default = "default_coingecko_rate_limit")]
    pub rate_limit: u32,
    /// Optional demo API key (env override `COINGECKO_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_coingecko_base_url(),
            rate_limit: default_coingecko_rate_limit(),
            api_key: None,
        }
    }
}

fn default_coingecko_base_url() -> String {
    crate::ingestion::COINGECKO_BASE_URL.to_string()
}
const fn default_coingecko_rate_limit() -> u32 {
    50
}

/// CoinPaprika source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinPaprikaConfig {
    /// Register this source with the orchestrator.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API base URL.
    #[serde(default = "default_coinpaprika_base_url")]
    pub base_url: String,
    /// Requests per minute.
    #[serde(default = "default_coinpaprika_rate_limit")]
    pub rate_limit: u32,
}

impl Default for CoinPaprikaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_coinpaprika_base_url(),
            rate_limit: default_coinpaprika_rate_limit(),
        }
    }
}

fn default_coinpaprika_base_url() -> String {
    crate::ingestion::COINPAPRIKA_BASE_URL.to_string()
}
const fn default_coinpaprika_rate_limit() -> u32 {
    10
}

/// Local CSV source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvConfig {
    /// Register this source with the orchestrator.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path to the CSV file.
    #[serde(default = "default_csv_path")]
    pub path: String,
    /// Requests per minute (local reads, effectively unthrottled).
    #[serde(default = "default_csv_rate_limit")]
    pub rate_limit: u32,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_csv_path(),
            rate_limit: default_csv_rate_limit(),
        }
    }
}

fn default_csv_path() -> String {
    "data/coins.csv".to_string()
}
const fn default_csv_rate_limit() -> u32 {
    100
}

impl CoinGeckoConfig {
    /// Validated rate limit.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the configured rate is zero.
    pub fn rate(&self) -> Result<NonZeroU32, ConfigError> {
        nonzero_rate("sources.coingecko.rate_limit", self.rate_limit)
    }
}

impl CoinPaprikaConfig {
    /// Validated rate limit.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the configured rate is zero.
    pub fn rate(&self) -> Result<NonZeroU32, ConfigError> {
        nonzero_rate("sources.coinpaprika.rate_limit", self.rate_limit)
    }
}

fn nonzero_rate(field: &str, value: u32) -> Result<NonZeroU32, ConfigError> {
    NonZeroU32::new(value)
        .ok_or_else(|| ConfigError::ValidationError(format!("{field} must be positive")))
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file and apply environment overrides.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///   The default path is allowed to be absent (all defaults apply); an
///   explicit path must exist.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let resolved = path.unwrap_or("config.yaml");

    let mut config = match std::fs::read_to_string(resolved) {
        Ok(contents) => serde_yaml_bw::from_str(&contents)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && path.is_none() => Config::default(),
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: resolved.to_string(),
                source: e,
            });
        }
    };

    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML string (useful for testing).
///
/// Environment overrides are not applied.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml_bw::from_str(yaml)?;
    validate_config(&config)?;
    Ok(config)
}

/// Apply deploy-time environment overrides on top of the file values.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var("DATABASE_URL")
        && !url.is_empty()
    {
        config.database.url = url;
    }
    if let Ok(port) = std::env::var("PORT")
        && let Ok(port) = port.parse::<u16>()
    {
        config.server.port = port;
    }
    if let Ok(key) = std::env::var("COINGECKO_API_KEY")
        && !key.is_empty()
    {
        config.sources.coingecko.api_key = Some(key);
    }
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.database.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "database.url must not be empty".to_string(),
        ));
    }

    if config.etl.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "etl.max_retries must be at least 1".to_string(),
        ));
    }

    if config.etl.backoff_base < 0.0 || !config.etl.backoff_base.is_finite() {
        return Err(ConfigError::ValidationError(
            "etl.backoff_base must be a non-negative number".to_string(),
        ));
    }

    if config.etl.schedule_minutes == 0 {
        return Err(ConfigError::ValidationError(
            "etl.schedule_minutes must be at least 1".to_string(),
        ));
    }

    if config.sources.coingecko.enabled {
        config.sources.coingecko.rate()?;
    }
    if config.sources.coinpaprika.enabled {
        config.sources.coinpaprika.rate()?;
    }
    if config.sources.csv.enabled && config.sources.csv.rate_limit == 0 {
        return Err(ConfigError::ValidationError(
            "sources.csv.rate_limit must be positive".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.etl.max_retries, 3);
        assert!((config.etl.backoff_base - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.etl.schedule_minutes, 30);
        assert!(!config.etl.run_on_startup);
        assert!(config.etl.parallel);
        assert_eq!(config.sources.coingecko.rate_limit, 50);
        assert_eq!(config.sources.coinpaprika.rate_limit, 10);
        assert!(config.sources.csv.enabled);
    }

    #[test]
    fn test_load_minimal_config() {
        let yaml = r"
server:
  port: 9000
";

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.etl.max_retries, 3); // Default value
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r#"
database:
  url: "sqlite://test.db"

server:
  host: "127.0.0.1"
  port: 8080

etl:
  max_retries: 5
  backoff_base: 1.5
  schedule_minutes: 10
  run_on_startup: true
  parallel: false

sources:
  coingecko:
    rate_limit: 30
    api_key: "demo-key"
  coinpaprika:
    enabled: false
  csv:
    path: "fixtures/coins.csv"
"#;

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load full config: {e}"),
        };

        assert_eq!(config.database.url, "sqlite://test.db");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.etl.max_retries, 5);
        assert!((config.etl.backoff_base - 1.5).abs() < f64::EPSILON);
        assert!(config.etl.run_on_startup);
        assert!(!config.etl.parallel);
        assert_eq!(config.sources.coingecko.rate_limit, 30);
        assert_eq!(config.sources.coingecko.api_key.as_deref(), Some("demo-key"));
        assert!(!config.sources.coinpaprika.enabled);
        assert_eq!(config.sources.csv.path, "fixtures/coins.csv");
    }

    #[test]
    fn test_validation_zero_rate_limit() {
        let yaml = r"
sources:
  coingecko:
    rate_limit: 0
";

        let result = load_config_from_string(yaml);
        let Err(err) = result else {
            panic!("expected error for zero rate limit");
        };
        assert!(err.to_string().contains("rate_limit"));
    }

    #[test]
    fn test_zero_rate_limit_accepted_when_source_disabled() {
        let yaml = r"
sources:
  coingecko:
    enabled: false
    rate_limit: 0
";

        assert!(load_config_from_string(yaml).is_ok());
    }

    #[test]
    fn test_validation_zero_max_retries() {
        let yaml = r"
etl:
  max_retries: 0
";

        let result = load_config_from_string(yaml);
        let Err(err) = result else {
            panic!("expected error for zero max_retries");
        };
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_validation_negative_backoff() {
        let yaml = r"
etl:
  backoff_base: -1.0
";

        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_validation_zero_schedule() {
        let yaml = r"
etl:
  schedule_minutes: 0
";

        assert!(load_config_from_string(yaml).is_err());
    }
}
