//! Configuration system for Janus Tracer
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde, accepting the legacy camelCase keys
//! - Environment variable overrides
//! - Validation

use crate::engine::EngineConfig;
use crate::pipeline::PipelineConfig;
use crate::store::{
    DEFAULT_DIRECTORY_CAPACITY, DEFAULT_DIRECTORY_TTL_MS, DEFAULT_PENDING_CAPACITY,
    DEFAULT_PENDING_TTL_MS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "JANUS_TRACER_CONFIG";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete tracer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Session directory capacity
    #[serde(alias = "cacheSize")]
    pub cache_size: usize,

    /// Session directory entry lifetime (ms)
    #[serde(alias = "cacheAge")]
    pub cache_age: u64,

    /// Pending-pair capacity
    #[serde(alias = "pendingSize")]
    pub pending_size: usize,

    /// Pending-pair max age (ms)
    #[serde(alias = "pendingAge")]
    pub pending_age: u64,

    /// Trace backend URL; empty disables sending
    pub endpoint: String,

    /// Pass raw lines through to stdout
    pub bypass: bool,

    /// Enable the metrics endpoint
    pub metrics: bool,

    /// Metrics server port
    pub port: u16,

    /// `service` label on metrics
    #[serde(alias = "serviceName")]
    pub service_name: String,

    /// Metrics snapshot log interval (ms)
    pub interval: u64,

    /// Log every span and backend response
    pub debug: bool,

    /// Export queue capacity
    #[serde(alias = "exportBuffer")]
    pub export_buffer: usize,

    /// Max concurrent backend requests
    #[serde(alias = "exportConcurrency")]
    pub export_concurrency: usize,

    /// HTTP request timeout (ms)
    #[serde(alias = "timeoutMs")]
    pub timeout_ms: u64,

    /// Log level: trace, debug, info, warn, error
    #[serde(alias = "logLevel")]
    pub log_level: String,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_DIRECTORY_CAPACITY,
            cache_age: DEFAULT_DIRECTORY_TTL_MS,
            pending_size: DEFAULT_PENDING_CAPACITY,
            pending_age: DEFAULT_PENDING_TTL_MS,
            endpoint: "http://localhost:3100/tempo/api/push".to_string(),
            bypass: true,
            metrics: false,
            port: 9090,
            service_name: "janus-tracer".to_string(),
            interval: 10000,
            debug: false,
            export_buffer: 10000,
            export_concurrency: 64,
            timeout_ms: 10000,
            log_level: "info".to_string(),
        }
    }
}

impl TracerConfig {
    /// Backend endpoint, `None` when sending is disabled
    pub fn endpoint(&self) -> Option<&str> {
        let endpoint = self.endpoint.trim();
        (!endpoint.is_empty()).then_some(endpoint)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            directory_capacity: self.cache_size,
            directory_ttl: Duration::from_millis(self.cache_age),
            pending_capacity: self.pending_size,
            pending_ttl: Duration::from_millis(self.pending_age),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            bypass: self.bypass,
            export_buffer: self.export_buffer,
            export_concurrency: self.export_concurrency,
            debug: self.debug,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. JANUS_TRACER_CONFIG environment variable
    /// 3. $XDG_CONFIG_HOME/janus-tracer/config.toml
    /// 4. /etc/janus-tracer/config.toml
    /// 5. Default values
    ///
    /// Environment overrides are applied on top, then the result is validated.
    pub fn load(&self) -> ConfigResult<TracerConfig> {
        let mut config = match self.find_config_file()? {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                self.load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                TracerConfig::default()
            }
        };

        self.apply_env_overrides(&mut config);
        self.validate(&config)?;
        Ok(config)
    }

    /// Find the config file to use.
    ///
    /// An explicit CLI path that does not exist is an error; the other
    /// locations are optional.
    fn find_config_file(&self) -> ConfigResult<Option<PathBuf>> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::NotFound(path.clone()));
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(Some(path));
            }
            warn!("{} path does not exist: {}", CONFIG_ENV, env_path);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("janus-tracer").join("config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/janus-tracer/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(&self, path: &Path) -> ConfigResult<TracerConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: TracerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut TracerConfig) {
        apply_overrides(config, |key| std::env::var(key).ok());
    }

    /// Validate configuration
    pub fn validate(&self, config: &TracerConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.log_level, valid_levels
            )));
        }

        for (name, value) in [
            ("cache_size", config.cache_size),
            ("pending_size", config.pending_size),
            ("export_buffer", config.export_buffer),
            ("export_concurrency", config.export_concurrency),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if let Some(endpoint) = config.endpoint() {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid endpoint: {}. Must be an http(s) URL",
                    endpoint
                )));
            }
        }

        if config.metrics && config.port == 0 {
            return Err(ConfigError::ValidationError(
                "Metrics port cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `JANUS_TRACER_*` overrides read through `lookup`.
///
/// Unparseable values are ignored with a warning.
fn apply_overrides(config: &mut TracerConfig, lookup: impl Fn(&str) -> Option<String>) {
    fn parsed<T: std::str::FromStr>(key: &str, raw: String, current: T) -> T {
        raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value for {}: {}", key, raw);
            current
        })
    }

    if let Some(val) = lookup("JANUS_TRACER_ENDPOINT") {
        config.endpoint = val;
    }
    if let Some(val) = lookup("JANUS_TRACER_BYPASS") {
        config.bypass = parsed("JANUS_TRACER_BYPASS", val, config.bypass);
    }
    if let Some(val) = lookup("JANUS_TRACER_METRICS") {
        config.metrics = parsed("JANUS_TRACER_METRICS", val, config.metrics);
    }
    if let Some(val) = lookup("JANUS_TRACER_PORT") {
        config.port = parsed("JANUS_TRACER_PORT", val, config.port);
    }
    if let Some(val) = lookup("JANUS_TRACER_CACHE_SIZE") {
        config.cache_size = parsed("JANUS_TRACER_CACHE_SIZE", val, config.cache_size);
    }
    if let Some(val) = lookup("JANUS_TRACER_CACHE_AGE") {
        config.cache_age = parsed("JANUS_TRACER_CACHE_AGE", val, config.cache_age);
    }
    if let Some(val) = lookup("JANUS_TRACER_DEBUG") {
        config.debug = parsed("JANUS_TRACER_DEBUG", val, config.debug);
    }
    if let Some(val) = lookup("JANUS_TRACER_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Some(val) = lookup("JANUS_TRACER_SERVICE_NAME") {
        config.service_name = val;
    }
}

/// Helper module for platform-specific directories
mod dirs {
    use std::path::PathBuf;

    /// Get the user's config directory
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }

        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TracerConfig::default();
        assert_eq!(config.cache_size, 50000);
        assert_eq!(config.cache_age, 60000);
        assert_eq!(config.pending_size, 10000);
        assert_eq!(config.pending_age, 3_600_000);
        assert_eq!(config.endpoint(), Some("http://localhost:3100/tempo/api/push"));
        assert!(config.bypass);
        assert!(!config.metrics);
        assert_eq!(config.port, 9090);
        assert!(ConfigLoader::new().validate(&config).is_ok());
    }

    #[test]
    fn test_parse_legacy_camel_case_keys() {
        let toml_str = r#"
            cacheSize = 100
            cacheAge = 2000
            endpoint = "http://tempo:3200/api/push"
            metrics = true
            port = 9100
            service_name = "pastash-janus"
        "#;
        let config: TracerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cache_size, 100);
        assert_eq!(config.cache_age, 2000);
        assert_eq!(config.endpoint, "http://tempo:3200/api/push");
        assert!(config.metrics);
        assert_eq!(config.port, 9100);
        assert_eq!(config.service_name, "pastash-janus");
        // unspecified keys keep their defaults
        assert!(config.bypass);
        assert_eq!(config.pending_size, 10000);
    }

    #[test]
    fn test_empty_endpoint_disables_sending() {
        let config: TracerConfig = toml::from_str(r#"endpoint = """#).unwrap();
        assert_eq!(config.endpoint(), None);
        assert!(ConfigLoader::new().validate(&config).is_ok());
    }

    #[test]
    fn test_engine_and_pipeline_config() {
        let config = TracerConfig {
            cache_size: 5,
            cache_age: 1500,
            pending_size: 7,
            pending_age: 2500,
            bypass: false,
            export_buffer: 64,
            export_concurrency: 3,
            ..Default::default()
        };

        let engine = config.engine_config();
        assert_eq!(engine.directory_capacity, 5);
        assert_eq!(engine.directory_ttl, Duration::from_millis(1500));
        assert_eq!(engine.pending_capacity, 7);
        assert_eq!(engine.pending_ttl, Duration::from_millis(2500));

        let pipeline = config.pipeline_config();
        assert!(!pipeline.bypass);
        assert_eq!(pipeline.export_buffer, 64);
        assert_eq!(pipeline.export_concurrency, 3);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("JANUS_TRACER_ENDPOINT", ""),
            ("JANUS_TRACER_BYPASS", "false"),
            ("JANUS_TRACER_PORT", "not-a-port"),
            ("JANUS_TRACER_CACHE_SIZE", "42"),
            ("JANUS_TRACER_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = TracerConfig::default();
        apply_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.endpoint(), None);
        assert!(!config.bypass);
        assert_eq!(config.port, 9090);
        assert_eq!(config.cache_size, 42);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_validation_errors() {
        let loader = ConfigLoader::new();

        let bad_level = TracerConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            loader.validate(&bad_level),
            Err(ConfigError::ValidationError(_))
        ));

        let zero_cache = TracerConfig {
            pending_size: 0,
            ..Default::default()
        };
        assert!(loader.validate(&zero_cache).is_err());

        let no_senders = TracerConfig {
            export_concurrency: 0,
            ..Default::default()
        };
        assert!(loader.validate(&no_senders).is_err());

        let bad_endpoint = TracerConfig {
            endpoint: "tempo:3100".to_string(),
            ..Default::default()
        };
        assert!(loader.validate(&bad_endpoint).is_err());

        let zero_port = TracerConfig {
            metrics: true,
            port: 0,
            ..Default::default()
        };
        assert!(loader.validate(&zero_port).is_err());

        // port 0 is fine while metrics are off
        let unused_port = TracerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(loader.validate(&unused_port).is_ok());
    }

    #[test]
    fn test_load_from_cli_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bypass = false\npendingSize = 12\nlog_level = \"warn\"").unwrap();

        let loader = ConfigLoader::new().with_cli_path(Some(file.path().to_path_buf()));
        let config = loader.load_from_file(file.path()).unwrap();
        assert!(!config.bypass);
        assert_eq!(config.pending_size, 12);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_missing_cli_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader =
            ConfigLoader::new().with_cli_path(Some(dir.path().join("missing.toml")));
        assert!(matches!(loader.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cacheSize = \"many\"").unwrap();
        let result = ConfigLoader::new().load_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
