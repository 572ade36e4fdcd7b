//! Configuration module for the DuoLens client
//!
//! Provides layered configuration loading from files, environment
//! variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`DUOLENS_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use duolens::config::ClientConfig;
//!
//! // Load defaults
//! let config = ClientConfig::default();
//! assert_eq!(config.api.base_url, "http://127.0.0.1:8000");
//!
//! // Parse from TOML
//! let toml = r#"
//! [stream]
//! max_attempts = 5
//! "#;
//! let config: ClientConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.stream.max_attempts, 5);
//! ```

pub mod error;
pub mod logging;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};

// Re-export StreamConfig from the stream module
pub use crate::stream::StreamConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Dashboard backend endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend origin serving both the RPCs and the telemetry stream
    pub base_url: String,
    /// Per-request deadline for detection and analytics RPCs
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Rolling history sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Capacity of every rolling window (events, records, samples)
    pub capacity: usize,
    /// Number of buckets for derived latency histograms
    pub histogram_bins: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            histogram_bins: 10,
        }
    }
}

/// Unified configuration for a client session.
///
/// All values are static per session; nothing here is runtime-mutable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend endpoint settings
    pub api: ApiConfig,
    /// Stream reconnection policy
    pub stream: StreamConfig,
    /// Rolling window sizing
    pub history: HistoryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports DUOLENS_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("DUOLENS_BASE_URL") {
            self.api.base_url = url;
        }
        if let Ok(timeout) = std::env::var("DUOLENS_TIMEOUT_SECONDS") {
            if let Ok(t) = timeout.parse() {
                self.api.timeout_seconds = t;
            }
        }
        if let Ok(attempts) = std::env::var("DUOLENS_STREAM_MAX_ATTEMPTS") {
            if let Ok(a) = attempts.parse() {
                self.stream.max_attempts = a;
            }
        }
        if let Ok(level) = std::env::var("DUOLENS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("DUOLENS_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.capacity == 0 {
            return Err(ConfigError::Validation {
                field: "history.capacity".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.history.histogram_bins == 0 {
            return Err(ConfigError::Validation {
                field: "history.histogram_bins".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.stream.growth_factor < 1.0 {
            return Err(ConfigError::Validation {
                field: "stream.growth_factor".to_string(),
                message: "must be at least 1.0".to_string(),
            });
        }
        if self.stream.base_delay_ms == 0 {
            return Err(ConfigError::Validation {
                field: "stream.base_delay_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.history.capacity, 100);
        assert_eq!(config.history.histogram_bins, 10);
        assert_eq!(config.stream.max_attempts, 10);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let result = ClientConfig::load(Some(Path::new("/nonexistent/duolens.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
base_url = "http://10.0.0.5:9000"

[stream]
base_delay_ms = 2000
growth_factor = 1.5
max_attempts = 15

[history]
capacity = 50
"#
        )
        .unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.api.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.stream.base_delay_ms, 2000);
        assert_eq!(config.stream.growth_factor, 1.5);
        assert_eq!(config.stream.max_attempts, 15);
        assert_eq!(config.history.capacity, 50);
        // Untouched sections keep defaults
        assert_eq!(config.history.histogram_bins, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str("[logging]\nlevel = \"debug\"").unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.api.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = ClientConfig::default();
        config.history.capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_shrinking_backoff() {
        let mut config = ClientConfig::default();
        config.stream.growth_factor = 0.5;
        assert!(config.validate().is_err());
    }
}
