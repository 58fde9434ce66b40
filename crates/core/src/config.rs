//! Environment configuration
//!
//! Reads the `MONARCH_*` environment variables. An unset variable takes
//! its default; an invalid value is reported with `tracing::warn!` and
//! then takes its default; startup never fails on configuration.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Test runs
    Test,
}

/// Log verbosity threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Everything
    Debug,
    /// Operational messages
    #[default]
    Info,
    /// Recoverable anomalies
    Warn,
    /// Failures
    Error,
    /// Unrecoverable failures
    Fatal,
}

/// Log output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Machine-readable JSON lines
    Json,
    /// Human-readable text
    #[default]
    Text,
}

/// Configuration resolved from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    /// `MONARCH_ENV`
    pub environment: Environment,
    /// `MONARCH_DATA_DIR`
    pub data_dir: Option<PathBuf>,
    /// `MONARCH_LOG_LEVEL`
    pub log_level: LogLevel,
    /// `MONARCH_LOG_FORMAT`
    pub log_format: LogFormat,
    /// `MONARCH_MAX_CONCURRENT_OPERATIONS`
    pub max_concurrent_operations: usize,
    /// `MONARCH_OPERATION_TIMEOUT` in milliseconds
    pub operation_timeout: Duration,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            data_dir: None,
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
            max_concurrent_operations: 64,
            operation_timeout: Duration::from_millis(30_000),
        }
    }
}

impl EnvConfig {
    /// Resolve configuration from the process environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("MONARCH_ENV") {
            match raw.as_str() {
                "development" => config.environment = Environment::Development,
                "production" => config.environment = Environment::Production,
                "test" => config.environment = Environment::Test,
                other => warn!(value = other, "invalid MONARCH_ENV, using default"),
            }
        }

        if let Ok(raw) = std::env::var("MONARCH_DATA_DIR") {
            if raw.is_empty() || raw.contains('\x00') {
                warn!("invalid MONARCH_DATA_DIR, ignoring");
            } else {
                config.data_dir = Some(PathBuf::from(raw));
            }
        }

        if let Ok(raw) = std::env::var("MONARCH_LOG_LEVEL") {
            match raw.as_str() {
                "debug" => config.log_level = LogLevel::Debug,
                "info" => config.log_level = LogLevel::Info,
                "warn" => config.log_level = LogLevel::Warn,
                "error" => config.log_level = LogLevel::Error,
                "fatal" => config.log_level = LogLevel::Fatal,
                other => warn!(value = other, "invalid MONARCH_LOG_LEVEL, using default"),
            }
        }

        if let Ok(raw) = std::env::var("MONARCH_LOG_FORMAT") {
            match raw.as_str() {
                "json" => config.log_format = LogFormat::Json,
                "text" => config.log_format = LogFormat::Text,
                other => warn!(value = other, "invalid MONARCH_LOG_FORMAT, using default"),
            }
        }

        if let Ok(raw) = std::env::var("MONARCH_MAX_CONCURRENT_OPERATIONS") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.max_concurrent_operations = n,
                _ => warn!(
                    value = raw.as_str(),
                    "invalid MONARCH_MAX_CONCURRENT_OPERATIONS, using default"
                ),
            }
        }

        if let Ok(raw) = std::env::var("MONARCH_OPERATION_TIMEOUT") {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => config.operation_timeout = Duration::from_millis(ms),
                _ => warn!(
                    value = raw.as_str(),
                    "invalid MONARCH_OPERATION_TIMEOUT, using default"
                ),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests mutate process-wide environment state; keep the
    // variables each test touches disjoint.

    #[test]
    fn test_defaults() {
        let config = EnvConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.data_dir.is_none());
        assert_eq!(config.max_concurrent_operations, 64);
        assert_eq!(config.operation_timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        std::env::set_var("MONARCH_LOG_LEVEL", "loud");
        std::env::set_var("MONARCH_MAX_CONCURRENT_OPERATIONS", "-3");
        let config = EnvConfig::from_env();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.max_concurrent_operations, 64);
        std::env::remove_var("MONARCH_LOG_LEVEL");
        std::env::remove_var("MONARCH_MAX_CONCURRENT_OPERATIONS");
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }
}
