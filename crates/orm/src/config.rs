//! ORM Configuration - runtime knobs for eager loading, logging and pooling
//!
//! Configuration is plain data. Applications either deserialize it from their
//! own config files or build it from environment variables with
//! [`OrmConfig::from_env`].

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Connection pool configuration used by pooled backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
    pub max_lifetime_seconds: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600), // 10 minutes
            max_lifetime_seconds: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

/// Top-level ORM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrmConfig {
    /// Maximum number of keys placed in a single eager-load fetch
    pub eager_batch_size: usize,
    /// Log rendered statements at debug level
    pub log_queries: bool,
    pub pool: PoolConfig,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            eager_batch_size: 1000,
            log_queries: false,
            pool: PoolConfig::default(),
        }
    }
}

impl OrmConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    pub(crate) fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            eager_batch_size: parse_or("ORM_EAGER_BATCH_SIZE", &lookup, defaults.eager_batch_size)?,
            log_queries: parse_bool_or("ORM_LOG_QUERIES", &lookup, defaults.log_queries)?,
            pool: PoolConfig {
                max_connections: parse_or(
                    "DATABASE_MAX_CONNECTIONS",
                    &lookup,
                    defaults.pool.max_connections,
                )?,
                min_connections: parse_or(
                    "DATABASE_MIN_CONNECTIONS",
                    &lookup,
                    defaults.pool.min_connections,
                )?,
                acquire_timeout_seconds: parse_or(
                    "DATABASE_ACQUIRE_TIMEOUT",
                    &lookup,
                    defaults.pool.acquire_timeout_seconds,
                )?,
                ..defaults.pool
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.eager_batch_size == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "eager_batch_size must be greater than zero".to_string(),
            });
        }

        if self.pool.max_connections == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "pool.max_connections must be greater than zero".to_string(),
            });
        }

        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::ValidationFailed {
                message: format!(
                    "pool.min_connections ({}) exceeds pool.max_connections ({})",
                    self.pool.min_connections, self.pool.max_connections
                ),
            });
        }

        Ok(())
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw,
            expected: "a non-negative integer".to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(key: &str, lookup: &F, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw,
                expected: "true or false".to_string(),
            }),
        },
        None => Ok(default),
    }
}
