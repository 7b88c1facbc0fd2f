//! Scan run configuration.
//!
//! A [`ScanConfig`] describes one scan-and-fix run: which log to read,
//! which interval, how aggressively to fetch, where trusted roots come
//! from, and optionally which log repaired chains are submitted to. Loaded
//! from TOML; every field except `log_url` has a usable default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scanner::RetryPolicy;

/// Configuration for a scan-and-fix run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Base URL of the log to scan, without the `/ct/v1` suffix.
    pub log_url: String,

    /// Entries requested per `get-entries` call.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Concurrent fetch workers.
    #[serde(default = "default_parallel_fetch")]
    pub parallel_fetch: usize,

    /// First entry index to scan (inclusive).
    #[serde(default)]
    pub start_index: u64,

    /// End of the scan interval (exclusive). Zero means "to the log's
    /// current tree size".
    #[serde(default)]
    pub end_index: u64,

    /// Path to a PEM bundle of trusted roots. When unset, chains are
    /// anchored only against roots seen in scanned entries.
    #[serde(default)]
    pub root_bundle: Option<PathBuf>,

    /// Base URL of the log to submit repaired chains to. When unset,
    /// repaired chains are reported but not submitted.
    #[serde(default)]
    pub submit_url: Option<String>,

    /// Pause policy between failed `get-entries` attempts.
    #[serde(default)]
    pub retry: RetryPolicy,
}

const fn default_batch_size() -> u64 {
    1000
}

const fn default_parallel_fetch() -> usize {
    1
}

impl ScanConfig {
    /// A configuration with defaults for everything but the scan URL.
    #[must_use]
    pub fn new(log_url: impl Into<String>) -> Self {
        Self {
            log_url: log_url.into(),
            batch_size: default_batch_size(),
            parallel_fetch: default_parallel_fetch(),
            start_index: 0,
            end_index: 0,
            root_bundle: None,
            submit_url: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the parsed values fail
    /// [`validate`](Self::validate).
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_url.trim().is_empty() {
            return Err(ConfigError::Validation("log_url must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation("batch_size must be at least 1".to_string()));
        }
        if self.parallel_fetch == 0 {
            return Err(ConfigError::Validation(
                "parallel_fetch must be at least 1".to_string(),
            ));
        }
        if self.end_index != 0 && self.end_index < self.start_index {
            return Err(ConfigError::Validation(
                "end_index must not be below start_index".to_string(),
            ));
        }
        if let Some(url) = &self.submit_url {
            if url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "submit_url must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Errors from loading or validating a [`ScanConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
