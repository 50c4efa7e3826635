//! Operator configuration.
//!
//! Loaded once from YAML and handed to the reconciler and controller
//! constructors.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The three requeue tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequeueConfig {
    /// Ordinary transient failures and hard errors.
    pub short_secs: u64,
    /// Rate-limited remote calls.
    pub throttled_secs: u64,
    /// Fully converged objects (drift detection).
    pub steady_secs: u64,
}

impl RequeueConfig {
    pub fn short(&self) -> Duration {
        Duration::from_secs(self.short_secs)
    }

    pub fn throttled(&self) -> Duration {
        Duration::from_secs(self.throttled_secs)
    }

    pub fn steady(&self) -> Duration {
        Duration::from_secs(self.steady_secs)
    }
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            short_secs: 30,
            throttled_secs: 120,
            steady_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    pub region_id: String,
    pub vpc_id: String,
    pub requeue: RequeueConfig,
    /// Attempts per status write before a version conflict is surfaced.
    pub status_update_attempts: u32,
    /// Deadline for a single remote call.
    pub call_timeout_secs: u64,
    pub workers: usize,
    /// Description used for allocations whose spec leaves it empty.
    pub default_description: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            region_id: String::new(),
            vpc_id: String::new(),
            requeue: RequeueConfig::default(),
            status_update_attempts: 5,
            call_timeout_secs: 30,
            workers: 4,
            default_description: "created by eip-operator".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Default config for a region.
    pub fn for_region(region_id: impl Into<String>) -> Self {
        Self {
            region_id: region_id.into(),
            ..Default::default()
        }
    }

    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file without validating it, so callers can
    /// apply overrides first.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: OperatorConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region_id.trim().is_empty() {
            return Err(ConfigError::Invalid("regionId is required".to_string()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.status_update_attempts == 0 {
            return Err(ConfigError::Invalid(
                "statusUpdateAttempts must be at least 1".to_string(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "callTimeoutSecs must be at least 1".to_string(),
            ));
        }
        if self.requeue.throttled_secs <= self.requeue.short_secs {
            return Err(ConfigError::Invalid(format!(
                "requeue.throttledSecs ({}) must be greater than requeue.shortSecs ({})",
                self.requeue.throttled_secs, self.requeue.short_secs
            )));
        }
        if self.requeue.steady_secs < self.requeue.throttled_secs {
            return Err(ConfigError::Invalid(format!(
                "requeue.steadySecs ({}) must not be less than requeue.throttledSecs ({})",
                self.requeue.steady_secs, self.requeue.throttled_secs
            )));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}
