//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$REWEAVE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/reweave/config.toml`
//! 3. `~/.reweave/config.toml` (canonical write location)
//!
//! # Repo Config
//!
//! Located at `<common-dir>/reweave/config.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing (the branch must be a valid
//! branch name, retry and worker counts must be in range).

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// Upper bound on CAS retries.
pub const MAX_RETRIES_LIMIT: u32 = 20;

/// Upper bound on the initial backoff.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Upper bound on rehash workers.
pub const MAX_WORKERS: usize = 256;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// interactive = true
///
/// [apply]
/// max_retries = 3
/// backoff_ms = 50
/// backup_refs = true
///
/// [rehash]
/// workers = 4
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default interactive mode
    pub interactive: Option<bool>,

    /// Ref update defaults
    pub apply: Option<ApplyDefaults>,

    /// Rehash defaults
    pub rehash: Option<RehashDefaults>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(apply) = &self.apply {
            apply.validate()?;
        }
        if let Some(rehash) = &self.rehash {
            rehash.validate()?;
        }
        Ok(())
    }
}

/// Repository configuration.
///
/// # Example
///
/// ```toml
/// branch = "main"
///
/// [apply]
/// backup_refs = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Branch rewritten when none is given on the command line
    pub branch: Option<String>,

    /// Ref update overrides
    pub apply: Option<ApplyDefaults>,

    /// Rehash overrides
    pub rehash: Option<RehashDefaults>,
}

impl RepoConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(branch) = &self.branch {
            BranchName::new(branch)
                .map_err(|e| ConfigError::InvalidValue(format!("invalid branch name: {}", e)))?;
        }
        if let Some(apply) = &self.apply {
            apply.validate()?;
        }
        if let Some(rehash) = &self.rehash {
            rehash.validate()?;
        }
        Ok(())
    }
}

/// Ref update settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ApplyDefaults {
    /// CAS retries after the first attempt
    pub max_retries: Option<u32>,

    /// Initial backoff between retries, doubled each time
    pub backoff_ms: Option<u64>,

    /// Record refs/reweave/{original,rewritten}/<branch>
    pub backup_refs: Option<bool>,
}

impl ApplyDefaults {
    /// Validate ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(retries) = self.max_retries {
            if retries > MAX_RETRIES_LIMIT {
                return Err(ConfigError::InvalidValue(format!(
                    "apply.max_retries must be at most {}, got {}",
                    MAX_RETRIES_LIMIT, retries
                )));
            }
        }
        if let Some(backoff) = self.backoff_ms {
            if backoff > MAX_BACKOFF_MS {
                return Err(ConfigError::InvalidValue(format!(
                    "apply.backoff_ms must be at most {}, got {}",
                    MAX_BACKOFF_MS, backoff
                )));
            }
        }
        Ok(())
    }
}

/// Rehash settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RehashDefaults {
    /// Worker count; 1 runs the sequential walk
    pub workers: Option<usize>,
}

impl RehashDefaults {
    /// Validate ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(workers) = self.workers {
            if workers == 0 || workers > MAX_WORKERS {
                return Err(ConfigError::InvalidValue(format!(
                    "rehash.workers must be between 1 and {}, got {}",
                    MAX_WORKERS, workers
                )));
            }
        }
        Ok(())
    }
}
