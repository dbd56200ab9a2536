//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! reweave has two configuration scopes:
//! - **Global**: User-level settings
//! - **Repo**: Repository-level overrides
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$REWEAVE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/reweave/config.toml`
//! 3. `~/.reweave/config.toml` (canonical write location)
//!
//! # Repo Config Location
//!
//! `<common_dir>/reweave/config.toml`, routed through
//! [`ReweavePaths`](crate::core::paths::ReweavePaths).
//!
//! # Example
//!
//! ```no_run
//! use reweave::core::config::Config;
//! use reweave::core::paths::ReweavePaths;
//! use std::path::PathBuf;
//!
//! let paths = ReweavePaths::new(PathBuf::from("/repo/.git"), PathBuf::from("/repo/.git"));
//! let config = Config::load(Some(&paths)).unwrap().config;
//!
//! println!("Branch: {}", config.branch());
//! println!("Retries: {}", config.max_retries());
//! ```

pub mod schema;

pub use schema::{ApplyDefaults, GlobalConfig, RehashDefaults, RepoConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::paths::ReweavePaths;

/// Branch rewritten when neither the command line nor config names one.
pub const DEFAULT_BRANCH: &str = "main";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence; repo config overrides global config.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Repository configuration (if in a repo and present)
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

/// Keys understood by `config get` / `config set`.
pub const KEYS: &[&str] = &[
    "branch",
    "interactive",
    "apply.max_retries",
    "apply.backoff_ms",
    "apply.backup_refs",
    "rehash.workers",
];

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `paths` is provided, also loads repo-specific config.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or
    /// contain invalid values. Missing files are not an error.
    pub fn load(paths: Option<&ReweavePaths>) -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let (global, global_path) = Self::load_global(&mut warnings)?;

        let (repo, repo_path) = match paths {
            Some(paths) => {
                let path = paths.repo_config_path();
                if path.exists() {
                    (Some(read_toml::<RepoConfig>(&path)?), Some(path))
                } else {
                    (None, None)
                }
            }
            None => (None, None),
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                repo,
                global_path,
                repo_path,
            },
            warnings,
        })
    }

    fn load_global(
        warnings: &mut Vec<ConfigWarning>,
    ) -> Result<(GlobalConfig, Option<PathBuf>), ConfigError> {
        if let Ok(path) = std::env::var("REWEAVE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                let config = read_toml(&path)?;
                return Ok((config, Some(path)));
            }
            warnings.push(ConfigWarning {
                message: "REWEAVE_CONFIG points at a missing file; falling back to defaults"
                    .to_string(),
                path,
            });
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("reweave/config.toml");
            if path.exists() {
                let config = read_toml(&path)?;
                return Ok((config, Some(path)));
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".reweave/config.toml");
            if path.exists() {
                let config = read_toml(&path)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((GlobalConfig::default(), None))
    }

    /// Canonical path for global config: `~/.reweave/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".reweave/config.toml"))
    }

    /// Write global config atomically.
    pub fn write_global(config: &GlobalConfig) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = Self::global_config_path()?;
        write_config_atomic(&path, config)?;
        Ok(path)
    }

    /// Write repo config atomically.
    pub fn write_repo(paths: &ReweavePaths, config: &RepoConfig) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = paths.repo_config_path();
        write_config_atomic(&path, config)?;
        Ok(path)
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Branch to rewrite. Defaults to `main`.
    pub fn branch(&self) -> &str {
        self.repo
            .as_ref()
            .and_then(|r| r.branch.as_deref())
            .unwrap_or(DEFAULT_BRANCH)
    }

    /// Value of the `interactive` key. Defaults to `true`.
    pub fn interactive(&self) -> bool {
        self.global.interactive.unwrap_or(true)
    }

    /// Whether to prompt before mutating.
    ///
    /// A command-line choice wins, then an explicit `interactive` key, then
    /// whether stdin is a terminal.
    pub fn prompts_enabled(&self, flag: Option<bool>, stdin_is_terminal: bool) -> bool {
        flag.or(self.global.interactive).unwrap_or(stdin_is_terminal)
    }

    fn apply_value<T>(&self, get: impl Fn(&ApplyDefaults) -> Option<T>) -> Option<T> {
        let repo = self.repo.as_ref().and_then(|r| r.apply.as_ref()).and_then(&get);
        repo.or_else(|| self.global.apply.as_ref().and_then(&get))
    }

    /// CAS retries after the first attempt. Defaults to 3.
    pub fn max_retries(&self) -> u32 {
        self.apply_value(|a| a.max_retries).unwrap_or(3)
    }

    /// Initial retry backoff in milliseconds. Defaults to 50.
    pub fn backoff_ms(&self) -> u64 {
        self.apply_value(|a| a.backoff_ms).unwrap_or(50)
    }

    /// Whether backup refs are recorded. Defaults to `true`.
    pub fn backup_refs(&self) -> bool {
        self.apply_value(|a| a.backup_refs).unwrap_or(true)
    }

    /// Rehash worker count. Defaults to 1 (sequential).
    pub fn workers(&self) -> usize {
        self.repo
            .as_ref()
            .and_then(|r| r.rehash.as_ref())
            .and_then(|r| r.workers)
            .or_else(|| self.global.rehash.as_ref().and_then(|r| r.workers))
            .unwrap_or(1)
    }

    /// Effective value of a key, rendered as text.
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        Ok(match key {
            "branch" => self.branch().to_string(),
            "interactive" => self.interactive().to_string(),
            "apply.max_retries" => self.max_retries().to_string(),
            "apply.backoff_ms" => self.backoff_ms().to_string(),
            "apply.backup_refs" => self.backup_refs().to_string(),
            "rehash.workers" => self.workers().to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        })
    }

    /// Path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Path to the loaded repo config file.
    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

impl GlobalConfig {
    /// Set a key from its textual value. `branch` is repo-only.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "interactive" => self.interactive = Some(parse_value(key, value)?),
            _ => set_shared(&mut self.apply, &mut self.rehash, key, value)?,
        }
        self.validate()
    }
}

impl RepoConfig {
    /// Set a key from its textual value. `interactive` is global-only.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "branch" => self.branch = Some(value.to_string()),
            _ => set_shared(&mut self.apply, &mut self.rehash, key, value)?,
        }
        self.validate()
    }
}

fn set_shared(
    apply: &mut Option<ApplyDefaults>,
    rehash: &mut Option<RehashDefaults>,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    match key {
        "apply.max_retries" => {
            apply.get_or_insert_with(Default::default).max_retries = Some(parse_value(key, value)?)
        }
        "apply.backoff_ms" => {
            apply.get_or_insert_with(Default::default).backoff_ms = Some(parse_value(key, value)?)
        }
        "apply.backup_refs" => {
            apply.get_or_insert_with(Default::default).backup_refs = Some(parse_value(key, value)?)
        }
        "rehash.workers" => {
            rehash.get_or_insert_with(Default::default).workers = Some(parse_value(key, value)?)
        }
        _ if KEYS.contains(&key) => {
            return Err(ConfigError::InvalidValue(format!(
                "'{}' cannot be set in this scope",
                key
            )))
        }
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("'{}' is not a valid value for {}", value, key)))
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Write to a sibling temp file, fsync, then rename over the target.
fn write_config_atomic<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ConfigError::WriteError { path, source }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err(path))?;
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

    let temp_path = path.with_extension("toml.tmp");
    let mut file = fs::File::create(&temp_path).map_err(write_err(&temp_path))?;
    file.write_all(contents.as_bytes())
        .map_err(write_err(&temp_path))?;
    file.sync_all().map_err(write_err(&temp_path))?;

    fs::rename(&temp_path, path).map_err(write_err(path))?;
    Ok(())
}
