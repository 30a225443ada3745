//! Configuration file loading for game review.
//!
//! Every setting has a default, so the file is optional. The command line
//! overrides whatever the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chess_analysis::EngineTimeouts;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Engine deadlines, in seconds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub handshake_secs: u64,
    pub base_secs: u64,
    pub per_depth_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let defaults = EngineTimeouts::default();
        Self {
            handshake_secs: defaults.handshake.as_secs(),
            base_secs: defaults.base.as_secs(),
            per_depth_secs: defaults.per_depth.as_secs(),
            shutdown_grace_secs: defaults.shutdown_grace.as_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn to_engine_timeouts(&self) -> EngineTimeouts {
        EngineTimeouts {
            handshake: Duration::from_secs(self.handshake_secs),
            base: Duration::from_secs(self.base_secs),
            per_depth: Duration::from_secs(self.per_depth_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }
}

/// Contents of `review.toml`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReviewConfig {
    /// Report file. Defaults to `analysis_results.tsv`.
    pub output: PathBuf,
    /// Search depth per position. Defaults to 18.
    pub depth: u32,
    /// Number of engine workers. Defaults to the CPU count minus four.
    pub workers: Option<usize>,
    /// Polyglot opening book.
    pub book: Option<PathBuf>,
    pub timeouts: TimeoutConfig,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("analysis_results.tsv"),
            depth: chess_analysis::analyzer::DEFAULT_DEPTH,
            workers: None,
            book: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl ReviewConfig {
    /// Loads configuration.
    ///
    /// An explicit `path` must exist. Without one, [`Self::config_path()`]
    /// is read if present and defaults are used otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file cannot be read,
    /// or [`ConfigError::ParseError`] if the file contains invalid TOML.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = Self::config_path();
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content =
            std::fs::read_to_string(&config_path).map_err(|source| ConfigError::ReadError {
                path: config_path.clone(),
                source,
            })?;
        tracing::debug!("Loaded configuration from {}", config_path.display());
        Ok(toml::from_str(&content)?)
    }

    /// Returns `review.toml` in the current working directory.
    pub fn config_path() -> PathBuf {
        PathBuf::from("review.toml")
    }
}

/// Everything a run needs, after merging the file with the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSettings {
    pub pgn_dir: PathBuf,
    pub engine_path: PathBuf,
    pub output: PathBuf,
    pub depth: u32,
    pub workers: usize,
    pub book: Option<PathBuf>,
    pub timeouts: EngineTimeouts,
}

/// Default worker count for a machine with `cpus` cores: four are left for
/// the rest of the system, but at least one worker runs.
pub fn default_workers(cpus: usize) -> usize {
    cpus.saturating_sub(4).max(1)
}

/// Expands a leading `~/` using `HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
