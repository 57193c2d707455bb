use chrono::Duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::sync::DEFAULT_MAX_ATTEMPTS;

/// Tunables for the offline core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Seconds before a cached table listing goes stale.
  pub cache_ttl_secs: u64,
  /// Failed replays tolerated before an operation is dead-lettered.
  /// `null` keeps retrying forever.
  pub max_replay_attempts: Option<u32>,
  /// Replay the queue automatically when connectivity returns.
  pub drain_on_reconnect: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      cache_ttl_secs: 3600,
      max_replay_attempts: Some(DEFAULT_MAX_ATTEMPTS),
      drain_on_reconnect: true,
    }
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
}

impl SyncConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (an error if missing)
  /// 2. ./tracksync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tracksync/config.yaml
  ///
  /// Falls back to defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(ConfigError::NotFound(p.to_path_buf()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tracksync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tracksync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;

    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      source: e,
    })
  }

  /// The cache TTL as a duration.
  pub fn cache_ttl(&self) -> Duration {
    Duration::seconds(self.cache_ttl_secs as i64)
  }
}
