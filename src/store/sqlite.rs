//! SQLite-backed store for platforms with durable local storage.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

use super::traits::KeyValueStore;

/// Failures opening or accessing the backing database.
///
/// Only construction propagates these; once a store is open, the
/// [`KeyValueStore`] contract logs and degrades instead.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("could not determine data directory")]
  NoDataDir,

  #[error("failed to create store directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to open store at {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: rusqlite::Error,
  },

  #[error("store mutex poisoned")]
  Poisoned,

  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),
}

/// Schema for the key-value table.
const KV_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Durable key-value store over a single SQLite table.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self, StoreError> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDir {
        path: parent.to_path_buf(),
        source: e,
      })?;
    }

    let conn = Connection::open(path).map_err(|e| StoreError::Open {
      path: path.to_path_buf(),
      source: e,
    })?;

    Self::from_connection(conn)
  }

  /// Open a transient in-memory store. Useful in tests; data does not
  /// survive the process.
  pub fn in_memory() -> Result<Self, StoreError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(KV_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Default database path under the platform data directory.
  fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StoreError::NoDataDir)?;

    Ok(data_dir.join("tracksync").join("offline.db"))
  }

  fn with_conn<R>(
    &self,
    f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
  ) -> Result<R, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(f(&conn)?)
  }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
  async fn get(&self, key: &str) -> Option<String> {
    let result = self.with_conn(|conn| {
      conn
        .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
          row.get(0)
        })
        .optional()
    });

    match result {
      Ok(value) => value,
      Err(e) => {
        warn!(key, error = %e, "store read failed");
        None
      }
    }
  }

  async fn set(&self, key: &str, value: &str) {
    let result = self.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
        params![key, value],
      )
    });

    if let Err(e) = result {
      warn!(key, error = %e, "store write failed");
    }
  }

  async fn remove(&self, key: &str) {
    let result = self.with_conn(|conn| conn.execute("DELETE FROM kv WHERE key = ?", params![key]));

    if let Err(e) = result {
      warn!(key, error = %e, "store delete failed");
    }
  }

  async fn keys(&self) -> Vec<String> {
    let result = self.with_conn(|conn| {
      let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
      let keys = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
      Ok(keys)
    });

    match result {
      Ok(keys) => keys,
      Err(e) => {
        warn!(error = %e, "store key listing failed");
        Vec::new()
      }
    }
  }

  async fn clear(&self) {
    let result = self.with_conn(|conn| conn.execute("DELETE FROM kv", []));

    if let Err(e) = result {
      warn!(error = %e, "store clear failed");
    }
  }
}
