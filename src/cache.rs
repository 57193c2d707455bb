//! TTL-based caching of named datasets on top of the key-value store.

use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::store::KeyValueStore;

/// Prefix namespacing cache entries apart from other store keys.
const CACHE_PREFIX: &str = "cache_";

/// Default entry lifetime: one hour.
const DEFAULT_TTL_MS: i64 = 60 * 60 * 1000;

/// A cached dataset with its write time and lifetime, serialized as one
/// JSON blob per key.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
  data: Value,
  /// Epoch milliseconds at write time.
  timestamp: i64,
  /// Lifetime in milliseconds; the entry is valid while
  /// `now - timestamp <= ttl`.
  ttl: i64,
}

/// Caches arbitrary named datasets with lazy TTL eviction.
///
/// There is no background sweep: an expired entry stays in the store until
/// the next read notices and deletes it. Single-key reads and writes are
/// atomic at the store, which is all the coordination the cache needs.
#[derive(Clone)]
pub struct CacheManager {
  store: Arc<dyn KeyValueStore>,
  default_ttl: Duration,
}

impl CacheManager {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self {
      store,
      default_ttl: Duration::milliseconds(DEFAULT_TTL_MS),
    }
  }

  /// Set the TTL applied when `put` is called without an explicit one.
  pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = ttl;
    self
  }

  /// Cache `data` under `key`, replacing any previous entry wholesale.
  ///
  /// Serialization failures are logged and leave the previous entry in
  /// place; a stale cache is recoverable, a crashed caller is not.
  pub async fn put<T: Serialize>(&self, key: &str, data: &T, ttl: Option<Duration>) {
    let data = match serde_json::to_value(data) {
      Ok(value) => value,
      Err(e) => {
        warn!(key, error = %e, "failed to serialize data for cache");
        return;
      }
    };

    let entry = CacheEntry {
      data,
      timestamp: Utc::now().timestamp_millis(),
      ttl: ttl.unwrap_or(self.default_ttl).num_milliseconds(),
    };

    match serde_json::to_string(&entry) {
      Ok(raw) => self.store.set(&self.storage_key(key), &raw).await,
      Err(e) => warn!(key, error = %e, "failed to serialize cache entry"),
    }
  }

  /// Read the dataset cached under `key`.
  ///
  /// Returns `None` when the entry is absent, expired (the entry is
  /// evicted on the spot), or unreadable.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let storage_key = self.storage_key(key);
    let raw = self.store.get(&storage_key).await?;

    let entry: CacheEntry = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, error = %e, "evicting unreadable cache entry");
        self.store.remove(&storage_key).await;
        return None;
      }
    };

    if is_expired(&entry, Utc::now().timestamp_millis()) {
      debug!(key, ttl_ms = entry.ttl, "cache entry expired");
      self.store.remove(&storage_key).await;
      return None;
    }

    match serde_json::from_value(entry.data) {
      Ok(data) => Some(data),
      Err(e) => {
        warn!(key, error = %e, "evicting cache entry with unexpected shape");
        self.store.remove(&storage_key).await;
        None
      }
    }
  }

  /// Drop the entry under `key`, if any. Embedders call this on sign-out
  /// or when the remote dataset is known to have changed shape.
  pub async fn invalidate(&self, key: &str) {
    self.store.remove(&self.storage_key(key)).await;
  }

  fn storage_key(&self, key: &str) -> String {
    format!("{CACHE_PREFIX}{key}")
  }
}

/// An entry is valid while `now - timestamp <= ttl`.
fn is_expired(entry: &CacheEntry, now_ms: i64) -> bool {
  now_ms - entry.timestamp > entry.ttl
}
