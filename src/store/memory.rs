//! In-memory store for tests and platforms without durable storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::traits::KeyValueStore;

/// Non-durable [`KeyValueStore`] over a hash map.
///
/// Everything is lost when the process exits, so queued mutations only
/// survive a restart when the app runs on [`SqliteStore`](super::SqliteStore)
/// or another durable backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
    // A poisoned map is still a usable map.
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
  async fn get(&self, key: &str) -> Option<String> {
    self.lock().get(key).cloned()
  }

  async fn set(&self, key: &str, value: &str) {
    self.lock().insert(key.to_string(), value.to_string());
  }

  async fn remove(&self, key: &str) {
    self.lock().remove(key);
  }

  async fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.lock().keys().cloned().collect();
    keys.sort();
    keys
  }

  async fn clear(&self) {
    self.lock().clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn behaves_like_a_store() {
    let store = MemoryStore::new();

    assert_eq!(store.get("k").await, None);
    store.set("k", "v").await;
    assert_eq!(store.get("k").await, Some("v".to_string()));

    store.set("j", "w").await;
    assert_eq!(store.keys().await, vec!["j".to_string(), "k".to_string()]);

    store.clear().await;
    assert_eq!(store.get("k").await, None);
  }
}
