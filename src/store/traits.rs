//! The store adapter contract.

use async_trait::async_trait;

/// Uniform async access to a persistent key-value store.
///
/// Implementations abstract over platform storage (an embedded database on
/// device, an in-memory map in tests or on platforms without durable
/// storage). The contract is availability over strictness: operations never
/// fail outward. A missing key reads as `None`, and an underlying storage
/// fault is logged at the adapter and surfaces as `None`/no-op; every
/// consumer can recover from a miss by refetching from the remote service.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
  /// Read the value stored under `key`, or `None` if absent.
  async fn get(&self, key: &str) -> Option<String>;

  /// Write `value` under `key`, replacing any previous value.
  async fn set(&self, key: &str, value: &str);

  /// Delete the value under `key`. Missing keys are a no-op.
  async fn remove(&self, key: &str);

  /// List every stored key.
  async fn keys(&self) -> Vec<String>;

  /// Delete everything.
  async fn clear(&self);
}
