//! Offline-aware operation facade the application layer calls.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::config::SyncConfig;
use crate::error::OfflineError;
use crate::model::{Entity, EntityTable};
use crate::network::{Connectivity, MonitorHandle, NetworkMonitor};
use crate::queue::{MutationQueue, NewOperation, OperationKind};
use crate::remote::{Filter, RemoteService};
use crate::store::KeyValueStore;
use crate::sync::SyncEngine;

/// Per-entity create/update/get/delete that stays usable without
/// connectivity.
///
/// Online, operations go straight to the remote service and reads refresh
/// the table cache. Offline, writes are queued durably and applied to the
/// cache optimistically, and reads serve the last cached state. Reads never
/// block on a down remote; offline writes are delayed, not lost, as long as
/// the backing store survives restarts.
pub struct OfflineClient {
  remote: Arc<dyn RemoteService>,
  cache: CacheManager,
  queue: Arc<MutationQueue>,
  network: NetworkMonitor,
  engine: Arc<SyncEngine>,
  config: SyncConfig,
}

impl OfflineClient {
  pub fn new(
    remote: Arc<dyn RemoteService>,
    store: Arc<dyn KeyValueStore>,
    network: NetworkMonitor,
    config: SyncConfig,
  ) -> Self {
    let cache = CacheManager::new(Arc::clone(&store)).with_default_ttl(config.cache_ttl());
    let queue = Arc::new(MutationQueue::new(store));
    let engine = Arc::new(
      SyncEngine::new(Arc::clone(&queue), Arc::clone(&remote))
        .with_max_attempts(config.max_replay_attempts),
    );

    Self {
      remote,
      cache,
      queue,
      network,
      engine,
      config,
    }
  }

  /// Begin consuming connectivity events, draining the queue on each
  /// reconnect (unless disabled in config). Must be called from within a
  /// tokio runtime. Dropping the returned handle stops the monitoring.
  pub fn start(&self, connectivity: &dyn Connectivity) -> MonitorHandle {
    let engine = self
      .config
      .drain_on_reconnect
      .then(|| Arc::clone(&self.engine));

    self.network.start(connectivity, move || {
      let engine = engine.clone();
      async move {
        if let Some(engine) = engine {
          engine.drain().await;
        }
      }
    })
  }

  pub fn network(&self) -> &NetworkMonitor {
    &self.network
  }

  pub fn queue(&self) -> &MutationQueue {
    &self.queue
  }

  pub fn cache(&self) -> &CacheManager {
    &self.cache
  }

  /// The sync engine, for explicit drains outside the reconnect path.
  pub fn engine(&self) -> Arc<SyncEngine> {
    Arc::clone(&self.engine)
  }

  /// Create a record from a JSON field map.
  ///
  /// Online, returns the authoritative row the remote assigned. Offline,
  /// queues the create and returns an optimistic record carrying a `temp_`
  /// id and current timestamps, already visible to subsequent `get` calls.
  pub async fn create<T: Entity>(&self, data: Value) -> Result<T, OfflineError> {
    if !data.is_object() {
      return Err(OfflineError::PayloadNotObject);
    }

    if self.network.online() {
      let row = self.remote.insert(T::TABLE, data).await?;
      let record: T = decode(row)?;
      self.prepend_cached(&record).await;
      return Ok(record);
    }

    // Queue first: a crash between the two writes must never lose the
    // mutation, only leave the cache stale.
    let op = self
      .queue
      .enqueue(NewOperation {
        kind: OperationKind::Create,
        table: T::TABLE,
        data: data.clone(),
        target_id: None,
      })
      .await;

    let record: T = synthesize(data, &op.id)?;
    self.prepend_cached(&record).await;
    debug!(table = %T::TABLE, id = %op.id, "optimistic create while offline");
    Ok(record)
  }

  /// Patch the record with the given id.
  ///
  /// Offline, the update is queued against the real id and merged into the
  /// cached row; `None` means the record was not in cache (the queued
  /// update still replays on reconnect).
  pub async fn update<T: Entity>(&self, id: &str, patch: Value) -> Result<Option<T>, OfflineError> {
    if !patch.is_object() {
      return Err(OfflineError::PatchNotObject);
    }

    if self.network.online() {
      let row = self.remote.update(T::TABLE, id, patch).await?;
      let record: T = decode(row)?;
      self.replace_cached(&record).await;
      return Ok(Some(record));
    }

    self
      .queue
      .enqueue(NewOperation {
        kind: OperationKind::Update,
        table: T::TABLE,
        data: patch.clone(),
        target_id: Some(id.to_string()),
      })
      .await;

    let merged = self.merge_cached::<T>(id, &patch).await?;
    if merged.is_none() {
      debug!(table = %T::TABLE, id, "offline update queued for a record not in cache");
    }
    Ok(merged)
  }

  /// List records, optionally narrowed by equality filter.
  ///
  /// Online, a successful read refreshes the table cache wholesale; a
  /// failed read (an outage the monitor has not noticed yet) degrades to
  /// cached data. Offline, cached data is served without touching the
  /// remote, with the filter applied locally.
  pub async fn get<T: Entity>(&self, filter: Option<&Filter>) -> Result<Vec<T>, OfflineError> {
    if self.network.online() {
      match self.remote.select(T::TABLE, filter).await {
        Ok(rows) => {
          self.cache.put(T::TABLE.as_str(), &rows, None).await;
          return rows.into_iter().map(decode).collect();
        }
        Err(e) => {
          warn!(table = %T::TABLE, error = %e, "remote read failed, serving cached data");
        }
      }
    }

    Ok(self.cached(filter).await)
  }

  /// Delete the record with the given id, queueing the delete when
  /// offline. Either way the record disappears from the cached list.
  pub async fn delete<T: Entity>(&self, id: &str) -> Result<(), OfflineError> {
    if self.network.online() {
      self.remote.delete(T::TABLE, id).await?;
      self.remove_cached(T::TABLE, id).await;
      return Ok(());
    }

    self
      .queue
      .enqueue(NewOperation {
        kind: OperationKind::Delete,
        table: T::TABLE,
        data: Value::Null,
        target_id: Some(id.to_string()),
      })
      .await;

    self.remove_cached(T::TABLE, id).await;
    Ok(())
  }

  async fn cached<T: Entity>(&self, filter: Option<&Filter>) -> Vec<T> {
    let rows: Vec<Value> = self
      .cache
      .get(T::TABLE.as_str())
      .await
      .unwrap_or_default();

    rows
      .into_iter()
      .filter(|row| filter.map_or(true, |f| f.matches(row)))
      .filter_map(|row| match serde_json::from_value::<T>(row) {
        Ok(record) => Some(record),
        Err(e) => {
          warn!(table = %T::TABLE, error = %e, "skipping cached row with unexpected shape");
          None
        }
      })
      .collect()
  }

  async fn prepend_cached<T: Entity>(&self, record: &T) {
    let value = match serde_json::to_value(record) {
      Ok(value) => value,
      Err(e) => {
        warn!(table = %T::TABLE, error = %e, "failed to serialize record for cache");
        return;
      }
    };

    let mut rows: Vec<Value> = self
      .cache
      .get(T::TABLE.as_str())
      .await
      .unwrap_or_default();
    rows.retain(|row| row_id(row) != Some(record.id()));
    rows.insert(0, value);
    self.cache.put(T::TABLE.as_str(), &rows, None).await;
  }

  async fn replace_cached<T: Entity>(&self, record: &T) {
    let Some(mut rows) = self.cache.get::<Vec<Value>>(T::TABLE.as_str()).await else {
      return;
    };
    let value = match serde_json::to_value(record) {
      Ok(value) => value,
      Err(e) => {
        warn!(table = %T::TABLE, error = %e, "failed to serialize record for cache");
        return;
      }
    };

    if let Some(row) = rows.iter_mut().find(|row| row_id(row) == Some(record.id())) {
      *row = value;
      self.cache.put(T::TABLE.as_str(), &rows, None).await;
    }
  }

  async fn merge_cached<T: Entity>(
    &self,
    id: &str,
    patch: &Value,
  ) -> Result<Option<T>, OfflineError> {
    let Some(mut rows) = self.cache.get::<Vec<Value>>(T::TABLE.as_str()).await else {
      return Ok(None);
    };

    let merged_row = {
      let Some(row) = rows.iter_mut().find(|row| row_id(row) == Some(id)) else {
        return Ok(None);
      };

      if let (Some(fields), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
          fields.insert(key.clone(), value.clone());
        }
        fields.insert(
          "updated_at".to_string(),
          Value::String(Utc::now().to_rfc3339()),
        );
      }
      row.clone()
    };

    let merged: T = decode(merged_row)?;
    self.cache.put(T::TABLE.as_str(), &rows, None).await;
    Ok(Some(merged))
  }

  async fn remove_cached(&self, table: EntityTable, id: &str) {
    let Some(mut rows) = self.cache.get::<Vec<Value>>(table.as_str()).await else {
      return;
    };

    let before = rows.len();
    rows.retain(|row| row_id(row) != Some(id));
    if rows.len() != before {
      self.cache.put(table.as_str(), &rows, None).await;
    }
  }
}

fn row_id(row: &Value) -> Option<&str> {
  row.get("id").and_then(Value::as_str)
}

fn decode<T: Entity>(row: Value) -> Result<T, OfflineError> {
  serde_json::from_value(row).map_err(|e| OfflineError::Decode {
    table: T::TABLE,
    source: e,
  })
}

/// Build the optimistic record for an offline create: the payload plus the
/// assigned temp id and current timestamps.
fn synthesize<T: Entity>(mut data: Value, id: &str) -> Result<T, OfflineError> {
  let now = Utc::now().to_rfc3339();
  let Some(fields) = data.as_object_mut() else {
    return Err(OfflineError::PayloadNotObject);
  };
  fields.insert("id".to_string(), Value::String(id.to_string()));
  fields.insert("created_at".to_string(), Value::String(now.clone()));
  fields.insert("updated_at".to_string(), Value::String(now));
  decode(data)
}
