//! Durable FIFO queue of mutations made while disconnected.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::model::EntityTable;
use crate::store::KeyValueStore;

/// Store key holding the pending operations as one JSON array.
const QUEUE_KEY: &str = "offline_queue";

/// Store key holding operations given up on after repeated replay failures.
const DEAD_LETTER_KEY: &str = "offline_queue_dead";

/// The kind of write a queued operation replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
  Create,
  Update,
  Delete,
}

/// A pending write, persisted until successfully replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOperation {
  /// The targeted entity id for updates and deletes, or a generated
  /// `temp_` id for creates.
  pub id: String,
  pub kind: OperationKind,
  pub table: EntityTable,
  /// The insert payload or update patch; null for deletes.
  pub data: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_id: Option<String>,
  /// Epoch milliseconds at enqueue time.
  pub timestamp: i64,
  /// Failed replay count; defaulted so queues written before this field
  /// existed still load.
  #[serde(default)]
  pub attempts: u32,
}

/// A mutation to enqueue; the queue assigns the id and timestamp.
#[derive(Debug, Clone)]
pub struct NewOperation {
  pub kind: OperationKind,
  pub table: EntityTable,
  pub data: Value,
  pub target_id: Option<String>,
}

/// Generate a placeholder id for a record created offline, superseded once
/// the remote assigns a canonical one.
pub fn temp_id() -> String {
  let suffix: u32 = rand::random();
  format!("temp_{}_{:08x}", Utc::now().timestamp_millis(), suffix)
}

/// Whether an id is a locally generated placeholder.
pub fn is_temp_id(id: &str) -> bool {
  id.starts_with("temp_")
}

/// Ordered, durable list of pending operations.
///
/// The whole queue lives under one store key and every mutation is a
/// read-modify-write of that blob, so all mutating calls serialize through
/// one async mutex; without it, two enqueues interleaving at the store
/// await point could lose an operation. Reads take a snapshot and skip the
/// lock.
pub struct MutationQueue {
  store: Arc<dyn KeyValueStore>,
  write_lock: Mutex<()>,
}

impl MutationQueue {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self {
      store,
      write_lock: Mutex::new(()),
    }
  }

  /// Append an operation, assigning its id (the target id when supplied,
  /// else a fresh temp id) and timestamp. Returns the persisted operation.
  pub async fn enqueue(&self, op: NewOperation) -> QueuedOperation {
    let _guard = self.write_lock.lock().await;

    let queued = QueuedOperation {
      id: op.target_id.clone().unwrap_or_else(temp_id),
      kind: op.kind,
      table: op.table,
      data: op.data,
      target_id: op.target_id,
      timestamp: Utc::now().timestamp_millis(),
      attempts: 0,
    };

    let mut ops = self.load(QUEUE_KEY).await;
    ops.push(queued.clone());
    self.persist(QUEUE_KEY, &ops).await;

    debug!(op = %queued.id, kind = ?queued.kind, table = %queued.table, "queued offline mutation");
    queued
  }

  /// Pending operations in enqueue order. Empty when nothing is queued.
  pub async fn list(&self) -> Vec<QueuedOperation> {
    self.load(QUEUE_KEY).await
  }

  /// Number of pending operations.
  pub async fn len(&self) -> usize {
    self.load(QUEUE_KEY).await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.len().await == 0
  }

  /// Remove the first operation with the given id.
  ///
  /// First-match only: update ids are entity ids and may repeat when the
  /// same record is edited twice offline, and each of those mutations must
  /// replay exactly once.
  pub async fn remove(&self, op_id: &str) {
    let _guard = self.write_lock.lock().await;

    let mut ops = self.load(QUEUE_KEY).await;
    if let Some(pos) = ops.iter().position(|op| op.id == op_id) {
      ops.remove(pos);
      self.persist(QUEUE_KEY, &ops).await;
    }
  }

  /// Delete the queue entirely.
  pub async fn clear(&self) {
    let _guard = self.write_lock.lock().await;
    self.store.remove(QUEUE_KEY).await;
  }

  /// Bump the attempt count on the first operation with the given id and
  /// return the new count. Returns 0 if the operation is no longer queued.
  pub async fn record_failure(&self, op_id: &str) -> u32 {
    let _guard = self.write_lock.lock().await;

    let mut ops = self.load(QUEUE_KEY).await;
    let Some(op) = ops.iter_mut().find(|op| op.id == op_id) else {
      return 0;
    };
    op.attempts = op.attempts.saturating_add(1);
    let attempts = op.attempts;

    self.persist(QUEUE_KEY, &ops).await;
    attempts
  }

  /// Move the first operation with the given id to the dead-letter list,
  /// where it no longer blocks or slows replay but stays inspectable.
  pub async fn discard(&self, op_id: &str) -> Option<QueuedOperation> {
    let _guard = self.write_lock.lock().await;

    let mut ops = self.load(QUEUE_KEY).await;
    let pos = ops.iter().position(|op| op.id == op_id)?;
    let op = ops.remove(pos);
    self.persist(QUEUE_KEY, &ops).await;

    let mut dead = self.load(DEAD_LETTER_KEY).await;
    dead.push(op.clone());
    self.persist(DEAD_LETTER_KEY, &dead).await;

    Some(op)
  }

  /// Operations given up on after exceeding the replay attempt cap.
  pub async fn dead_letters(&self) -> Vec<QueuedOperation> {
    self.load(DEAD_LETTER_KEY).await
  }

  async fn load(&self, key: &str) -> Vec<QueuedOperation> {
    let Some(raw) = self.store.get(key).await else {
      return Vec::new();
    };

    match serde_json::from_str(&raw) {
      Ok(ops) => ops,
      Err(e) => {
        error!(key, error = %e, "queued operations unreadable, treating as empty");
        Vec::new()
      }
    }
  }

  async fn persist(&self, key: &str, ops: &[QueuedOperation]) {
    match serde_json::to_string(ops) {
      Ok(raw) => self.store.set(key, &raw).await,
      Err(e) => error!(key, error = %e, "failed to persist queued operations"),
    }
  }
}
