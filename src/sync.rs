//! Replays queued offline mutations against the remote service.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::queue::{MutationQueue, OperationKind, QueuedOperation};
use crate::remote::{RemoteError, RemoteService};

/// Failed replays tolerated before an operation is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// What a drain pass accomplished. Discarded operations are counted in
/// `failed` as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
  pub replayed: usize,
  pub failed: usize,
  pub discarded: usize,
}

/// Drains the mutation queue when connectivity returns.
///
/// A pass snapshots the queue once and replays it in enqueue order, so
/// operations against the same entity keep their causal order (a create
/// replays before a later update to the same temp id). A failed operation
/// is left queued and the pass moves on; stuck operations trade strict
/// cross-entity ordering for liveness. Passes are serialized: a drain
/// requested while one is running waits rather than replaying the same
/// snapshot twice.
pub struct SyncEngine {
  queue: Arc<MutationQueue>,
  remote: Arc<dyn RemoteService>,
  max_attempts: Option<u32>,
  pass_lock: Mutex<()>,
}

impl SyncEngine {
  pub fn new(queue: Arc<MutationQueue>, remote: Arc<dyn RemoteService>) -> Self {
    Self {
      queue,
      remote,
      max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
      pass_lock: Mutex::new(()),
    }
  }

  /// Set the replay attempt cap. `None` retries forever.
  pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
    self.max_attempts = max_attempts;
    self
  }

  /// Replay every queued operation, removing each on success.
  ///
  /// There is no backoff: a failed operation waits for the next reconnect
  /// or explicit drain. Operations that keep failing are moved to the
  /// dead-letter list once they exhaust the attempt cap.
  pub async fn drain(&self) -> DrainOutcome {
    let _pass = self.pass_lock.lock().await;

    let ops = self.queue.list().await;
    if ops.is_empty() {
      return DrainOutcome::default();
    }

    info!(pending = ops.len(), "draining offline queue");
    let mut outcome = DrainOutcome::default();

    for op in ops {
      match self.replay(&op).await {
        Ok(()) => {
          self.queue.remove(&op.id).await;
          outcome.replayed += 1;
        }
        Err(e) => {
          outcome.failed += 1;
          let attempts = self.queue.record_failure(&op.id).await;
          warn!(
            op = %op.id,
            table = %op.table,
            attempts,
            error = %e,
            "replay failed, operation stays queued"
          );

          if let Some(cap) = self.max_attempts {
            if attempts >= cap {
              self.queue.discard(&op.id).await;
              outcome.discarded += 1;
              error!(
                op = %op.id,
                table = %op.table,
                attempts,
                "replay attempts exhausted, operation dead-lettered"
              );
            }
          }
        }
      }
    }

    info!(
      replayed = outcome.replayed,
      failed = outcome.failed,
      discarded = outcome.discarded,
      "drain pass finished"
    );
    outcome
  }

  async fn replay(&self, op: &QueuedOperation) -> Result<(), RemoteError> {
    match op.kind {
      OperationKind::Create => {
        self.remote.insert(op.table, op.data.clone()).await?;
        Ok(())
      }
      OperationKind::Update => {
        let id = op.target_id.as_deref().unwrap_or(&op.id);
        self.remote.update(op.table, id, op.data.clone()).await?;
        Ok(())
      }
      OperationKind::Delete => {
        let id = op.target_id.as_deref().unwrap_or(&op.id);
        self.remote.delete(op.table, id).await
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::EntityTable;
  use crate::queue::NewOperation;
  use crate::store::MemoryStore;
  use crate::testing::MockRemote;
  use serde_json::json;

  fn engine_with(remote: Arc<MockRemote>) -> (Arc<MutationQueue>, SyncEngine) {
    let queue = Arc::new(MutationQueue::new(Arc::new(MemoryStore::new())));
    let engine = SyncEngine::new(Arc::clone(&queue), remote);
    (queue, engine)
  }

  fn create(table: EntityTable, data: serde_json::Value) -> NewOperation {
    NewOperation {
      kind: OperationKind::Create,
      table,
      data,
      target_id: None,
    }
  }

  #[tokio::test]
  async fn empty_queue_drains_to_nothing() {
    let remote = Arc::new(MockRemote::new());
    let (_, engine) = engine_with(Arc::clone(&remote));

    assert_eq!(engine.drain().await, DrainOutcome::default());
    assert!(remote.calls().is_empty());
  }

  #[tokio::test]
  async fn failed_operation_stays_queued_while_others_replay() {
    let remote = Arc::new(MockRemote::new());
    let (queue, engine) = engine_with(Arc::clone(&remote));

    queue
      .enqueue(create(EntityTable::Project, json!({"name": "a"})))
      .await;
    let stuck = queue
      .enqueue(create(EntityTable::Project, json!({"name": "b", "poison": true})))
      .await;
    queue
      .enqueue(create(EntityTable::Project, json!({"name": "c"})))
      .await;

    let outcome = engine.drain().await;
    assert_eq!(outcome.replayed, 2);
    assert_eq!(outcome.failed, 1);

    // Only the poisoned operation remains, and each of the three was
    // attempted exactly once.
    let remaining = queue.list().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, stuck.id);
    assert_eq!(remote.calls().len(), 3);
  }

  #[tokio::test]
  async fn same_entity_operations_replay_in_enqueue_order() {
    let remote = Arc::new(MockRemote::new());
    let (queue, engine) = engine_with(Arc::clone(&remote));

    let created = queue
      .enqueue(create(EntityTable::Milestone, json!({"title": "draft"})))
      .await;
    queue
      .enqueue(NewOperation {
        kind: OperationKind::Update,
        table: EntityTable::Milestone,
        data: json!({"status": "done"}),
        target_id: Some(created.id.clone()),
      })
      .await;

    let outcome = engine.drain().await;
    assert_eq!(outcome.replayed, 2);

    let calls = remote.calls();
    let insert_pos = calls.iter().position(|c| c.starts_with("insert:")).unwrap();
    let update_pos = calls.iter().position(|c| c.starts_with("update:")).unwrap();
    assert!(insert_pos < update_pos);
  }

  #[tokio::test]
  async fn exhausted_operations_are_dead_lettered() {
    let remote = Arc::new(MockRemote::new());
    let (queue, engine) = engine_with(Arc::clone(&remote));
    let engine = engine.with_max_attempts(Some(2));

    queue
      .enqueue(create(EntityTable::Payment, json!({"amount": 1, "poison": true})))
      .await;

    let first = engine.drain().await;
    assert_eq!(first.discarded, 0);
    assert_eq!(queue.len().await, 1);

    let second = engine.drain().await;
    assert_eq!(second.discarded, 1);
    assert!(queue.is_empty().await);
    assert_eq!(queue.dead_letters().await.len(), 1);
  }

  #[tokio::test]
  async fn delete_replays_against_the_target() {
    let remote = Arc::new(MockRemote::new());
    remote.seed(EntityTable::Project, vec![json!({"id": "p1", "name": "a"})]);
    let (queue, engine) = engine_with(Arc::clone(&remote));

    queue
      .enqueue(NewOperation {
        kind: OperationKind::Delete,
        table: EntityTable::Project,
        data: serde_json::Value::Null,
        target_id: Some("p1".to_string()),
      })
      .await;

    let outcome = engine.drain().await;
    assert_eq!(outcome.replayed, 1);
    assert!(remote.rows(EntityTable::Project).is_empty());
  }
}
