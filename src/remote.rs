//! Boundary to the hosted database service.
//!
//! The core never talks HTTP itself; the embedding application hands it an
//! implementation of [`RemoteService`] backed by whatever client the hosted
//! database ships. Rows cross the boundary as JSON objects, matching the
//! row model of such services, and are decoded into typed entities at the
//! facade.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::EntityTable;

/// Failures surfaced by the remote service.
///
/// The split matters for replay: an [`Unavailable`](RemoteError::Unavailable)
/// operation is worth retrying on the next reconnect, while a
/// [`Rejected`](RemoteError::Rejected) one will keep failing until it is
/// dead-lettered.
#[derive(Debug, Error)]
pub enum RemoteError {
  /// The service could not be reached or timed out.
  #[error("remote service unavailable: {0}")]
  Unavailable(String),
  /// The service understood the operation and refused it.
  #[error("remote service rejected the operation: {0}")]
  Rejected(String),
}

/// Column equality clauses applied to a `select`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
  clauses: Vec<(String, Value)>,
}

impl Filter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a `column = value` clause.
  pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
    self.clauses.push((column.into(), value.into()));
    self
  }

  pub fn is_empty(&self) -> bool {
    self.clauses.is_empty()
  }

  pub fn clauses(&self) -> &[(String, Value)] {
    &self.clauses
  }

  /// Whether a row satisfies every clause. Used to apply the same filter
  /// semantics to cached rows that the remote applies to live ones.
  pub fn matches(&self, row: &Value) -> bool {
    self
      .clauses
      .iter()
      .all(|(column, value)| row.get(column) == Some(value))
  }
}

/// CRUD surface of the hosted database, per entity table.
///
/// The service is assumed to apply last-write-wins conflict resolution and
/// to assign canonical ids on insert.
#[async_trait]
pub trait RemoteService: Send + Sync {
  /// Insert a record and return the authoritative row, canonical id
  /// included.
  async fn insert(&self, table: EntityTable, record: Value) -> Result<Value, RemoteError>;

  /// Patch the record with the given id and return the updated row.
  async fn update(&self, table: EntityTable, id: &str, patch: Value)
    -> Result<Value, RemoteError>;

  /// Delete the record with the given id.
  async fn delete(&self, table: EntityTable, id: &str) -> Result<(), RemoteError>;

  /// List rows, optionally narrowed by equality filter.
  async fn select(
    &self,
    table: EntityTable,
    filter: Option<&Filter>,
  ) -> Result<Vec<Value>, RemoteError>;
}
