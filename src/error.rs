use thiserror::Error;

use crate::model::EntityTable;
use crate::remote::RemoteError;

/// Errors surfaced by the offline facade.
///
/// Transient connectivity problems never appear here on the read path (reads
/// degrade to cached data) or the offline write path (writes are queued).
#[derive(Debug, Error)]
pub enum OfflineError {
  #[error(transparent)]
  Remote(#[from] RemoteError),

  #[error("failed to decode {table} record: {source}")]
  Decode {
    table: EntityTable,
    #[source]
    source: serde_json::Error,
  },

  #[error("create payload must be a JSON object")]
  PayloadNotObject,

  #[error("update patch must be a JSON object")]
  PatchNotObject,
}
