//! Offline cache, durable mutation queue, and reconnect sync for
//! project-tracking apps backed by a hosted database.
//!
//! The application layer talks to an [`OfflineClient`]: per-entity
//! create/update/get/delete that goes straight to the remote service while
//! online and degrades to cached reads and queued, optimistic writes while
//! offline. A [`NetworkMonitor`] owns the connectivity state and, once
//! started, replays the queue through the [`SyncEngine`] whenever the
//! connection comes back.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(SqliteStore::open()?);
//! let remote = Arc::new(MyHostedDb::new(credentials));
//! let monitor = NetworkMonitor::new();
//! let client = OfflineClient::new(remote, store, monitor, SyncConfig::default());
//!
//! // Feed platform connectivity events into the monitor and drain the
//! // queue on every reconnect.
//! let connectivity = ManualConnectivity::new(true);
//! let handle = client.start(&connectivity);
//!
//! // Works the same online and offline.
//! let project: Project = client
//!   .create(json!({"name": "Harbor refit", "status": "active"}))
//!   .await?;
//! let projects: Vec<Project> = client.get(None).await?;
//! ```

pub mod cache;
pub mod client;
pub mod config;
mod error;
pub mod model;
pub mod network;
pub mod queue;
pub mod remote;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use cache::CacheManager;
pub use client::OfflineClient;
pub use config::{ConfigError, SyncConfig};
pub use error::OfflineError;
pub use model::{Entity, EntityTable, Milestone, Outsourcing, Payment, Project};
pub use network::{
  Connectivity, ManualConnectivity, MonitorHandle, NetworkMonitor, Subscription,
};
pub use queue::{MutationQueue, NewOperation, OperationKind, QueuedOperation};
pub use remote::{Filter, RemoteError, RemoteService};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreError};
pub use sync::{DrainOutcome, SyncEngine};
