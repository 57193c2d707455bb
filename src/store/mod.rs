//! Persistent key-value storage underneath the cache and the mutation queue.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreError};
pub use traits::KeyValueStore;
