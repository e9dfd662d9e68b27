//! Durable operation queue.
//!
//! Mutations made while offline are persisted through a `QueueStore` and
//! replayed in enqueue order by `SyncQueue` once connectivity returns.

pub mod manager;
pub mod store;

use thiserror::Error;

use crate::models::OperationDecodeError;

pub use crate::config::DEFAULT_MAX_RETRIES as MAX_RETRIES;
pub use manager::{enqueue_into, SyncQueue};
pub use store::{MemoryQueueStore, QueueStore, SqliteQueueStore};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize operation: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation already queued: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Decode(#[from] OperationDecodeError),

    #[error("Queue lock poisoned")]
    LockPoisoned,
}
