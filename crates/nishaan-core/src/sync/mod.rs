//! Orchestration between the local library, the backend, and the queue.

pub mod coordinator;

use thiserror::Error;

use crate::api::ApiError;
use crate::queue::QueueError;

pub use coordinator::{Submission, SyncCoordinator, SyncStatus};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    #[error("Library lock poisoned")]
    LockPoisoned,
}
