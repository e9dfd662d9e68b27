//! Sync queue manager: enqueue while offline, replay in order once online.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::api::{dispatch, ApiError, BackendActions};
use crate::config::DEFAULT_MAX_RETRIES;
use crate::models::{
    Operation, OperationDecodeError, QueueStatus, QueuedOperation, ReplaySummary,
};

use super::store::QueueStore;
use super::QueueError;

/// Persist `operation` into `store`, stamped with the current time.
pub fn enqueue_into<S>(store: &S, operation: &Operation) -> Result<QueuedOperation, QueueError>
where
    S: QueueStore + ?Sized,
{
    let queued = QueuedOperation::new(operation, Utc::now().timestamp_millis())?;
    store.add(&queued)?;
    info!(op_type = %queued.op_type, op_id = %queued.id, "Queued operation");
    Ok(queued)
}

/// Result of delivering one queued operation.
enum Attempt {
    Delivered,
    /// The backend (or the network) refused it
    Failed(ApiError),
    /// The record cannot be dispatched by this build at all
    ContractViolation(OperationDecodeError),
}

/// Durable, ordered, retrying delivery of deferred mutations.
pub struct SyncQueue<S: QueueStore, B: BackendActions> {
    store: Arc<S>,
    backend: Arc<B>,
    max_retries: u32,
}

impl<S: QueueStore, B: BackendActions> SyncQueue<S, B> {
    pub fn new(store: Arc<S>, backend: Arc<B>) -> Self {
        Self {
            store,
            backend,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Persist `operation` for later replay. Storage errors are returned,
    /// never swallowed.
    pub fn enqueue(&self, operation: &Operation) -> Result<QueuedOperation, QueueError> {
        enqueue_into(self.store.as_ref(), operation)
    }

    /// Replay every queued operation, oldest first, one at a time.
    ///
    /// Delivered operations are removed. A failed operation has its retry
    /// count bumped and is dropped once the count reaches the maximum.
    /// Records this build cannot decode are dropped immediately without a
    /// retry bump. No single operation stops the pass; storage errors do.
    pub async fn replay_all(&self) -> Result<ReplaySummary, QueueError> {
        let operations = self.store.get_all_ordered_by_timestamp()?;

        if operations.is_empty() {
            debug!("Queue is empty");
            return Ok(ReplaySummary::default());
        }

        info!(count = operations.len(), "Replaying queued operations");

        let mut summary = ReplaySummary::default();

        for mut queued in operations {
            match self.attempt(&queued).await {
                Attempt::Delivered => {
                    self.store.remove(&queued.id)?;
                    summary.processed += 1;
                    debug!(op_type = %queued.op_type, op_id = %queued.id, "Replayed operation");
                }
                Attempt::ContractViolation(err) => {
                    error!(
                        op_type = %queued.op_type,
                        op_id = %queued.id,
                        contract_violation = true,
                        error = %err,
                        "Dropping operation this build cannot dispatch"
                    );
                    self.store.remove(&queued.id)?;
                    summary.failed += 1;
                }
                Attempt::Failed(err) => {
                    queued.retries += 1;
                    if queued.retries >= self.max_retries {
                        error!(
                            op_type = %queued.op_type,
                            op_id = %queued.id,
                            retries = queued.retries,
                            retryable = err.is_retryable(),
                            error = %err,
                            "Max retries reached, removing from queue"
                        );
                        self.store.remove(&queued.id)?;
                        summary.failed += 1;
                    } else {
                        warn!(
                            op_type = %queued.op_type,
                            op_id = %queued.id,
                            retries = queued.retries,
                            max_retries = self.max_retries,
                            retryable = err.is_retryable(),
                            error = %err,
                            "Replay failed, will retry"
                        );
                        self.store.put(&queued)?;
                    }
                }
            }
        }

        summary.remaining = self.store.size()?;

        info!(
            processed = summary.processed,
            failed = summary.failed,
            remaining = summary.remaining,
            "Replay complete"
        );

        Ok(summary)
    }

    async fn attempt(&self, queued: &QueuedOperation) -> Attempt {
        let operation = match queued.operation() {
            Ok(operation) => operation,
            Err(err) => return Attempt::ContractViolation(err),
        };

        debug!(op_type = %queued.op_type, op_id = %queued.id, "Processing");
        match dispatch(self.backend.as_ref(), &operation).await {
            Ok(()) => Attempt::Delivered,
            Err(err) => Attempt::Failed(err),
        }
    }

    pub fn size(&self) -> Result<usize, QueueError> {
        self.store.size()
    }

    pub fn status(&self) -> Result<QueueStatus, QueueError> {
        let operations = self.store.get_all_ordered_by_timestamp()?;
        Ok(QueueStatus {
            size: operations.len(),
            operations,
        })
    }

    /// Drop everything queued. Not part of the normal flow.
    pub fn clear(&self) -> Result<(), QueueError> {
        self.store.clear()?;
        info!("Queue cleared");
        Ok(())
    }
}
