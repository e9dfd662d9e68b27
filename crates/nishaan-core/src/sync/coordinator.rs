//! Decides, per mutation, between running it now and queueing it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{dispatch, BackendActions};
use crate::connectivity::ConnectivityObserver;
use crate::models::{Library, Operation, OperationType, QueuedOperation, ReplaySummary};
use crate::queue::{QueueStore, SyncQueue};
use crate::utils::pending_label;

use super::SyncError;

/// Pending-changes state for the sync indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SyncStatus {
    pub pending: usize,
    pub syncing: bool,
    pub online: bool,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match pending_label(self.pending, self.syncing, self.online) {
            Some(label) => f.write_str(&label),
            None => f.write_str("All changes synced"),
        }
    }
}

/// What happened to a submitted operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Online and confirmed by the backend
    Applied,
    /// Offline; persisted for replay
    Queued(QueuedOperation),
    /// Online but refused; the optimistic change was undone
    RolledBack { message: String },
}

/// Clears the in-flight flag however the replay ends.
struct ReplayGuard<'a>(&'a AtomicBool);

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncCoordinator<S: QueueStore, B: BackendActions> {
    library: Mutex<Library>,
    queue: SyncQueue<S, B>,
    connectivity: Arc<ConnectivityObserver>,
    replaying: AtomicBool,
    status: watch::Sender<SyncStatus>,
}

impl<S: QueueStore, B: BackendActions> SyncCoordinator<S, B> {
    pub fn new(queue: SyncQueue<S, B>, connectivity: Arc<ConnectivityObserver>) -> Self {
        let (status, _) = watch::channel(SyncStatus {
            pending: 0,
            syncing: false,
            online: connectivity.is_online(),
        });
        Self {
            library: Mutex::new(Library::default()),
            queue,
            connectivity,
            replaying: AtomicBool::new(false),
            status,
        }
    }

    pub fn with_library(self, library: Library) -> Self {
        if let Ok(mut current) = self.library.lock() {
            *current = library;
        }
        self
    }

    pub fn queue(&self) -> &SyncQueue<S, B> {
        &self.queue
    }

    /// Current local library, including optimistic changes.
    pub fn library(&self) -> Result<Library, SyncError> {
        Ok(self.lock_library()?.clone())
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    fn lock_library(&self) -> Result<MutexGuard<'_, Library>, SyncError> {
        self.library.lock().map_err(|_| SyncError::LockPoisoned)
    }

    fn restore(&self, snapshot: Library) -> Result<(), SyncError> {
        *self.lock_library()? = snapshot;
        Ok(())
    }

    fn publish(&self, update: impl FnOnce(&mut SyncStatus)) {
        self.status.send_if_modified(|status| {
            let before = *status;
            update(status);
            *status != before
        });
    }

    /// Apply `operation` locally, then run it now or queue it.
    ///
    /// Online failures roll the local change back and come back as
    /// `Submission::RolledBack`. A queue storage failure also rolls back
    /// and is returned as an error.
    pub async fn submit(&self, operation: Operation) -> Result<Submission, SyncError> {
        let snapshot = {
            let mut library = self.lock_library()?;
            let snapshot = library.clone();
            library.apply(&operation);
            snapshot
        };

        if self.connectivity.is_online() {
            return match dispatch(self.queue.backend().as_ref(), &operation).await {
                Ok(()) => {
                    debug!(op_type = %operation.op_type(), "Applied");
                    if creates_entity(&operation) {
                        // Swap the provisional entity for the stored one
                        if let Err(e) = self.refresh_library().await {
                            warn!(error = %e, "Library refresh failed");
                        }
                    }
                    Ok(Submission::Applied)
                }
                Err(e) => {
                    warn!(op_type = %operation.op_type(), error = %e, "Operation failed, rolling back");
                    self.restore(snapshot)?;
                    Ok(Submission::RolledBack {
                        message: failure_message(operation.op_type()).to_string(),
                    })
                }
            };
        }

        match self.queue.enqueue(&operation) {
            Ok(queued) => {
                self.refresh_pending()?;
                Ok(Submission::Queued(queued))
            }
            Err(e) => {
                error!(op_type = %operation.op_type(), error = %e, "Failed to queue operation");
                self.restore(snapshot)?;
                Err(e.into())
            }
        }
    }

    /// Replay the queue if online, something is pending, and no replay is
    /// already running. Returns `None` when nothing was attempted.
    pub async fn on_reconnect(&self) -> Result<Option<ReplaySummary>, SyncError> {
        if !self.connectivity.is_online() {
            return Ok(None);
        }
        if self.refresh_pending()? == 0 {
            return Ok(None);
        }
        if self
            .replaying
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Replay already in flight");
            return Ok(None);
        }

        let summary = {
            let _guard = ReplayGuard(&self.replaying);
            self.publish(|s| s.syncing = true);
            let result = self.queue.replay_all().await;
            self.publish(|s| s.syncing = false);
            result?
        };

        info!(
            processed = summary.processed,
            failed = summary.failed,
            remaining = summary.remaining,
            "Sync complete"
        );

        if summary.processed > 0 {
            if let Err(e) = self.refresh_library().await {
                warn!(error = %e, "Library refresh after sync failed");
            }
        }
        self.refresh_pending()?;

        Ok(Some(summary))
    }

    /// Follow connectivity and try a replay whenever it reports online.
    /// Anything already pending while online is replayed first.
    pub async fn run(&self, mut online: watch::Receiver<bool>) {
        let is_online = *online.borrow_and_update();
        self.publish(|s| s.online = is_online);
        if is_online {
            self.reconnect_logged().await;
        }

        while online.changed().await.is_ok() {
            let now_online = *online.borrow_and_update();
            self.publish(|s| s.online = now_online);
            // Unseen changes coalesce, so an offline spell can arrive as online only
            if now_online {
                self.reconnect_logged().await;
            }
        }
        debug!("Connectivity source closed");
    }

    async fn reconnect_logged(&self) {
        if let Err(e) = self.on_reconnect().await {
            error!(error = %e, "Sync failed");
        }
    }

    /// Re-read the queue size into the published status.
    pub fn refresh_pending(&self) -> Result<usize, SyncError> {
        let pending = self.queue.size()?;
        let online = self.connectivity.is_online();
        self.publish(|s| {
            s.pending = pending;
            s.online = online;
        });
        Ok(pending)
    }

    /// Replace the local library with the backend's.
    pub async fn refresh_library(&self) -> Result<(), SyncError> {
        let library = self.queue.backend().fetch_library().await?;
        *self.lock_library()? = library;
        Ok(())
    }
}

fn creates_entity(operation: &Operation) -> bool {
    matches!(
        operation,
        Operation::CreateBookmark { .. } | Operation::CreateGroup(_)
    )
}

/// User-facing text for a refused operation.
fn failure_message(op_type: OperationType) -> &'static str {
    match op_type {
        OperationType::CreateBookmark => "Couldn't save the bookmark",
        OperationType::UpdateBookmark => "Couldn't update the bookmark",
        OperationType::DeleteBookmark => "Couldn't delete the bookmark",
        OperationType::ToggleFavorite => "Couldn't update favorites",
        OperationType::ArchiveBookmark => "Couldn't archive the bookmark",
        OperationType::RestoreBookmark => "Couldn't restore the bookmark",
        OperationType::AddTag => "Couldn't add the tag",
        OperationType::RemoveTag => "Couldn't remove the tag",
        OperationType::CreateGroup => "Couldn't create the group",
        OperationType::UpdateGroup => "Couldn't update the group",
        OperationType::DeleteGroup => "Couldn't delete the group",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::PlatformSignal;
    use crate::models::{Bookmark, BookmarkUpdate};
    use crate::queue::{MemoryQueueStore, QueueError};
    use crate::testing::RecordingBackend;
    use std::time::Duration;

    type Coordinator = SyncCoordinator<MemoryQueueStore, RecordingBackend>;

    /// Fixed timestamps so two calls compare equal.
    fn library() -> Library {
        let mut bookmark = Bookmark::provisional("b1".into(), "https://a.test".into(), None);
        bookmark.created_at = Some("2026-01-05T09:30:00+00:00".into());
        bookmark.updated_at = bookmark.created_at.clone();
        Library {
            bookmarks: vec![bookmark],
            ..Library::default()
        }
    }

    fn setup(online: bool) -> (Coordinator, Arc<RecordingBackend>, Arc<ConnectivityObserver>) {
        let backend = Arc::new(RecordingBackend::new());
        let observer = Arc::new(ConnectivityObserver::new(online));
        let queue = SyncQueue::new(Arc::new(MemoryQueueStore::new()), backend.clone());
        let coordinator = SyncCoordinator::new(queue, observer.clone()).with_library(library());
        (coordinator, backend, observer)
    }

    fn favorite(id: &str) -> Operation {
        Operation::ToggleFavorite {
            id: id.into(),
            is_favorite: true,
        }
    }

    #[tokio::test]
    async fn test_online_submit_runs_immediately() {
        let (coordinator, backend, _) = setup(true);

        let outcome = coordinator.submit(favorite("b1")).await.unwrap();

        assert_eq!(outcome, Submission::Applied);
        assert_eq!(backend.calls(), vec![favorite("b1")]);
        assert!(coordinator.library().unwrap().bookmarks[0].is_favorite);
        assert_eq!(coordinator.status().pending, 0);
    }

    #[tokio::test]
    async fn test_online_failure_rolls_back() {
        let (coordinator, backend, _) = setup(true);
        backend.fail_on(OperationType::ToggleFavorite);

        let outcome = coordinator.submit(favorite("b1")).await.unwrap();

        assert!(matches!(outcome, Submission::RolledBack { ref message } if !message.is_empty()));
        assert_eq!(coordinator.library().unwrap(), library());
    }

    #[tokio::test]
    async fn test_online_create_refreshes_library() {
        let (coordinator, backend, _) = setup(true);
        backend.set_library(Library::default());

        coordinator
            .submit(Operation::CreateBookmark {
                url: "https://b.test".into(),
                group_id: None,
            })
            .await
            .unwrap();

        assert_eq!(backend.library_fetches(), 1);
        assert_eq!(coordinator.library().unwrap(), Library::default());
    }

    #[tokio::test]
    async fn test_offline_submit_queues_and_keeps_optimistic_state() {
        let (coordinator, backend, _) = setup(false);

        let outcome = coordinator.submit(favorite("b1")).await.unwrap();

        assert!(matches!(outcome, Submission::Queued(ref q) if q.op_type == "TOGGLE_FAVORITE"));
        assert!(backend.calls().is_empty());
        assert!(coordinator.library().unwrap().bookmarks[0].is_favorite);

        let status = coordinator.status();
        assert_eq!(status.pending, 1);
        assert!(!status.online);
        assert_eq!(status.to_string(), "1 change pending (offline)");
    }

    struct BrokenStore;

    impl QueueStore for BrokenStore {
        fn add(&self, _: &QueuedOperation) -> Result<(), QueueError> {
            Err(QueueError::LockPoisoned)
        }
        fn get_all_ordered_by_timestamp(&self) -> Result<Vec<QueuedOperation>, QueueError> {
            Ok(Vec::new())
        }
        fn remove(&self, _: &str) -> Result<(), QueueError> {
            Ok(())
        }
        fn put(&self, _: &QueuedOperation) -> Result<(), QueueError> {
            Ok(())
        }
        fn clear(&self) -> Result<(), QueueError> {
            Ok(())
        }
        fn size(&self) -> Result<usize, QueueError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_storage_failure_rolls_back_and_errors() {
        let backend = Arc::new(RecordingBackend::new());
        let queue = SyncQueue::new(Arc::new(BrokenStore), backend);
        let coordinator = SyncCoordinator::new(queue, Arc::new(ConnectivityObserver::new(false)))
            .with_library(library());

        let result = coordinator.submit(favorite("b1")).await;

        assert!(matches!(result, Err(SyncError::Queue(QueueError::LockPoisoned))));
        assert_eq!(coordinator.library().unwrap(), library());
    }

    #[tokio::test]
    async fn test_reconnect_replays_and_refreshes() {
        let (coordinator, backend, observer) = setup(false);
        coordinator.submit(favorite("b1")).await.unwrap();
        coordinator
            .submit(Operation::UpdateBookmark {
                id: "b1".into(),
                data: BookmarkUpdate {
                    title: Some("Renamed".into()),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        // Still offline: nothing happens
        assert_eq!(coordinator.on_reconnect().await.unwrap(), None);

        observer.apply(PlatformSignal::Online);
        let summary = coordinator.on_reconnect().await.unwrap().unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(backend.calls().len(), 2);
        assert_eq!(backend.library_fetches(), 1);
        assert_eq!(coordinator.status(), SyncStatus { pending: 0, syncing: false, online: true });
    }

    #[tokio::test]
    async fn test_reconnect_without_progress_skips_refresh() {
        let (coordinator, backend, observer) = setup(false);
        coordinator.submit(favorite("b1")).await.unwrap();
        backend.fail_on_all();

        observer.apply(PlatformSignal::Online);
        let summary = coordinator.on_reconnect().await.unwrap().unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.remaining, 1);
        assert_eq!(backend.library_fetches(), 0);
        assert_eq!(coordinator.status().pending, 1);
    }

    #[tokio::test]
    async fn test_reconnect_with_empty_queue_is_noop() {
        let (coordinator, backend, _) = setup(true);
        assert_eq!(coordinator.on_reconnect().await.unwrap(), None);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_replays_on_transition() {
        let (coordinator, backend, observer) = setup(false);
        coordinator.submit(favorite("b1")).await.unwrap();

        let coordinator = Arc::new(coordinator);
        let runner = {
            let coordinator = coordinator.clone();
            let online = observer.watch();
            tokio::spawn(async move { coordinator.run(online).await })
        };

        let mut status = coordinator.status_watch();
        observer.apply(PlatformSignal::Online);

        tokio::time::timeout(Duration::from_secs(5), async {
            while status.borrow_and_update().pending > 0 {
                status.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert_eq!(backend.calls(), vec![favorite("b1")]);
        runner.abort();
    }

    #[tokio::test]
    async fn test_run_replays_after_unobserved_offline_spell() {
        let (coordinator, backend, observer) = setup(true);
        let coordinator = Arc::new(coordinator);
        let runner = {
            let coordinator = coordinator.clone();
            let online = observer.watch();
            tokio::spawn(async move { coordinator.run(online).await })
        };
        // Let the runner settle on the online state
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        observer.apply(PlatformSignal::Offline);
        let outcome = coordinator
            .submit(Operation::DeleteBookmark { id: "b1".into() })
            .await
            .unwrap();
        assert!(matches!(outcome, Submission::Queued(_)));
        observer.apply(PlatformSignal::Online);

        let mut status = coordinator.status_watch();
        tokio::time::timeout(Duration::from_secs(5), async {
            while status.borrow_and_update().pending > 0 {
                status.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert_eq!(
            backend.calls(),
            vec![Operation::DeleteBookmark { id: "b1".into() }]
        );
        runner.abort();
    }

    #[tokio::test]
    async fn test_concurrent_reconnect_replays_once() {
        let (coordinator, backend, observer) = setup(false);
        coordinator.submit(favorite("b1")).await.unwrap();
        let release = backend.hold_calls();
        observer.apply(PlatformSignal::Online);

        let first = coordinator.on_reconnect();
        let second = async {
            // `first` is polled first and is parked inside the backend by now
            assert!(coordinator.status().syncing);
            let result = coordinator.on_reconnect().await;
            release.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(second.unwrap(), None);
        assert_eq!(first.unwrap().unwrap().processed, 1);
        assert_eq!(backend.calls(), vec![favorite("b1")]);
        assert!(!coordinator.status().syncing);
    }

    #[test]
    fn test_status_display() {
        let status = SyncStatus {
            pending: 2,
            syncing: true,
            online: true,
        };
        assert_eq!(status.to_string(), "Syncing 2 changes...");
        assert_eq!(SyncStatus::default().to_string(), "All changes synced");
    }
}
