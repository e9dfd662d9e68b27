//! Shared test doubles.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::{ApiError, BackendActions};
use crate::intercept::{FetchError, Fetcher, Request, Response};
use crate::models::{BookmarkUpdate, GroupData, Library, Operation, OperationType};

/// Backend that records every call and fails on request.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Operation>>,
    failing: Mutex<HashSet<OperationType>>,
    library: Mutex<Library>,
    library_fetches: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op_type: OperationType) {
        self.failing.lock().unwrap().insert(op_type);
    }

    pub fn fail_on_all(&self) {
        self.failing.lock().unwrap().extend(OperationType::ALL);
    }

    pub fn set_library(&self, library: Library) {
        *self.library.lock().unwrap() = library;
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn library_fetches(&self) -> usize {
        self.library_fetches.load(Ordering::SeqCst)
    }

    /// Park every later call after recording it, until the returned
    /// `Notify` is signalled once per call.
    pub fn hold_calls(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    async fn record(&self, operation: Operation) -> Result<(), ApiError> {
        let op_type = operation.op_type();
        self.calls.lock().unwrap().push(operation);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().unwrap().contains(&op_type) {
            return Err(ApiError::ServerError(format!("{} refused", op_type)));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendActions for RecordingBackend {
    async fn create_bookmark(&self, url: &str, group_id: Option<&str>) -> Result<(), ApiError> {
        self.record(Operation::CreateBookmark {
            url: url.to_string(),
            group_id: group_id.map(str::to_string),
        })
        .await
    }

    async fn update_bookmark(&self, id: &str, data: &BookmarkUpdate) -> Result<(), ApiError> {
        self.record(Operation::UpdateBookmark {
            id: id.to_string(),
            data: data.clone(),
        })
        .await
    }

    async fn delete_bookmark(&self, id: &str) -> Result<(), ApiError> {
        self.record(Operation::DeleteBookmark { id: id.to_string() }).await
    }

    async fn toggle_favorite(&self, id: &str, is_favorite: bool) -> Result<(), ApiError> {
        self.record(Operation::ToggleFavorite {
            id: id.to_string(),
            is_favorite,
        })
        .await
    }

    async fn archive_bookmark(&self, id: &str) -> Result<(), ApiError> {
        self.record(Operation::ArchiveBookmark { id: id.to_string() }).await
    }

    async fn restore_bookmark(&self, id: &str) -> Result<(), ApiError> {
        self.record(Operation::RestoreBookmark { id: id.to_string() }).await
    }

    async fn add_tag(&self, id: &str, tag: &str) -> Result<(), ApiError> {
        self.record(Operation::AddTag {
            id: id.to_string(),
            tag: tag.to_string(),
        })
        .await
    }

    async fn remove_tag(&self, id: &str, tag: &str) -> Result<(), ApiError> {
        self.record(Operation::RemoveTag {
            id: id.to_string(),
            tag: tag.to_string(),
        })
        .await
    }

    async fn create_group(&self, data: &GroupData) -> Result<(), ApiError> {
        self.record(Operation::CreateGroup(data.clone())).await
    }

    async fn update_group(&self, id: &str, data: &GroupData) -> Result<(), ApiError> {
        self.record(Operation::UpdateGroup {
            id: id.to_string(),
            data: data.clone(),
        })
        .await
    }

    async fn delete_group(&self, id: &str) -> Result<(), ApiError> {
        self.record(Operation::DeleteGroup { id: id.to_string() }).await
    }

    async fn fetch_library(&self) -> Result<Library, ApiError> {
        self.library_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.library.lock().unwrap().clone())
    }
}

#[derive(Clone)]
enum StubReply {
    Respond(Response),
    RespondAfter(Duration, Response),
}

/// Fetcher serving canned responses by URL. Unknown URLs are unreachable.
#[derive(Default)]
pub struct StubFetcher {
    replies: Mutex<HashMap<String, StubReply>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), StubReply::Respond(response));
    }

    pub fn respond_after(&self, url: &str, delay: Duration, response: Response) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), StubReply::RespondAfter(delay, response));
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(url));
        }

        let reply = self.replies.lock().unwrap().get(&url).cloned();
        match reply {
            Some(StubReply::Respond(response)) => Ok(response),
            Some(StubReply::RespondAfter(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Err(FetchError::Unreachable(url)),
        }
    }
}
