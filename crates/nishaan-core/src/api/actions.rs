//! Backend action seams.
//!
//! `BackendActions` is the narrow interface the queue and the coordinator
//! call into; `SupabaseBackend` is the production implementation. Each
//! action resolves to `Ok(())` or an `ApiError`, and both callers treat
//! any error as a failed attempt.

use async_trait::async_trait;

use crate::models::{BookmarkUpdate, GroupData, Library, LinkMetadata, Operation};

use super::ApiError;

#[async_trait]
pub trait BackendActions: Send + Sync {
    async fn create_bookmark(&self, url: &str, group_id: Option<&str>) -> Result<(), ApiError>;

    async fn update_bookmark(&self, id: &str, data: &BookmarkUpdate) -> Result<(), ApiError>;

    async fn delete_bookmark(&self, id: &str) -> Result<(), ApiError>;

    async fn toggle_favorite(&self, id: &str, is_favorite: bool) -> Result<(), ApiError>;

    async fn archive_bookmark(&self, id: &str) -> Result<(), ApiError>;

    async fn restore_bookmark(&self, id: &str) -> Result<(), ApiError>;

    async fn add_tag(&self, id: &str, tag: &str) -> Result<(), ApiError>;

    async fn remove_tag(&self, id: &str, tag: &str) -> Result<(), ApiError>;

    async fn create_group(&self, data: &GroupData) -> Result<(), ApiError>;

    async fn update_group(&self, id: &str, data: &GroupData) -> Result<(), ApiError>;

    async fn delete_group(&self, id: &str) -> Result<(), ApiError>;

    /// Fetch the authoritative library, used to reconcile optimistic state.
    async fn fetch_library(&self) -> Result<Library, ApiError>;
}

/// Route an operation to its backend action.
pub async fn dispatch<B>(backend: &B, operation: &Operation) -> Result<(), ApiError>
where
    B: BackendActions + ?Sized,
{
    match operation {
        Operation::CreateBookmark { url, group_id } => {
            backend.create_bookmark(url, group_id.as_deref()).await
        }
        Operation::UpdateBookmark { id, data } => backend.update_bookmark(id, data).await,
        Operation::DeleteBookmark { id } => backend.delete_bookmark(id).await,
        Operation::ToggleFavorite { id, is_favorite } => {
            backend.toggle_favorite(id, *is_favorite).await
        }
        Operation::ArchiveBookmark { id } => backend.archive_bookmark(id).await,
        Operation::RestoreBookmark { id } => backend.restore_bookmark(id).await,
        Operation::AddTag { id, tag } => backend.add_tag(id, tag).await,
        Operation::RemoveTag { id, tag } => backend.remove_tag(id, tag).await,
        Operation::CreateGroup(data) => backend.create_group(data).await,
        Operation::UpdateGroup { id, data } => backend.update_group(id, data).await,
        Operation::DeleteGroup { id } => backend.delete_group(id).await,
    }
}

/// Source of page metadata for new bookmarks. Never fails: anything that
/// goes wrong degrades to empty metadata.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, url: &str) -> LinkMetadata;
}

/// Metadata source that always reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

#[async_trait]
impl MetadataSource for NoMetadata {
    async fn fetch(&self, _url: &str) -> LinkMetadata {
        LinkMetadata::default()
    }
}
