//! Data models for nishaan entities.
//!
//! This module contains:
//!
//! - `Bookmark`, `Group`: library entities and their editable fields
//! - `LinkMetadata`: page metadata captured on create
//! - `Library`: the local, optimistically updated view of both
//! - `Operation`, `QueuedOperation`: mutations deferred while offline
//! - `ReplaySummary`, `QueueStatus`: queue reports for display

pub mod bookmark;
pub mod library;
pub mod operation;

pub use bookmark::{Bookmark, BookmarkSource, BookmarkUpdate, Group, GroupData, LinkMetadata};
pub use library::Library;
pub use operation::{
    Operation, OperationDecodeError, OperationType, QueueStatus, QueuedOperation, ReplaySummary,
};
