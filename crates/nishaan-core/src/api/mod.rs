//! Backend access for bookmark and group mutations.
//!
//! This module provides the `BackendActions` seam used by the sync queue
//! and the coordinator, the `dispatch` table that routes a typed
//! `Operation` to its action, and `SupabaseBackend`, the REST client used
//! in production.
//!
//! Metadata scraping sits behind `MetadataSource`; only the null
//! implementation ships here.

pub mod actions;
pub mod client;
pub mod error;

pub use actions::{dispatch, BackendActions, MetadataSource, NoMetadata};
pub use client::{SupabaseBackend, SupabaseCredentials};
pub use error::ApiError;
