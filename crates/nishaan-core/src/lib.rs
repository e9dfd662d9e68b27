//! nishaan core - offline resilience for the nishaan bookmark manager.
//!
//! This crate provides:
//! - `intercept`: the request-routing cache layer (cache generations,
//!   routing strategies, install/activate lifecycle)
//! - `queue`: the durable, retrying operation queue and its store
//! - `connectivity`: online/offline tracking and network quality hints
//! - `sync`: the coordinator that decides between immediate execution
//!   and queueing, and replays on reconnect
//! - `api`: backend actions and the Supabase client
//! - `models`: bookmarks, groups, and queued operations

pub mod api;
pub mod config;
pub mod connectivity;
pub mod intercept;
pub mod models;
pub mod queue;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::Config;
