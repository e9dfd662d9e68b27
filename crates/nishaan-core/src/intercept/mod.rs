//! Network interception layer.
//!
//! `OfflineWorker` sits between the app and the network. Once active it
//! classifies every request (`route`) and serves it with one of the
//! caching strategies (`strategy`) over named cache generations (`cache`).
//! Install pre-caches the static manifest; activation deletes generations
//! left behind by older versions.

pub mod cache;
pub mod fetch;
pub mod lifecycle;
pub mod request;
pub mod route;
pub mod strategy;
pub mod worker;

pub use cache::{CacheError, CacheStorage, CachedResponse, FsCacheStorage, MemoryCacheStorage};
pub use fetch::{FetchError, Fetcher, ReqwestFetcher};
pub use lifecycle::{LifecycleError, LifecycleEvent, WorkerState};
pub use request::{Request, Response};
pub use route::{Route, Router};
pub use worker::{OfflineWorker, WorkerMessage};
