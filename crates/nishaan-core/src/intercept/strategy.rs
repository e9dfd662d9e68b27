//! Fetch strategies.
//!
//! All strategies read from the worker's current generations (static,
//! then dynamic) and write only to the dynamic generation. Only 2xx
//! responses are written. A cache read or write failure is logged and
//! treated as a miss; it never fails the fetch.

use std::sync::Arc;
use std::time::Duration;

use futures::future::Either;
use tracing::{debug, warn};

use crate::utils::{detached, first_to_settle};

use super::cache::{CacheStorage, CachedResponse};
use super::fetch::{FetchError, Fetcher};
use super::request::{Request, Response};

#[derive(Clone)]
pub struct Strategies {
    cache: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    static_cache: String,
    dynamic_cache: String,
    network_timeout: Duration,
    /// Cache key of the pre-cached offline page
    offline_key: String,
}

impl Strategies {
    pub fn new(
        cache: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        static_cache: String,
        dynamic_cache: String,
        network_timeout: Duration,
        offline_key: String,
    ) -> Self {
        Self {
            cache,
            fetcher,
            static_cache,
            dynamic_cache,
            network_timeout,
            offline_key,
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStorage> {
        &self.cache
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn static_cache(&self) -> &str {
        &self.static_cache
    }

    pub fn dynamic_cache(&self) -> &str {
        &self.dynamic_cache
    }

    /// Look `key` up in the current generations.
    pub fn lookup(&self, key: &str) -> Option<CachedResponse> {
        for generation in [&self.static_cache, &self.dynamic_cache] {
            match self.cache.get(generation, key) {
                Ok(Some(hit)) => return Some(hit),
                Ok(None) => {}
                Err(e) => warn!(cache = %generation, key, error = %e, "Cache read failed"),
            }
        }
        None
    }

    /// Write a 2xx response to the dynamic generation.
    fn store(&self, key: &str, response: &Response) {
        if !response.is_ok() {
            return;
        }
        if let Err(e) = self.cache.put(&self.dynamic_cache, key, response) {
            warn!(cache = %self.dynamic_cache, key, error = %e, "Cache write failed");
        }
    }

    pub async fn network_only(&self, request: &Request) -> Result<Response, FetchError> {
        self.fetcher.fetch(request).await
    }

    /// Serve from cache, filling it from the network on a miss.
    pub async fn cache_first(&self, request: &Request) -> Result<Response, FetchError> {
        let key = request.cache_key();

        if let Some(hit) = self.lookup(&key) {
            debug!(strategy = "cache-first", key = %key, age = %hit.age_display(), "Cache hit");
            return Ok(hit.response);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(&key, &response);
                Ok(response)
            }
            Err(e) => {
                warn!(strategy = "cache-first", key = %key, error = %e, "Fetch failed");
                // A concurrent fetch may have filled the cache meanwhile
                self.lookup(&key).map(|hit| hit.response).ok_or(e)
            }
        }
    }

    /// Race the network against the timeout; fall back to the cache, then
    /// to a synthesized 503.
    ///
    /// The network leg runs detached, so a response arriving after the
    /// timeout still lands in the cache.
    pub async fn network_first_with_timeout(&self, request: &Request) -> Response {
        let key = request.cache_key();

        let leg = {
            let this = self.clone();
            let request = request.clone();
            let key = key.clone();
            detached(async move {
                let response = this.fetcher.fetch(&request).await?;
                this.store(&key, &response);
                Ok::<_, FetchError>(response)
            })
        };

        let outcome = match first_to_settle(leg, tokio::time::sleep(self.network_timeout)).await {
            Either::Left(Ok(result)) => result,
            Either::Left(Err(join_error)) => Err(FetchError::Aborted(join_error.to_string())),
            Either::Right(()) => Err(FetchError::Timeout(self.network_timeout)),
        };

        match outcome {
            Ok(response) => response,
            Err(e) => {
                debug!(strategy = "network-first-timeout", key = %key, error = %e, "Network failed, trying cache");
                match self.lookup(&key) {
                    Some(hit) => hit.response,
                    None => Response::offline_json(),
                }
            }
        }
    }

    /// Network, then cache, then the offline page, then an inline 503.
    pub async fn network_first_for_pages(&self, request: &Request) -> Response {
        let key = request.cache_key();

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(&key, &response);
                response
            }
            Err(e) => {
                debug!(strategy = "network-first-pages", key = %key, error = %e, "Page load failed");
                self.lookup(&key)
                    .or_else(|| self.lookup(&self.offline_key))
                    .map(|hit| hit.response)
                    .unwrap_or_else(Response::offline_html)
            }
        }
    }
}
