//! The offline worker: owns the lifecycle and routes every fetch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::try_join_all;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;

use crate::config::Config;

use super::cache::{CacheError, CacheStorage};
use super::fetch::{FetchError, Fetcher};
use super::lifecycle::{LifecycleError, LifecycleEvent, WorkerState};
use super::request::{Request, Response};
use super::route::{Route, Router};
use super::strategy::Strategies;

/// Messages a page can post to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate an installed worker without waiting
    SkipWaiting,
    /// Fetch these URLs into the dynamic generation, all or nothing
    CacheUrls { urls: Vec<String> },
}

pub struct OfflineWorker {
    origin: Url,
    router: Router,
    strategies: Strategies,
    static_assets: Vec<String>,
    skip_waiting_on_install: bool,
    state: Mutex<WorkerState>,
    clients_claimed: AtomicBool,
}

impl OfflineWorker {
    pub fn new(
        config: &Config,
        cache: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, LifecycleError> {
        let origin = Url::parse(&config.origin).map_err(|source| LifecycleError::InvalidUrl {
            url: config.origin.clone(),
            source,
        })?;
        let offline_key = Request::new(Method::GET, resolve(&origin, &config.offline_url)?).cache_key();

        Ok(Self {
            router: Router::new(&origin, config.api_hosts.clone()),
            strategies: Strategies::new(
                cache,
                fetcher,
                config.static_cache_name(),
                config.dynamic_cache_name(),
                config.network_timeout(),
                offline_key,
            ),
            origin,
            static_assets: config.static_assets.clone(),
            skip_waiting_on_install: config.skip_waiting_on_install,
            state: Mutex::new(WorkerState::Uninstalled),
            clients_claimed: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(WorkerState::Redundant)
    }

    /// True once activation has claimed open clients.
    pub fn controls_clients(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    fn transition(&self, event: LifecycleEvent) -> Result<WorkerState, LifecycleError> {
        let mut state = self.state.lock().map_err(|_| LifecycleError::LockPoisoned)?;
        let current = *state;
        let next = current.next(event)?;
        debug!(from = %current, to = %next, "Worker state change");
        *state = next;
        Ok(next)
    }

    // ===== Lifecycle =====

    /// Pick up an install left behind by an earlier process. If the
    /// current static generation exists the worker comes back installed
    /// and waiting to activate.
    pub fn resume(&self) -> Result<WorkerState, LifecycleError> {
        if self.state() != WorkerState::Uninstalled {
            return Ok(self.state());
        }

        let static_cache = self.strategies.static_cache();
        let installed = self
            .strategies
            .cache()
            .generations()?
            .iter()
            .any(|name| name == static_cache);

        if installed {
            self.transition(LifecycleEvent::InstallStarted)?;
            self.transition(LifecycleEvent::InstallSucceeded)?;
            debug!(cache = static_cache, "Resumed earlier install");
        }
        Ok(self.state())
    }

    /// Pre-cache the static manifest. Nothing is stored unless every
    /// asset fetches with a 2xx status.
    pub async fn install(&self) -> Result<(), LifecycleError> {
        self.transition(LifecycleEvent::InstallStarted)?;
        info!(assets = self.static_assets.len(), "Installing offline worker");

        let stored = match self.fetch_all(&self.static_assets).await {
            Ok(entries) => self
                .strategies
                .cache()
                .put_all(self.strategies.static_cache(), &entries)
                .map_err(LifecycleError::from),
            Err(e) => Err(e),
        };

        if let Err(e) = stored {
            error!(error = %e, "Install failed");
            self.transition(LifecycleEvent::Failed)?;
            return Err(e);
        }

        self.transition(LifecycleEvent::InstallSucceeded)?;
        info!(cache = self.strategies.static_cache(), "Static assets cached");

        if self.skip_waiting_on_install {
            self.activate()?;
        }
        Ok(())
    }

    /// Delete stale generations and take control of clients. Returns the
    /// names of the generations deleted.
    pub fn activate(&self) -> Result<Vec<String>, LifecycleError> {
        self.transition(LifecycleEvent::ActivateStarted)?;
        info!("Activating offline worker");

        match self.remove_stale_generations() {
            Ok(deleted) => {
                self.transition(LifecycleEvent::Activated)?;
                self.clients_claimed.store(true, Ordering::SeqCst);
                info!(deleted = deleted.len(), "Offline worker active");
                Ok(deleted)
            }
            Err(e) => {
                error!(error = %e, "Activation failed");
                self.transition(LifecycleEvent::Failed)?;
                Err(e.into())
            }
        }
    }

    /// Delete every generation other than the current static and dynamic
    /// ones. Running it twice deletes nothing the second time.
    pub fn remove_stale_generations(&self) -> Result<Vec<String>, CacheError> {
        let cache = self.strategies.cache();
        let current = [self.strategies.static_cache(), self.strategies.dynamic_cache()];

        let mut deleted = Vec::new();
        for name in cache.generations()? {
            if current.contains(&name.as_str()) {
                continue;
            }
            if cache.delete_generation(&name)? {
                info!(cache = %name, "Deleted stale cache");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    pub async fn handle_message(&self, message: WorkerMessage) -> Result<(), LifecycleError> {
        match message {
            WorkerMessage::SkipWaiting => {
                if self.state() == WorkerState::Active {
                    debug!("Already active");
                    return Ok(());
                }
                self.activate().map(|_| ())
            }
            WorkerMessage::CacheUrls { urls } => {
                let entries = self.fetch_all(&urls).await?;
                self.strategies
                    .cache()
                    .put_all(self.strategies.dynamic_cache(), &entries)?;
                info!(count = entries.len(), "Cached requested URLs");
                Ok(())
            }
        }
    }

    /// Fetch every URL, failing on the first error or non-2xx status.
    async fn fetch_all(&self, urls: &[String]) -> Result<Vec<(String, Response)>, LifecycleError> {
        let requests = urls
            .iter()
            .map(|url| resolve(&self.origin, url).map(|url| Request::new(Method::GET, url)))
            .collect::<Result<Vec<_>, _>>()?;

        let fetcher = self.strategies.fetcher();
        try_join_all(requests.into_iter().map(|request| async move {
            let url = request.url.to_string();
            let response = fetcher
                .fetch(&request)
                .await
                .map_err(|e| LifecycleError::Precache {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            if !response.is_ok() {
                return Err(LifecycleError::Precache {
                    url,
                    reason: format!("status {}", response.status),
                });
            }
            Ok((request.cache_key(), response))
        }))
        .await
    }

    // ===== Fetch =====

    /// Route a request. Until the worker is active every request goes
    /// straight to the network.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let state = self.state();
        if !state.controls_fetches() {
            debug!(state = %state, url = %request.url, "Worker not active, using network");
            return self.strategies.network_only(request).await;
        }

        let route = self.router.classify(request);
        debug!(strategy = route.strategy_name(), url = %request.url, "Handling fetch");

        match route {
            Route::Passthrough | Route::NetworkOnly => self.strategies.network_only(request).await,
            Route::StaticAsset | Route::ExternalResource => {
                self.strategies.cache_first(request).await
            }
            Route::Api => Ok(self.strategies.network_first_with_timeout(request).await),
            Route::Page => Ok(self.strategies.network_first_for_pages(request).await),
        }
    }
}

/// Resolve `url` against the origin. Absolute URLs are returned as is.
fn resolve(origin: &Url, url: &str) -> Result<Url, LifecycleError> {
    origin.join(url).map_err(|source| LifecycleError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}
