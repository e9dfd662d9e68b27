//! Connectivity tracking.
//!
//! `ConnectivityObserver` holds the process-wide online flag. Platform
//! signals are fed in through `apply`; only a real change of state is a
//! transition, and each transition notifies every current subscriber
//! exactly once. Async consumers can follow the flag through `watch()`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::intercept::{Fetcher, Request};

/// How long a reachability probe may take before the network counts as down.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const OFFLINE_MESSAGE: &str = "You're offline. Changes will sync when you reconnect.";
const SLOW_MESSAGE: &str = "Slow connection detected. Some features may be delayed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSignal {
    Online,
    Offline,
}

/// Advisory connection quality, from the platform's effective connection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Slow,
    Medium,
    Fast,
    Unknown,
}

impl NetworkQuality {
    pub fn from_effective_type(effective_type: &str) -> Self {
        match effective_type {
            "slow-2g" | "2g" => NetworkQuality::Slow,
            "3g" => NetworkQuality::Medium,
            "4g" => NetworkQuality::Fast,
            _ => NetworkQuality::Unknown,
        }
    }
}

type Callback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: Vec<(u64, Callback)>,
}

/// Callbacks run outside the lock, so a poisoned list is still consistent.
fn lock_subscribers(subscribers: &Mutex<Subscribers>) -> MutexGuard<'_, Subscribers> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a callback registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            lock_subscribers(&subscribers)
                .callbacks
                .retain(|(id, _)| *id != self.id);
        }
    }
}

pub struct ConnectivityObserver {
    online: watch::Sender<bool>,
    subscribers: Arc<Mutex<Subscribers>>,
    effective_type: Mutex<Option<String>>,
}

impl ConnectivityObserver {
    /// `initial` is what the platform reports at startup.
    pub fn new(initial: bool) -> Self {
        let (online, _) = watch::channel(initial);
        Self {
            online,
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
            effective_type: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut subscribers = lock_subscribers(&self.subscribers);
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.callbacks.push((id, Arc::new(callback)));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock_subscribers(&self.subscribers).callbacks.len()
    }

    /// Apply a platform signal. Returns true if it changed the state.
    pub fn apply(&self, signal: PlatformSignal) -> bool {
        let online = signal == PlatformSignal::Online;
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });

        if !changed {
            debug!(online, "Connectivity signal without change");
            return false;
        }

        if online {
            info!("Connection restored");
        } else {
            info!("Connection lost");
        }

        // Snapshot first so callbacks may subscribe or unsubscribe
        let callbacks: Vec<Callback> = lock_subscribers(&self.subscribers)
            .callbacks
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(online);
        }
        true
    }

    /// Record the platform's effective connection type, if it reports one.
    pub fn set_connection_info(&self, effective_type: Option<&str>) {
        *self
            .effective_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = effective_type.map(str::to_string);
    }

    pub fn network_quality(&self) -> NetworkQuality {
        self.effective_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .map_or(NetworkQuality::Unknown, NetworkQuality::from_effective_type)
    }

    /// Banner text for the current state, if any.
    pub fn status_message(&self) -> Option<&'static str> {
        if !self.is_online() {
            Some(OFFLINE_MESSAGE)
        } else if self.network_quality() == NetworkQuality::Slow {
            Some(SLOW_MESSAGE)
        } else {
            None
        }
    }

    /// Best-effort reachability check against `url`. Any response counts as
    /// reachable. The result is applied as a signal and returned.
    pub async fn probe(&self, fetcher: &dyn Fetcher, url: &str) -> bool {
        let reachable = match Request::get(url) {
            Ok(request) => {
                match tokio::time::timeout(PROBE_TIMEOUT, fetcher.fetch(&request)).await {
                    Ok(Ok(_)) => true,
                    Ok(Err(e)) => {
                        debug!(url, error = %e, "Probe failed");
                        false
                    }
                    Err(_) => {
                        debug!(url, "Probe timed out");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(url, error = %e, "Invalid probe URL");
                return self.is_online();
            }
        };

        self.apply(if reachable {
            PlatformSignal::Online
        } else {
            PlatformSignal::Offline
        });
        reachable
    }
}
