//! Worker lifecycle state machine.
//!
//! ```text
//! Uninstalled -> Installing -> Installed -> Activating -> Active
//!                     |                         |
//!                     +-------> Redundant <-----+
//! ```
//!
//! A redundant worker may be installed again.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cache::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Uninstalled,
    Installing,
    /// Installed and waiting to activate
    Installed,
    Activating,
    Active,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Uninstalled => "uninstalled",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    InstallStarted,
    InstallSucceeded,
    ActivateStarted,
    Activated,
    /// Install or activation failed
    Failed,
}

impl WorkerState {
    pub fn next(self, event: LifecycleEvent) -> Result<WorkerState, LifecycleError> {
        use LifecycleEvent::*;
        use WorkerState::*;

        match (self, event) {
            (Uninstalled | Redundant, InstallStarted) => Ok(Installing),
            (Installing, InstallSucceeded) => Ok(Installed),
            (Installed, ActivateStarted) => Ok(Activating),
            (Activating, Activated) => Ok(Active),
            (Installing | Activating, Failed) => Ok(Redundant),
            (from, event) => Err(LifecycleError::IllegalTransition { from, event }),
        }
    }

    /// Only an active worker controls fetches.
    pub fn controls_fetches(&self) -> bool {
        *self == WorkerState::Active
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Illegal lifecycle transition: {event:?} while {from}")]
    IllegalTransition {
        from: WorkerState,
        event: LifecycleEvent,
    },

    #[error("Failed to cache {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Worker state lock poisoned")]
    LockPoisoned,
}
