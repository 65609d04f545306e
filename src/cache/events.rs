//! Lifecycle events delivered by the host, and what handling them produced

use serde::{Deserialize, Serialize};

use super::types::{CachedResponse, FetchRequest};

/// The three events the cache manager reacts to
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Install => "install",
            LifecycleEvent::Activate => "activate",
            LifecycleEvent::Fetch(_) => "fetch",
        }
    }
}

/// Completion value of a handled event.
///
/// The host awaits this before treating the phase as done.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// Seed Set stored in the current generation
    Installed { entries: usize },
    /// Superseded generations removed
    Activated { deleted: Vec<String> },
    /// What to hand back to the client; `None` is a failed load
    Response(Option<CachedResponse>),
}

/// Manager lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; a retry may reinstall
    Redundant,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Parsed => "parsed",
            Phase::Installing => "installing",
            Phase::Installed => "installed",
            Phase::Activating => "activating",
            Phase::Activated => "activated",
            Phase::Redundant => "redundant",
        }
    }
}
