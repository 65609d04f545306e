//! Cache Error Types
//!
//! Network, storage and lifecycle failures of the offline cache manager.

/// Transport-level failure. Any HTTP status, including 5xx, is a response, not an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout
        } else if e.is_connect() {
            NetworkError::Offline(e.to_string())
        } else {
            NetworkError::Request(e.to_string())
        }
    }
}

/// Failure inside a `CacheStorage` implementation
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Unknown generation: {0}")]
    UnknownGeneration(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a lifecycle phase
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Install failed fetching {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Cannot {action} while {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: &'static str,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
