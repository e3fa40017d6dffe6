//! Error types for state registry, locking and persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by the state store.
///
/// Every variant is raised synchronously at the point of violation. The only
/// operation that tolerates disagreement between the index and the backend is
/// `sync`, which corrects it instead of failing.
#[derive(Debug, Error)]
pub enum StateError {
    /// A state or alias name is already registered
    #[error("State already exists: {0}")]
    StateExists(String),

    /// A state name or flag combination is unknown, or the transition is not permitted
    #[error("Invalid state: {0}")]
    StateInvalid(String),

    /// The key is already tracked in some state
    #[error("Item already exists: {0}")]
    ItemExists(String),

    /// The key carries a lock marker
    #[error("Item is locked: {0}")]
    LockedKey(String),

    /// The key is not tracked in any state
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Alias references unknown states, or does not combine several states
    #[error("Invalid alias '{name}': {reason}")]
    InvalidAlias { name: String, reason: String },

    /// Transition rejected by the current-state assertion or the verifier
    #[error("Transition rejected for '{key}': {reason}")]
    TransitionInvalid { key: String, reason: String },

    /// State names may contain only ASCII letters, '_' and '.'
    #[error("Invalid state name '{0}': only letters, '_' and '.' are allowed")]
    InvalidName(String),

    /// Keys must be usable as a single path component
    #[error("Invalid item key '{0}'")]
    InvalidKey(String),

    /// No flag bits left for another declared state
    #[error("State capacity exceeded: at most {max} states can be declared")]
    CapacityExceeded { max: u32 },

    /// The reverse index and the partitions disagree in a way sync cannot explain
    #[error("State corruption detected: {0}")]
    Corruption(String),

    /// Underlying storage failure
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StateError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Storage {
            path: path.into(),
            source,
        }
    }

    /// True when the error means the key is not tracked.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound(_))
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Config(err.to_string())
    }
}
