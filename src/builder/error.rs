//! Build errors for the store builder.

use crate::core::StateError;
use thiserror::Error;

/// Errors that can occur when assembling a [`PersistedState`](crate::persist::PersistedState).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("State set not specified. Call .states(set) before .build()")]
    MissingStates,

    #[error("Backend not specified. Call .backend(backend) or .root(path)")]
    MissingBackend,

    #[error("Lock mode {0:?} requires a lock directory. Call .locks(dir, mode)")]
    MissingLockDir(crate::lock::LockMode),

    #[error("Initial sync failed: {0}")]
    Sync(#[from] StateError),
}
