//! Builder API for assembling stores.
//!
//! This module provides a fluent builder for [`PersistedState`] and the
//! [`state_set!`](crate::state_set) macro for declaring a state vocabulary
//! with little boilerplate.

pub mod error;
pub mod macros;
pub mod store;

pub use error::BuildError;
pub use store::PersistedStateBuilder;

use crate::backend::FsBackend;
use crate::core::{StateResult, StateSet};
use crate::lock::LockMode;
use crate::persist::PersistedState;
use std::path::PathBuf;

/// Open a directory-backed store with advisory locking and adopt whatever
/// records already live under `root`.
///
/// # Example
///
/// ```
/// use stateshelf::builder::open_dir;
/// use stateshelf::state_set;
///
/// let dir = tempfile::tempdir().unwrap();
/// let states = state_set!(states: [queued, done];).unwrap();
/// let mut store = open_dir(dir.path(), states).unwrap();
///
/// let done = store.states().from_name("done").unwrap();
/// store.put("job1", Some(done), b"ok").unwrap();
/// assert!(dir.path().join("DONE").join("job1").is_file());
/// ```
pub fn open_dir(root: impl Into<PathBuf>, states: StateSet) -> StateResult<PersistedState<FsBackend>> {
    let backend = FsBackend::open(root)?;
    let locks = backend.lock_dir();
    let mut store = PersistedState::new(states, backend).with_locks(locks, LockMode::Advisory);
    store.sync(None)?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StateError;

    #[test]
    fn open_dir_adopts_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("DONE")).unwrap();
        std::fs::write(dir.path().join("DONE").join("job1"), b"ok").unwrap();

        let states = crate::state_set!(states: [queued, done];).unwrap();
        let store = open_dir(dir.path(), states).unwrap();

        assert_eq!(store.state_name("job1").unwrap(), "DONE");
        assert!(store.locks().is_some());
    }

    #[test]
    fn open_dir_honours_lock_markers() {
        let dir = tempfile::tempdir().unwrap();
        let states = crate::state_set!(states: [queued];).unwrap();
        let mut store = open_dir(dir.path(), states).unwrap();

        std::fs::create_dir_all(dir.path().join(".lock")).unwrap();
        std::fs::write(dir.path().join(".lock").join("xxxx"), b"").unwrap();

        assert!(matches!(
            store.put("xxxx", None, b""),
            Err(StateError::LockedKey(_))
        ));
    }
}
