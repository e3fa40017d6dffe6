//! Builder for constructing stores.

use crate::backend::{Backend, FsBackend};
use crate::builder::error::BuildError;
use crate::core::{Observer, StateEvent, StateSet, Verifier};
use crate::lock::{LockDir, LockMode};
use crate::persist::PersistedState;
use std::path::PathBuf;
use tracing::debug;

/// Builder for [`PersistedState`] with a fluent API.
pub struct PersistedStateBuilder<B: Backend> {
    states: Option<StateSet>,
    backend: Option<B>,
    locks: Option<LockDir>,
    lock_mode: LockMode,
    verifier: Option<Verifier>,
    observer: Option<Observer>,
    sync: bool,
}

impl<B: Backend> PersistedStateBuilder<B> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            states: None,
            backend: None,
            locks: None,
            lock_mode: LockMode::Advisory,
            verifier: None,
            observer: None,
            sync: false,
        }
    }

    /// Set the state vocabulary (required).
    pub fn states(mut self, states: StateSet) -> Self {
        self.states = Some(states);
        self
    }

    /// Set the backend (required).
    pub fn backend(mut self, backend: B) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Honour lock markers in `locks`.
    pub fn locks(mut self, locks: LockDir, mode: LockMode) -> Self {
        self.locks = Some(locks);
        self.lock_mode = mode;
        self
    }

    /// Change the lock mode, keeping the directory.
    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    /// Ignore lock markers altogether.
    pub fn without_locks(mut self) -> Self {
        self.locks = None;
        self
    }

    pub fn verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&StateEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Adopt existing backend records when building.
    pub fn sync_on_build(mut self, enabled: bool) -> Self {
        self.sync = enabled;
        self
    }

    /// Build the store.
    /// Returns an error if required fields are missing or the initial sync fails.
    pub fn build(self) -> Result<PersistedState<B>, BuildError> {
        let states = self.states.ok_or(BuildError::MissingStates)?;
        let backend = self.backend.ok_or(BuildError::MissingBackend)?;
        if self.lock_mode == LockMode::Hold && self.locks.is_none() {
            return Err(BuildError::MissingLockDir(self.lock_mode));
        }

        let mut store = PersistedState::new(states, backend);
        if let Some(locks) = self.locks {
            store = store.with_locks(locks, self.lock_mode);
        }
        if let Some(verifier) = self.verifier {
            store = store.with_verifier(verifier);
        }
        if let Some(observer) = self.observer {
            store = store.with_observer(observer);
        }
        if self.sync {
            let report = store.sync(None)?;
            debug!(adopted = report.added.len(), "initial sync");
        }
        Ok(store)
    }
}

impl PersistedStateBuilder<FsBackend> {
    /// Use a directory backend rooted at `root`, locking through its
    /// default lock directory unless one was already given.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        let backend = FsBackend::new(root);
        if self.locks.is_none() {
            self.locks = Some(backend.lock_dir());
        }
        self.backend = Some(backend);
        self
    }
}

impl<B: Backend> Default for PersistedStateBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}
