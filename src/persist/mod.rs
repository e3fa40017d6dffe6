//! The persisted state store.
//!
//! [`PersistedState`] combines a [`StateSet`] with a [`Backend`] and keeps a
//! reverse index from item key to current state. Every item is in exactly
//! one state; every mutation goes through here, is checked against the
//! state set and the lock directory, and is then written to the backend
//! before the index changes.

mod sync;

pub use sync::SyncReport;

use crate::backend::{validate_key, Backend};
use crate::core::{
    Flags, Observer, StateError, StateEvent, StateRef, StateResult, StateSet, TransitionRequest,
    Verifier,
};
use crate::lock::{LockDir, LockGuard, LockMode};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::debug;

/// Item store keyed by identifier, one state per item, persisted through a
/// backend.
///
/// # Example
///
/// ```rust
/// use stateshelf::backend::MemoryBackend;
/// use stateshelf::core::StateSet;
/// use stateshelf::persist::PersistedState;
///
/// let mut states = StateSet::new();
/// let foo = states.add("foo").unwrap();
/// let bar = states.add("bar").unwrap();
/// let xyzzy = states.alias("xyzzy", ["foo", "bar"]).unwrap();
///
/// let mut store = PersistedState::new(states, MemoryBackend::new());
/// store.put("abcd", Some(foo), b"payload").unwrap();
///
/// store.set("abcd", bar).unwrap();
/// assert_eq!(store.state("abcd").unwrap(), xyzzy);
/// assert!(store.list(xyzzy).contains("abcd"));
///
/// store.unset("abcd", foo, false).unwrap();
/// assert_eq!(store.state("abcd").unwrap(), bar);
/// assert!(!store.list(xyzzy).contains("abcd"));
/// assert_eq!(store.get("abcd").unwrap(), b"payload");
/// ```
pub struct PersistedState<B: Backend> {
    states: StateSet,
    backend: B,
    index: BTreeMap<String, Flags>,
    members: BTreeMap<Flags, BTreeSet<String>>,
    modified: HashMap<String, DateTime<Utc>>,
    locks: Option<LockDir>,
    lock_mode: LockMode,
    verifier: Option<Verifier>,
    observer: Option<Observer>,
}

impl<B: Backend> PersistedState<B> {
    /// Store over `backend` without locking. The index starts empty; call
    /// [`PersistedState::sync`] to adopt records already in the backend.
    pub fn new(states: StateSet, backend: B) -> Self {
        Self {
            states,
            backend,
            index: BTreeMap::new(),
            members: BTreeMap::new(),
            modified: HashMap::new(),
            locks: None,
            lock_mode: LockMode::Advisory,
            verifier: None,
            observer: None,
        }
    }

    /// Honour lock markers in `locks`.
    pub fn with_locks(mut self, locks: LockDir, mode: LockMode) -> Self {
        self.locks = Some(locks);
        self.lock_mode = mode;
        self
    }

    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&StateEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn states(&self) -> &StateSet {
        &self.states
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct backend access, bypassing the index. Changes made here become
    /// visible after the next `sync`.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn locks(&self) -> Option<&LockDir> {
        self.locks.as_ref()
    }

    /// Declare another state. Meant for setup, before items use it.
    pub fn add(&mut self, name: &str) -> StateResult<Flags> {
        self.states.add(name)
    }

    /// Declare an alias. Meant for setup, before items use it.
    pub fn alias<'r, I, R>(&mut self, name: &str, refs: I) -> StateResult<Flags>
    where
        I: IntoIterator<Item = R>,
        R: Into<StateRef<'r>>,
    {
        self.states.alias(name, refs)
    }

    /// Track a new item, in the default state when `state` is `None`.
    pub fn put(&mut self, key: &str, state: Option<Flags>, contents: &[u8]) -> StateResult<Flags> {
        let _lock = self.lock(key)?;
        let state = state.unwrap_or(Flags::EMPTY);
        self.states.validate(state)?;
        if self.index.contains_key(key) {
            return Err(StateError::ItemExists(key.to_string()));
        }

        let partition = self.states.name(state)?;
        self.backend.put(&partition, key, contents)?;
        self.register(state)?;
        self.track(key, state);
        self.touch(key);
        debug!(key, state = %partition, "put");
        self.emit(key, None, partition);
        Ok(state)
    }

    /// Contents of a tracked item.
    pub fn get(&self, key: &str) -> StateResult<Vec<u8>> {
        let partition = self.current_partition(key)?;
        self.backend.get(key, Some(&partition))
    }

    /// Current state of a tracked item.
    pub fn state(&self, key: &str) -> StateResult<Flags> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }

    /// Name of the current state of a tracked item.
    pub fn state_name(&self, key: &str) -> StateResult<String> {
        self.current_partition(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Keys whose state is exactly `state`.
    pub fn list(&self, state: Flags) -> BTreeSet<String> {
        self.members.get(&state).cloned().unwrap_or_default()
    }

    /// Keys whose state includes every bit of `state`. For the default state
    /// this is the same as [`PersistedState::list`].
    pub fn list_matching(&self, state: Flags) -> BTreeSet<String> {
        if state.is_empty() {
            return self.list(state);
        }
        self.index
            .iter()
            .filter(|(_, current)| current.contains(state))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// All tracked keys with their states.
    pub fn keys(&self) -> impl Iterator<Item = (&str, Flags)> {
        self.index.iter().map(|(key, flags)| (key.as_str(), *flags))
    }

    /// Number of tracked items.
    pub fn count(&self) -> usize {
        self.index.len()
    }

    /// Move an item to `to`, whatever its current state.
    pub fn move_to(&mut self, key: &str, to: Flags) -> StateResult<Flags> {
        let _lock = self.lock(key)?;
        let current = self.state(key)?;
        self.states.validate(to)?;
        self.transition(key, current, to)
    }

    /// Move an item to `to` after asserting it is currently in `from`.
    ///
    /// When `from` combines several states, any non-empty subset of them
    /// satisfies the assertion. Moving to the current state still goes
    /// through the backend.
    pub fn change(&mut self, key: &str, from: Flags, to: Flags) -> StateResult<Flags> {
        let _lock = self.lock(key)?;
        let current = self.state(key)?;
        self.states.validate(from)?;
        self.states.validate(to)?;
        if current != from && !current.is_subset_of(from) {
            return Err(StateError::TransitionInvalid {
                key: key.to_string(),
                reason: format!(
                    "expected state {}, found {}",
                    self.states.elements_name(from),
                    self.states.elements_name(current)
                ),
            });
        }
        self.transition(key, current, to)
    }

    /// Add a single state bit to an item.
    pub fn set(&mut self, key: &str, flag: Flags) -> StateResult<Flags> {
        self.check_single(flag)?;
        let _lock = self.lock(key)?;
        let current = self.state(key)?;
        self.transition(key, current, current | flag)
    }

    /// Remove a single state bit from an item.
    ///
    /// Reaching the default state is refused unless `allow_base` is set.
    pub fn unset(&mut self, key: &str, flag: Flags, allow_base: bool) -> StateResult<Flags> {
        self.check_single(flag)?;
        let _lock = self.lock(key)?;
        let current = self.state(key)?;
        let to = current.without(flag);
        if to.is_empty() && !current.is_empty() && !allow_base {
            return Err(StateError::StateInvalid(format!(
                "{key} cannot be reverted to {}",
                self.states.default_name()
            )));
        }
        self.transition(key, current, to)
    }

    /// Set and clear several bits in one transition.
    ///
    /// The result may not be the default state, and clearing bits that are
    /// not set is an error.
    pub fn modify(&mut self, key: &str, sets: Flags, unsets: Flags) -> StateResult<Flags> {
        let _lock = self.lock(key)?;
        let current = self.state(key)?;
        let to = (current | sets).without(unsets) & self.states.declared_mask();
        if sets.is_empty() && to == current {
            return Err(StateError::StateInvalid(format!(
                "unsetting {unsets} does not change {key}"
            )));
        }
        if to.is_empty() {
            return Err(StateError::StateInvalid(format!(
                "{key} cannot be reverted to {}",
                self.states.default_name()
            )));
        }
        self.transition(key, current, to)
    }

    /// Advance an item to the next declared state.
    pub fn next(&mut self, key: &str) -> StateResult<Flags> {
        let _lock = self.lock(key)?;
        let current = self.state(key)?;
        let to = self.states.next_flag(current)?;
        self.transition(key, current, to)
    }

    /// State [`PersistedState::next`] would move to, without moving.
    pub fn peek(&self, key: &str) -> StateResult<Flags> {
        let current = self.state(key)?;
        self.states.next_flag(current)
    }

    /// Overwrite an item's contents, keeping its state.
    pub fn replace(&mut self, key: &str, contents: &[u8]) -> StateResult<()> {
        let _lock = self.lock(key)?;
        let partition = self.current_partition(key)?;
        self.backend.replace(key, contents, Some(&partition))?;
        self.touch(key);
        debug!(key, state = %partition, "replace");
        Ok(())
    }

    /// Delete an item's record and stop tracking it.
    pub fn purge(&mut self, key: &str) -> StateResult<()> {
        let _lock = self.lock(key)?;
        let partition = self.current_partition(key)?;
        self.backend.remove(key, &partition)?;
        self.untrack(key);
        self.modified.remove(key);
        debug!(key, state = %partition, "purge");
        Ok(())
    }

    /// Backend location of a state's partition, or of an item inside it.
    pub fn path(&self, state: Flags, key: Option<&str>) -> StateResult<Option<PathBuf>> {
        let partition = self.states.name(state)?;
        Ok(self.backend.path(&partition, key))
    }

    /// Partitions materialized in the backend.
    pub fn ls(&self) -> StateResult<Vec<String>> {
        self.backend.ls()
    }

    /// Last modification of an item: the store's own stamp, or the backend's
    /// record time for items adopted by `sync`.
    pub fn modified(&self, key: &str) -> StateResult<Option<DateTime<Utc>>> {
        let partition = self.current_partition(key)?;
        match self.modified.get(key) {
            Some(at) => Ok(Some(*at)),
            None => self.backend.modified(key, &partition),
        }
    }

    fn transition(&mut self, key: &str, from: Flags, to: Flags) -> StateResult<Flags> {
        let from_partition = self.states.name(from)?;
        let to_partition = self.states.name(to)?;

        if let Some(verifier) = &self.verifier {
            let request = TransitionRequest {
                key,
                from,
                to,
                states: &self.states,
            };
            verifier
                .check(&request)
                .map_err(|reason| StateError::TransitionInvalid {
                    key: key.to_string(),
                    reason,
                })?;
        }

        self.backend.relocate(key, &from_partition, &to_partition)?;
        self.register(to)?;
        self.track(key, to);
        self.touch(key);
        debug!(key, from = %from_partition, to = %to_partition, "move");
        self.emit(key, Some(from_partition), to_partition);
        Ok(to)
    }

    /// Partition name for `flags`, naming unaliased combinations when alias
    /// checking is off.
    fn partition_for(&mut self, flags: Flags) -> StateResult<String> {
        match self.states.resolve(flags) {
            Ok(name) => Ok(name.to_string()),
            Err(_) => self.states.register_auto(flags),
        }
    }

    /// Record the automatic alias for `flags` once an item actually lives there.
    fn register(&mut self, flags: Flags) -> StateResult<()> {
        if !self.states.is_known(flags) {
            self.states.register_auto(flags)?;
        }
        Ok(())
    }

    fn current_partition(&self, key: &str) -> StateResult<String> {
        let state = self.state(key)?;
        self.states.name(state)
    }

    fn check_single(&self, flag: Flags) -> StateResult<()> {
        if flag.is_empty() || !flag.is_pure() || !flag.is_subset_of(self.states.declared_mask()) {
            return Err(StateError::StateInvalid(format!(
                "{flag} is not a single declared state"
            )));
        }
        Ok(())
    }

    /// Validate `key`, then honour its lock marker.
    fn lock(&self, key: &str) -> StateResult<Option<LockGuard>> {
        validate_key(key)?;
        let Some(locks) = &self.locks else {
            return Ok(None);
        };
        match self.lock_mode {
            LockMode::Advisory => {
                locks.assert_unlocked(key)?;
                Ok(None)
            }
            LockMode::Hold => locks.acquire(key).map(Some),
        }
    }

    fn track(&mut self, key: &str, state: Flags) {
        self.untrack(key);
        self.index.insert(key.to_string(), state);
        self.members
            .entry(state)
            .or_default()
            .insert(key.to_string());
    }

    fn untrack(&mut self, key: &str) -> Option<Flags> {
        let previous = self.index.remove(key)?;
        if let Some(members) = self.members.get_mut(&previous) {
            members.remove(key);
            if members.is_empty() {
                self.members.remove(&previous);
            }
        }
        Some(previous)
    }

    fn touch(&mut self, key: &str) {
        self.modified.insert(key.to_string(), Utc::now());
    }

    fn emit(&self, key: &str, from: Option<String>, to: String) {
        if let Some(observer) = &self.observer {
            observer(&StateEvent::new(key, from, to));
        }
    }
}
