//! Reconciliation of the reverse index with backend contents.

use super::PersistedState;
use crate::backend::Backend;
use crate::core::{Flags, StateResult};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Differences found and applied by [`PersistedState::sync`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Keys that appeared in the backend.
    pub added: Vec<String>,
    /// Keys that disappeared from the backend.
    pub removed: Vec<String>,
    /// Keys found in a different partition than indexed.
    pub moved: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }
}

impl<B: Backend> PersistedState<B> {
    /// Bring the index in line with the backend.
    ///
    /// With a state, only that partition is scanned; keys that left it are
    /// looked up elsewhere before being dropped. Without one, every
    /// materialized partition is scanned. Records added, removed or moved by
    /// other processes are adopted rather than reported as errors.
    pub fn sync(&mut self, state: Option<Flags>) -> StateResult<SyncReport> {
        let report = match state {
            Some(flags) => self.sync_partition(flags)?,
            None => self.sync_all()?,
        };
        if report.is_empty() {
            debug!("sync found no drift");
        } else {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                moved = report.moved.len(),
                "sync adopted backend changes"
            );
        }
        Ok(report)
    }

    fn sync_all(&mut self) -> StateResult<SyncReport> {
        self.backend.sync(None)?;

        let mut seen: BTreeMap<String, Flags> = BTreeMap::new();
        for partition in self.backend.ls()? {
            let Some(flags) = self.adopt_partition(&partition) else {
                continue;
            };
            for key in self.backend.list(&partition)? {
                if let Some(other) = seen.get(&key) {
                    warn!(key = %key, first = %other, again = %partition, "record present in two partitions, keeping first");
                    continue;
                }
                seen.insert(key, flags);
            }
        }

        let mut report = SyncReport::default();
        let gone: Vec<String> = self
            .index
            .keys()
            .filter(|key| !seen.contains_key(*key))
            .cloned()
            .collect();
        for key in gone {
            self.untrack(&key);
            self.modified.remove(&key);
            report.removed.push(key);
        }
        for (key, flags) in seen {
            match self.index.get(&key) {
                Some(current) if *current == flags => {}
                Some(_) => {
                    self.track(&key, flags);
                    report.moved.push(key);
                }
                None => {
                    self.track(&key, flags);
                    report.added.push(key);
                }
            }
        }
        Ok(report)
    }

    fn sync_partition(&mut self, flags: Flags) -> StateResult<SyncReport> {
        let partition = self.partition_for(flags)?;
        self.backend.sync(Some(&partition))?;

        let on_disk = self.backend.list(&partition)?;
        let indexed = self.list(flags);
        let mut report = SyncReport::default();

        for key in on_disk.difference(&indexed) {
            if self.index.contains_key(key) {
                report.moved.push(key.clone());
            } else {
                report.added.push(key.clone());
            }
            self.track(key, flags);
        }

        for key in indexed.difference(&on_disk) {
            let elsewhere = self
                .backend
                .locate(key)?
                .and_then(|p| self.adopt_partition(&p));
            match elsewhere {
                Some(other) => {
                    self.track(key, other);
                    report.moved.push(key.clone());
                }
                None => {
                    self.untrack(key);
                    self.modified.remove(key);
                    report.removed.push(key.clone());
                }
            }
        }
        Ok(report)
    }

    /// Flags for a partition found in the backend, if it belongs to the
    /// state set under its canonical name.
    fn adopt_partition(&mut self, partition: &str) -> Option<Flags> {
        let flags = match self.states.from_name(partition) {
            Ok(flags) => flags,
            Err(_) => {
                warn!(partition, "ignoring partition outside the state set");
                return None;
            }
        };
        match self.partition_for(flags) {
            Ok(name) if name == partition => Some(flags),
            Ok(name) => {
                warn!(partition, canonical = %name, "ignoring partition with non-canonical name");
                None
            }
            Err(e) => {
                warn!(partition, error = %e, "ignoring partition for unnamed state");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::{Backend, MemoryBackend};
    use crate::core::{Flags, StateSet};
    use crate::persist::PersistedState;

    fn store() -> (PersistedState<MemoryBackend>, Flags, Flags) {
        let mut states = StateSet::new();
        let foo = states.add("foo").unwrap();
        let bar = states.add("bar").unwrap();
        states.alias("xyzzy", ["foo", "bar"]).unwrap();
        (PersistedState::new(states, MemoryBackend::new()), foo, bar)
    }

    #[test]
    fn sync_adopts_external_records() {
        let (mut store, foo, bar) = store();
        store.put("mine", Some(foo), b"").unwrap();
        store.backend_mut().put("BAR", "theirs", b"x").unwrap();

        assert!(!store.contains("theirs"));
        let report = store.sync(None).unwrap();

        assert_eq!(report.added, vec!["theirs"]);
        assert!(report.removed.is_empty());
        assert_eq!(store.state("theirs").unwrap(), bar);
        assert_eq!(store.get("theirs").unwrap(), b"x");
        assert!(store.modified("theirs").unwrap().is_some());
    }

    #[test]
    fn sync_drops_removed_records() {
        let (mut store, foo, _) = store();
        store.put("abcd", Some(foo), b"").unwrap();
        store.backend_mut().remove("abcd", "FOO").unwrap();

        let report = store.sync(Some(foo)).unwrap();
        assert_eq!(report.removed, vec!["abcd"]);
        assert!(store.list(foo).is_empty());
        assert!(store.state("abcd").unwrap_err().is_not_found());
    }

    #[test]
    fn sync_follows_external_moves() {
        let (mut store, foo, bar) = store();
        store.put("abcd", Some(foo), b"").unwrap();
        store.backend_mut().relocate("abcd", "FOO", "XYZZY").unwrap();

        let report = store.sync(Some(foo)).unwrap();
        assert_eq!(report.moved, vec!["abcd"]);
        assert_eq!(store.state("abcd").unwrap(), foo | bar);

        store.backend_mut().relocate("abcd", "XYZZY", "BAR").unwrap();
        let report = store.sync(None).unwrap();
        assert_eq!(report.moved, vec!["abcd"]);
        assert_eq!(store.state("abcd").unwrap(), bar);
    }

    #[test]
    fn sync_ignores_unknown_partitions() {
        let (mut store, ..) = store();
        store.backend_mut().put("STRAY", "abcd", b"").unwrap();
        store.backend_mut().put("_FOO__BAR", "efgh", b"").unwrap();

        let report = store.sync(None).unwrap();
        assert!(report.is_empty());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn sync_adopts_synthetic_partitions_without_alias_check() {
        let mut states = StateSet::new().check_alias(false);
        let a = states.add("a").unwrap();
        let b = states.add("b").unwrap();
        let mut store = PersistedState::new(states, MemoryBackend::new());
        store.backend_mut().put("_A__B", "abcd", b"").unwrap();

        store.sync(None).unwrap();
        assert_eq!(store.state("abcd").unwrap(), a | b);
        assert_eq!(store.state_name("abcd").unwrap(), "_A__B");
    }

    #[test]
    fn second_sync_is_clean() {
        let (mut store, ..) = store();
        store.backend_mut().put("NEW", "abcd", b"").unwrap();
        assert!(!store.sync(None).unwrap().is_empty());
        assert!(store.sync(None).unwrap().is_empty());
        assert!(store.sync(Some(Flags::EMPTY)).unwrap().is_empty());
    }
}
