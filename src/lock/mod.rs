//! Advisory per-key locking.
//!
//! A lock is a marker file named by the item key inside a lock directory.
//! The store never creates markers in [`LockMode::Advisory`]; it only refuses
//! to mutate an item while a marker exists. Another worker creates and removes
//! the marker around its own out-of-band access, typically with
//! [`LockDir::acquire`].
//!
//! The advisory check and the mutation that follows are not atomic: a marker
//! created between the two goes unnoticed. [`LockMode::Hold`] closes that
//! window by having the store create the marker itself for the duration of
//! the operation.

use crate::core::{StateError, StateResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the lock directory inside a filesystem store root.
pub const DEFAULT_LOCK_DIR: &str = ".lock";

/// How the store honours lock markers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Refuse mutation while a marker exists (check then act).
    #[default]
    Advisory,

    /// Create the marker before mutating and remove it afterwards.
    Hold,
}

/// Directory holding lock markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockDir {
    path: PathBuf,
}

impl LockDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the marker for `key`.
    pub fn marker(&self, key: &str) -> PathBuf {
        self.path.join(key)
    }

    /// Whether a marker exists for `key`. Never modifies anything.
    pub fn is_locked(&self, key: &str) -> bool {
        self.marker(key).exists()
    }

    /// Fail with `LockedKey` when `key` is locked.
    pub fn assert_unlocked(&self, key: &str) -> StateResult<()> {
        if self.is_locked(key) {
            debug!(key, "refusing to touch locked item");
            return Err(StateError::LockedKey(key.to_string()));
        }
        Ok(())
    }

    /// Create the marker for `key`, failing with `LockedKey` if it exists.
    ///
    /// The marker is removed when the returned guard is dropped or released.
    pub fn acquire(&self, key: &str) -> StateResult<LockGuard> {
        fs::create_dir_all(&self.path).map_err(|e| StateError::storage(&self.path, e))?;
        let marker = self.marker(key);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&marker)
        {
            Ok(_) => {
                debug!(key, "lock acquired");
                Ok(LockGuard {
                    key: key.to_string(),
                    marker: Some(marker),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StateError::LockedKey(key.to_string()))
            }
            Err(e) => Err(StateError::storage(marker, e)),
        }
    }
}

/// Held lock marker; removed on drop.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    marker: Option<PathBuf>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Remove the marker now, reporting failures instead of logging them.
    pub fn release(mut self) -> StateResult<()> {
        match self.marker.take() {
            Some(marker) => {
                fs::remove_file(&marker).map_err(|e| StateError::storage(marker, e))?;
                debug!(key = %self.key, "lock released");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(marker) = self.marker.take() {
            if let Err(e) = fs::remove_file(&marker) {
                warn!(key = %self.key, error = %e, "failed to remove lock marker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_marker_means_unlocked() {
        let dir = TempDir::new().unwrap();
        let locks = LockDir::new(dir.path().join(".lock"));
        assert!(!locks.is_locked("xxxx"));
        assert!(locks.assert_unlocked("xxxx").is_ok());
        // Checking must not create the directory.
        assert!(!locks.path().exists());
    }

    #[test]
    fn external_marker_locks_key() {
        let dir = TempDir::new().unwrap();
        let locks = LockDir::new(dir.path());
        fs::write(locks.marker("xxxx"), b"").unwrap();

        assert!(locks.is_locked("xxxx"));
        assert!(matches!(
            locks.assert_unlocked("xxxx"),
            Err(StateError::LockedKey(_))
        ));
        assert!(!locks.is_locked("yyyy"));
    }

    #[test]
    fn acquire_is_exclusive_and_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let locks = LockDir::new(dir.path().join("locks"));

        let guard = locks.acquire("xxxx").unwrap();
        assert_eq!(guard.key(), "xxxx");
        assert!(locks.is_locked("xxxx"));
        assert!(matches!(
            locks.acquire("xxxx"),
            Err(StateError::LockedKey(_))
        ));

        drop(guard);
        assert!(!locks.is_locked("xxxx"));
    }

    #[test]
    fn release_removes_marker() {
        let dir = TempDir::new().unwrap();
        let locks = LockDir::new(dir.path());
        let guard = locks.acquire("k").unwrap();
        guard.release().unwrap();
        assert!(!locks.is_locked("k"));
    }

    #[test]
    fn lock_mode_reads_lowercase() {
        let mode: LockMode = serde_json::from_str("\"hold\"").unwrap();
        assert_eq!(mode, LockMode::Hold);
        assert_eq!(LockMode::default(), LockMode::Advisory);
    }
}
