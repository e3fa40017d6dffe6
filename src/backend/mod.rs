//! Persistence backends.
//!
//! A backend stores one record per item key inside a partition named after
//! the item's state. It knows nothing about flags or aliases: the store
//! resolves states to partition names before calling in. Any persistence
//! engine can stand in for the filesystem by implementing [`Backend`].
//!
//! Implementations:
//! - [`FsBackend`]: one directory per state, one file per key
//! - [`MemoryBackend`]: in-process maps, for tests and ephemeral stores

mod fs;
mod memory;

pub use self::fs::FsBackend;
pub use self::memory::MemoryBackend;

use crate::core::{StateError, StateResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// State-partitioned key/value persistence.
///
/// All operations are synchronous and fail closed: storage failures surface
/// as `StateError::Storage`, never as silent defaults.
pub trait Backend {
    /// Create the record for `key` in `partition`.
    ///
    /// Fails with `ItemExists` if `key` is present in any partition.
    fn put(&mut self, partition: &str, key: &str, contents: &[u8]) -> StateResult<()>;

    /// Contents of `key`, looked up in `partition` or located first when `None`.
    fn get(&self, key: &str, partition: Option<&str>) -> StateResult<Vec<u8>>;

    /// Partition currently holding `key`.
    fn locate(&self, key: &str) -> StateResult<Option<String>>;

    /// Move the record for `key` between partitions.
    ///
    /// The key is never absent from every partition while this runs. With
    /// `from == to` only the existence of the record is checked.
    fn relocate(&mut self, key: &str, from: &str, to: &str) -> StateResult<()>;

    /// Overwrite the contents of `key` without moving it.
    fn replace(&mut self, key: &str, contents: &[u8], partition: Option<&str>) -> StateResult<()>;

    /// Delete the record for `key` from `partition`.
    fn remove(&mut self, key: &str, partition: &str) -> StateResult<()>;

    /// Keys recorded in exactly `partition`. Missing partitions are empty.
    fn list(&self, partition: &str) -> StateResult<BTreeSet<String>>;

    /// Durable address of a partition, or of a record inside it.
    fn path(&self, partition: &str, key: Option<&str>) -> Option<PathBuf>;

    /// Partitions currently materialized, sorted.
    fn ls(&self) -> StateResult<Vec<String>>;

    /// Flush or refresh `partition` (all partitions when `None`).
    fn sync(&mut self, _partition: Option<&str>) -> StateResult<()> {
        Ok(())
    }

    /// Last write time of a record, if the backend tracks one.
    fn modified(&self, _key: &str, _partition: &str) -> StateResult<Option<DateTime<Utc>>> {
        Ok(None)
    }

    /// Partition holding `key`, or `NotFound`.
    fn require(&self, key: &str) -> StateResult<String> {
        self.locate(key)?
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }
}

/// Longest accepted key in bytes. Leaves room for the `.` prefix and `.tmp`
/// suffix of the temporary file within a 255-byte file name.
pub const MAX_KEY_LEN: usize = 250;

/// Check that `key` can name a record: non-empty, a single path component,
/// not hidden, and at most [`MAX_KEY_LEN`] bytes.
pub fn validate_key(key: &str) -> StateResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && !key.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StateError::InvalidKey(key.to_string()))
    }
}
