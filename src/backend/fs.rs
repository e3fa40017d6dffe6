//! Directory-per-state filesystem backend.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<STATE>/<key>        record contents, no framing
//! <root>/<STATE>/.<key>.tmp   transient while writing
//! <root>/.lock/<key>          lock markers (see `crate::lock`)
//! ```
//!
//! Entries whose names start with `.` are never partitions or records.

use super::Backend;
use crate::core::{StateError, StateResult};
use crate::lock::{LockDir, DEFAULT_LOCK_DIR};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Backend storing each state as a directory and each item as a file.
#[derive(Clone, Debug)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Backend rooted at `root`. Nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Backend rooted at `root`, creating the directory now.
    pub fn open(root: impl Into<PathBuf>) -> StateResult<Self> {
        let backend = Self::new(root);
        fs::create_dir_all(&backend.root).map_err(|e| StateError::storage(&backend.root, e))?;
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The conventional lock directory for this root.
    pub fn lock_dir(&self) -> LockDir {
        LockDir::new(self.root.join(DEFAULT_LOCK_DIR))
    }

    fn partition_dir(&self, partition: &str) -> PathBuf {
        self.root.join(partition)
    }

    fn record(&self, partition: &str, key: &str) -> PathBuf {
        self.partition_dir(partition).join(key)
    }

    fn ensure_partition(&self, partition: &str) -> StateResult<PathBuf> {
        let dir = self.partition_dir(partition);
        fs::create_dir_all(&dir).map_err(|e| StateError::storage(&dir, e))?;
        Ok(dir)
    }

    /// Write through a hidden temporary file so readers never see a torn record.
    fn write_record(&self, dir: &Path, key: &str, contents: &[u8]) -> StateResult<()> {
        let tmp = dir.join(format!(".{key}.tmp"));
        let target = dir.join(key);
        let mut file = File::create(&tmp).map_err(|e| StateError::storage(&tmp, e))?;
        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .map_err(|e| StateError::storage(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &target).map_err(|e| StateError::storage(&target, e))
    }

    fn read_names(dir: &Path, want_dirs: bool) -> StateResult<Vec<String>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::storage(dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StateError::storage(dir, e))?;
            let file_type = entry.file_type().map_err(|e| StateError::storage(entry.path(), e))?;
            if file_type.is_dir() != want_dirs {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "skipping non UTF-8 entry");
                continue;
            };
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

fn not_found_or_storage(key: &str, path: PathBuf, e: std::io::Error) -> StateError {
    if e.kind() == ErrorKind::NotFound {
        StateError::NotFound(key.to_string())
    } else {
        StateError::storage(path, e)
    }
}

impl Backend for FsBackend {
    fn put(&mut self, partition: &str, key: &str, contents: &[u8]) -> StateResult<()> {
        if let Some(existing) = self.locate(key)? {
            debug!(key, partition = %existing, "record already present");
            return Err(StateError::ItemExists(key.to_string()));
        }
        let dir = self.ensure_partition(partition)?;
        self.write_record(&dir, key, contents)?;
        debug!(key, partition, bytes = contents.len(), "record written");
        Ok(())
    }

    fn get(&self, key: &str, partition: Option<&str>) -> StateResult<Vec<u8>> {
        let partition = match partition {
            Some(p) => p.to_string(),
            None => self.require(key)?,
        };
        let path = self.record(&partition, key);
        fs::read(&path).map_err(|e| not_found_or_storage(key, path, e))
    }

    fn locate(&self, key: &str) -> StateResult<Option<String>> {
        for partition in self.ls()? {
            if self.record(&partition, key).is_file() {
                return Ok(Some(partition));
            }
        }
        Ok(None)
    }

    fn relocate(&mut self, key: &str, from: &str, to: &str) -> StateResult<()> {
        let source = self.record(from, key);
        if !source.is_file() {
            return Err(StateError::NotFound(key.to_string()));
        }
        if from == to {
            debug!(key, partition = from, "relocate to same partition");
            return Ok(());
        }

        let dir = self.ensure_partition(to)?;
        let target = dir.join(key);
        if target.exists() {
            return Err(StateError::Corruption(format!(
                "{key} present in both {from} and {to}"
            )));
        }
        fs::rename(&source, &target).map_err(|e| StateError::storage(&target, e))?;
        debug!(key, from, to, "record moved");
        Ok(())
    }

    fn replace(&mut self, key: &str, contents: &[u8], partition: Option<&str>) -> StateResult<()> {
        let partition = match partition {
            Some(p) => p.to_string(),
            None => self.require(key)?,
        };
        if !self.record(&partition, key).is_file() {
            return Err(StateError::NotFound(key.to_string()));
        }
        let dir = self.partition_dir(&partition);
        self.write_record(&dir, key, contents)?;
        debug!(key, partition = %partition, bytes = contents.len(), "record replaced");
        Ok(())
    }

    fn remove(&mut self, key: &str, partition: &str) -> StateResult<()> {
        let path = self.record(partition, key);
        fs::remove_file(&path).map_err(|e| not_found_or_storage(key, path, e))?;
        debug!(key, partition, "record removed");
        Ok(())
    }

    fn list(&self, partition: &str) -> StateResult<BTreeSet<String>> {
        let names = Self::read_names(&self.partition_dir(partition), false)?;
        Ok(names.into_iter().collect())
    }

    fn path(&self, partition: &str, key: Option<&str>) -> Option<PathBuf> {
        Some(match key {
            Some(key) => self.record(partition, key),
            None => self.partition_dir(partition),
        })
    }

    fn ls(&self) -> StateResult<Vec<String>> {
        Self::read_names(&self.root, true)
    }

    fn sync(&mut self, partition: Option<&str>) -> StateResult<()> {
        let partitions = match partition {
            Some(p) => vec![p.to_string()],
            None => self.ls()?,
        };
        for partition in partitions {
            let dir = self.partition_dir(&partition);
            if dir.is_dir() {
                sync_dir(&dir)?;
            }
        }
        Ok(())
    }

    fn modified(&self, key: &str, partition: &str) -> StateResult<Option<DateTime<Utc>>> {
        let path = self.record(partition, key);
        let metadata = fs::metadata(&path).map_err(|e| not_found_or_storage(key, path.clone(), e))?;
        match metadata.modified() {
            Ok(time) => Ok(Some(DateTime::<Utc>::from(time))),
            Err(e) if e.kind() == ErrorKind::Unsupported => Ok(None),
            Err(e) => Err(StateError::storage(path, e)),
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> StateResult<()> {
    fs::File::open(dir)
        .and_then(|f| f.sync_all())
        .map_err(|e| StateError::storage(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> StateResult<()> {
    Ok(())
}
