//! In-memory backend.

use super::Backend;
use crate::core::{StateError, StateResult};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;

#[derive(Clone, Debug)]
struct Record {
    contents: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Backend keeping partitions in process memory.
///
/// Partitions stay materialized once created, like directories on disk.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    partitions: BTreeMap<String, BTreeMap<String, Record>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, partition: &str, key: &str) -> Option<&Record> {
        self.partitions.get(partition).and_then(|p| p.get(key))
    }
}

impl Backend for MemoryBackend {
    fn put(&mut self, partition: &str, key: &str, contents: &[u8]) -> StateResult<()> {
        if self.locate(key)?.is_some() {
            return Err(StateError::ItemExists(key.to_string()));
        }
        self.partitions.entry(partition.to_string()).or_default().insert(
            key.to_string(),
            Record {
                contents: contents.to_vec(),
                modified: Utc::now(),
            },
        );
        debug!(key, partition, "record stored");
        Ok(())
    }

    fn get(&self, key: &str, partition: Option<&str>) -> StateResult<Vec<u8>> {
        let partition = match partition {
            Some(p) => p.to_string(),
            None => self.require(key)?,
        };
        self.record(&partition, key)
            .map(|r| r.contents.clone())
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }

    fn locate(&self, key: &str) -> StateResult<Option<String>> {
        Ok(self
            .partitions
            .iter()
            .find(|(_, records)| records.contains_key(key))
            .map(|(name, _)| name.clone()))
    }

    fn relocate(&mut self, key: &str, from: &str, to: &str) -> StateResult<()> {
        if self.record(from, key).is_none() {
            return Err(StateError::NotFound(key.to_string()));
        }
        if from == to {
            return Ok(());
        }
        if self.record(to, key).is_some() {
            return Err(StateError::Corruption(format!(
                "{key} present in both {from} and {to}"
            )));
        }
        let record = self
            .partitions
            .get_mut(from)
            .and_then(|p| p.remove(key))
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;
        self.partitions
            .entry(to.to_string())
            .or_default()
            .insert(key.to_string(), record);
        debug!(key, from, to, "record moved");
        Ok(())
    }

    fn replace(&mut self, key: &str, contents: &[u8], partition: Option<&str>) -> StateResult<()> {
        let partition = match partition {
            Some(p) => p.to_string(),
            None => self.require(key)?,
        };
        let record = self
            .partitions
            .get_mut(&partition)
            .and_then(|p| p.get_mut(key))
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;
        record.contents = contents.to_vec();
        record.modified = Utc::now();
        Ok(())
    }

    fn remove(&mut self, key: &str, partition: &str) -> StateResult<()> {
        self.partitions
            .get_mut(partition)
            .and_then(|p| p.remove(key))
            .map(|_| ())
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }

    fn list(&self, partition: &str) -> StateResult<BTreeSet<String>> {
        Ok(self
            .partitions
            .get(partition)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn path(&self, _partition: &str, _key: Option<&str>) -> Option<PathBuf> {
        None
    }

    fn ls(&self) -> StateResult<Vec<String>> {
        Ok(self.partitions.keys().cloned().collect())
    }

    fn modified(&self, key: &str, partition: &str) -> StateResult<Option<DateTime<Utc>>> {
        self.record(partition, key)
            .map(|r| Some(r.modified))
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }
}
