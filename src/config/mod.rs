//! Serializable store configuration.
//!
//! A configuration names the state vocabulary and where the store lives, so
//! an embedding application can keep it in a JSON file instead of code.
//!
//! Validation uses Stillwater's `Validation` to report every problem in a
//! configuration at once instead of stopping at the first.
//!
//! # Example
//!
//! ```rust
//! use stateshelf::config::StateSetConfig;
//!
//! let config = StateSetConfig::from_json_str(r#"{
//!     "states": ["foo", "bar", "baz"],
//!     "aliases": [{ "name": "xyzzy", "states": ["foo", "bar"] }]
//! }"#).unwrap();
//!
//! let states = config.build().unwrap();
//! assert_eq!(states.resolve(states.from_name("xyzzy").unwrap()).unwrap(), "XYZZY");
//! ```

mod issues;

pub use issues::ConfigIssue;

use crate::builder::PersistedStateBuilder;
use crate::core::{canonical_name, StateError, StateResult, StateSet, DEFAULT_STATE_NAME};
use crate::lock::{LockDir, LockMode};
use crate::persist::PersistedState;
use crate::backend::FsBackend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::info;

fn default_true() -> bool {
    true
}

/// An alias declared in configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasConfig {
    pub name: String,
    pub states: Vec<String>,
}

/// Declarative description of a [`StateSet`].
///
/// Aliases are applied in order, so an alias may reference aliases declared
/// before it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSetConfig {
    #[serde(default)]
    pub default_state: Option<String>,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<AliasConfig>,
    #[serde(default = "default_true")]
    pub check_alias: bool,
}

impl Default for StateSetConfig {
    fn default() -> Self {
        Self {
            default_state: None,
            states: Vec::new(),
            aliases: Vec::new(),
            check_alias: true,
        }
    }
}

impl StateSetConfig {
    pub fn from_json_str(json: &str) -> StateResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check names, uniqueness and alias references, collecting every issue.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<ConfigIssue>> {
        let mut checks: Vec<Validation<(), NonEmptyVec<ConfigIssue>>> = Vec::new();
        let mut known: BTreeSet<String> = BTreeSet::new();

        let default = self
            .default_state
            .as_deref()
            .unwrap_or(DEFAULT_STATE_NAME);
        checks.push(declare(default, &mut known));

        if self.states.len() > crate::core::Flags::CAPACITY as usize {
            checks.push(Validation::fail(ConfigIssue::TooManyStates {
                count: self.states.len(),
                max: crate::core::Flags::CAPACITY as usize,
            }));
        }
        for state in &self.states {
            checks.push(declare(state, &mut known));
        }

        for alias in &self.aliases {
            let mut alias_checks = Vec::new();
            if alias.states.len() < 2 {
                alias_checks.push(Validation::fail(ConfigIssue::AliasTooSmall {
                    alias: alias.name.clone(),
                }));
            }
            for part in &alias.states {
                let check = match canonical_name(part) {
                    Ok(name) if known.contains(&name) => Validation::success(()),
                    _ => Validation::fail(ConfigIssue::UnknownReference {
                        alias: alias.name.clone(),
                        state: part.clone(),
                    }),
                };
                alias_checks.push(check);
            }
            checks.extend(alias_checks);
            checks.push(declare(&alias.name.replace('.', "__"), &mut known));
        }

        Validation::all_vec(checks).map(|_| ())
    }

    /// Validate, then build the state set.
    pub fn build(&self) -> StateResult<StateSet> {
        if let Validation::Failure(issues) = self.validate() {
            let message = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(StateError::Config(message));
        }

        let mut states = match &self.default_state {
            Some(name) => StateSet::with_default_state(name)?,
            None => StateSet::new(),
        }
        .check_alias(self.check_alias);

        for state in &self.states {
            states.add(state)?;
        }
        for alias in &self.aliases {
            states.alias(&alias.name, &alias.states)?;
        }
        Ok(states)
    }
}

fn declare(name: &str, known: &mut BTreeSet<String>) -> Validation<(), NonEmptyVec<ConfigIssue>> {
    match canonical_name(name) {
        Err(_) => Validation::fail(ConfigIssue::InvalidName {
            name: name.to_string(),
        }),
        Ok(canonical) => {
            if known.insert(canonical.clone()) {
                Validation::success(())
            } else {
                Validation::fail(ConfigIssue::Duplicate { name: canonical })
            }
        }
    }
}

/// Configuration of a filesystem-backed store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per state.
    pub root: PathBuf,
    /// Lock directory; relative paths are resolved against `root`.
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub locking: bool,
    #[serde(default)]
    pub lock_mode: LockMode,
    /// Adopt existing records when opening.
    #[serde(default = "default_true")]
    pub sync_on_open: bool,
    #[serde(default)]
    pub states: StateSetConfig,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>, states: StateSetConfig) -> Self {
        Self {
            root: root.into(),
            lock_dir: None,
            locking: true,
            lock_mode: LockMode::Advisory,
            sync_on_open: true,
            states,
        }
    }

    pub fn from_json_str(json: &str) -> StateResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| StateError::storage(path, e))?;
        Self::from_json_str(&content)
    }

    /// Lock directory this configuration resolves to, if locking is on.
    pub fn resolved_lock_dir(&self) -> Option<LockDir> {
        if !self.locking {
            return None;
        }
        let dir = match &self.lock_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.root.join(dir),
            None => FsBackend::new(&self.root).lock_dir().path().to_path_buf(),
        };
        Some(LockDir::new(dir))
    }

    /// Build the state set, open the backend and assemble the store.
    pub fn open(&self) -> StateResult<PersistedState<FsBackend>> {
        let states = self.states.build()?;
        let backend = FsBackend::open(&self.root)?;

        let mut builder = PersistedStateBuilder::new()
            .states(states)
            .backend(backend)
            .sync_on_build(self.sync_on_open);
        if let Some(locks) = self.resolved_lock_dir() {
            builder = builder.locks(locks, self.lock_mode);
        }
        let store = builder
            .build()
            .map_err(|e| StateError::Config(e.to_string()))?;
        info!(root = %self.root.display(), items = store.count(), "store opened");
        Ok(store)
    }
}
