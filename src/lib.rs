//! Stateshelf: a persisted finite-state item store
//!
//! Stateshelf tracks items (opaque byte records under a string key) that are
//! each in exactly one state of a small vocabulary. States are bit flags, so
//! several primitive states can combine into a named alias. The store keeps
//! an in-memory reverse index from state to keys and delegates storage to a
//! [`Backend`](backend::Backend); the filesystem backend lays items out as one
//! directory per state and one file per key, so a state change is a rename.
//!
//! # Core Concepts
//!
//! - **StateSet**: Registry of state names, flag bits and aliases
//! - **Backend**: Partitioned key/value storage (directory tree or memory)
//! - **Locks**: Marker files that keep other writers off a key
//! - **PersistedState**: The facade tying states, backend, index and locks together
//!
//! # Example
//!
//! ```rust
//! use stateshelf::backend::MemoryBackend;
//! use stateshelf::core::StateSet;
//! use stateshelf::persist::PersistedState;
//!
//! let mut states = StateSet::new();
//! let foo = states.add("foo").unwrap();
//! let bar = states.add("bar").unwrap();
//! states.alias("xyzzy", ["foo", "bar"]).unwrap();
//!
//! let mut store = PersistedState::new(states, MemoryBackend::new());
//! store.put("abcd", Some(foo), b"payload").unwrap();
//! store.set("abcd", bar).unwrap();
//!
//! assert_eq!(store.state("abcd").unwrap(), foo | bar);
//! assert_eq!(store.state_name("abcd").unwrap(), "XYZZY");
//! assert!(store.list(foo).is_empty());
//! assert!(store.list(foo | bar).contains("abcd"));
//! assert_eq!(store.get("abcd").unwrap(), b"payload");
//! ```

pub mod backend;
pub mod builder;
pub mod config;
pub mod core;
pub mod lock;
pub mod persist;

// Re-export commonly used types
pub use backend::{Backend, FsBackend, MemoryBackend};
pub use builder::{BuildError, PersistedStateBuilder};
pub use config::{StateSetConfig, StoreConfig};
pub use core::{Flags, StateError, StateEvent, StateResult, StateSet, Verifier};
pub use lock::{LockDir, LockMode};
pub use persist::{PersistedState, SyncReport};
