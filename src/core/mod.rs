//! Core state vocabulary and errors.
//!
//! This module contains the in-memory parts of the store:
//! - `Flags`, the bit pattern identifying a state
//! - `StateSet`, the registry of state names and aliases
//! - `Verifier` and `StateEvent`, the transition hooks
//!
//! Nothing here touches the filesystem.

mod error;
mod event;
mod flags;
mod state_set;
mod verifier;

pub use error::{StateError, StateResult};
pub use event::{Observer, StateEvent};
pub use flags::Flags;
pub use state_set::{canonical_name, StateMatch, StateRef, StateSet, DEFAULT_STATE_NAME};
pub use verifier::{TransitionRequest, Verifier};
