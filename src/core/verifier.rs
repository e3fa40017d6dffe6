//! Transition verifiers.
//!
//! A verifier is consulted before every state transition of an existing item
//! and may veto it with a reason.

use super::flags::Flags;
use super::state_set::StateSet;

/// Transition under consideration, handed to a [`Verifier`].
#[derive(Clone, Copy, Debug)]
pub struct TransitionRequest<'a> {
    pub key: &'a str,
    pub from: Flags,
    pub to: Flags,
    pub states: &'a StateSet,
}

impl TransitionRequest<'_> {
    /// Name of the target state, if it has one.
    pub fn to_name(&self) -> Option<String> {
        self.states.name(self.to).ok()
    }
}

/// Check applied to every transition.
///
/// Returning `Err(reason)` rejects the transition; the store reports it as
/// `StateError::TransitionInvalid`.
///
/// # Example
///
/// ```rust
/// use stateshelf::core::{Flags, StateSet, TransitionRequest, Verifier};
///
/// let mut states = StateSet::new();
/// let open = states.add("open").unwrap();
/// let closed = states.add("closed").unwrap();
///
/// // Closed items stay closed.
/// let verifier = Verifier::new(move |req: &TransitionRequest<'_>| {
///     if req.from == closed {
///         Err("item is closed".to_string())
///     } else {
///         Ok(())
///     }
/// });
///
/// let allowed = TransitionRequest { key: "a", from: open, to: closed, states: &states };
/// let denied = TransitionRequest { key: "a", from: closed, to: open, states: &states };
/// assert!(verifier.check(&allowed).is_ok());
/// assert!(verifier.check(&denied).is_err());
/// ```
pub struct Verifier {
    check: Box<dyn Fn(&TransitionRequest<'_>) -> Result<(), String> + Send + Sync>,
}

impl Verifier {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&TransitionRequest<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        Verifier {
            check: Box::new(check),
        }
    }

    /// Verifier from a boolean predicate and a fixed rejection message.
    pub fn from_predicate<F>(predicate: F, message: impl Into<String>) -> Self
    where
        F: Fn(&TransitionRequest<'_>) -> bool + Send + Sync + 'static,
    {
        let message = message.into();
        Self::new(move |req| {
            if predicate(req) {
                Ok(())
            } else {
                Err(message.clone())
            }
        })
    }

    pub fn check(&self, request: &TransitionRequest<'_>) -> Result<(), String> {
        (self.check)(request)
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier").finish_non_exhaustive()
    }
}
