//! State change notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of a single item entering a state.
///
/// `from` is `None` when the item was just put into the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEvent {
    pub key: String,
    pub from: Option<String>,
    pub to: String,
    pub timestamp: DateTime<Utc>,
}

impl StateEvent {
    pub fn new(key: &str, from: Option<String>, to: String) -> Self {
        Self {
            key: key.to_string(),
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    /// True for transitions that leave the item where it was.
    pub fn is_self_transition(&self) -> bool {
        self.from.as_deref() == Some(self.to.as_str())
    }
}

/// Callback receiving every [`StateEvent`] emitted by a store.
pub type Observer = Box<dyn Fn(&StateEvent) + Send + Sync>;
