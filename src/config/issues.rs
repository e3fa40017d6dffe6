//! Problems found while validating a configuration.

use thiserror::Error;

/// A single configuration problem. Validation reports all of them together.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigIssue {
    #[error("invalid state name '{name}'")]
    InvalidName { name: String },

    #[error("state '{name}' declared more than once")]
    Duplicate { name: String },

    #[error("alias '{alias}' references unknown state '{state}'")]
    UnknownReference { alias: String, state: String },

    #[error("alias '{alias}' must combine at least two states")]
    AliasTooSmall { alias: String },

    #[error("{count} states declared, at most {max} fit")]
    TooManyStates { count: usize, max: usize },
}
