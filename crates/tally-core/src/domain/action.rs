use std::fmt;

use serde::{Deserialize, Serialize};

use super::record::ActionStatus;

/// A user intent against one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Mark the oldest pending unit done.
    Increment,
    /// Reopen the most recently done unit.
    Decrement,
}

impl Action {
    /// Status the targeted record is moved to.
    pub fn target_status(self) -> ActionStatus {
        match self {
            Action::Increment => ActionStatus::Done,
            Action::Decrement => ActionStatus::Pending,
        }
    }

    /// Verb used in user-visible messages.
    pub fn verb(self) -> &'static str {
        match self {
            Action::Increment => "complete",
            Action::Decrement => "reopen",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Increment => f.write_str("increment"),
            Action::Decrement => f.write_str("decrement"),
        }
    }
}
