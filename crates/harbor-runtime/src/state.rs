//! Query lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a query run is in its lifecycle.
///
/// `NotStarted -> Running -> (Interrupted | Completed | Failed)`. Terminal
/// states never change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    /// Created but never polled.
    #[default]
    NotStarted,
    /// The run task is live.
    Running,
    /// Stopped by [`QueryHandle::interrupt`](crate::QueryHandle::interrupt)
    /// or by dropping the handle.
    Interrupted,
    /// Finished after emitting `session_ended`.
    Completed,
    /// Ended with an error.
    Failed,
}

impl QueryState {
    /// Whether this state is final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Interrupted | Self::Completed | Self::Failed)
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Interrupted => "interrupted",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Move to `next` unless already terminal. Returns the resulting state.
    pub(crate) fn advance(&mut self, next: Self) -> Self {
        if !self.is_terminal() {
            *self = next;
        }
        *self
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
