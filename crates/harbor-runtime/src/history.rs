//! Client-side conversation history.
//!
//! The CLI is stateless across invocations, so every turn after the first
//! re-sends the transcript as a flat prompt:
//!
//! ```text
//! Human: <prompt>
//!
//! Assistant: <text that requested tools>
//!
//! Human: <tool results>
//!
//! <continuation instruction>
//! ```

use serde::{Deserialize, Serialize};

/// Prompt sent as the new user input on every turn after a tool round.
pub const CONTINUATION_PROMPT: &str =
    "Continue with the task using the tool results above. Request more tools only if you still need them.";

/// Who authored a history entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The caller or tool results fed back on the caller's behalf.
    User,
    /// The model.
    Assistant,
}

impl Role {
    /// Transcript label.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "Human",
            Self::Assistant => "Assistant",
        }
    }
}

/// One transcript entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Author.
    pub role: Role,
    /// Text.
    pub text: String,
}

/// Ordered transcript owned by one query run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.entries.push(HistoryEntry {
            role,
            text: text.into(),
        });
    }

    /// Append a user entry.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Role::User, text);
    }

    /// Append an assistant entry.
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(Role::Assistant, text);
    }

    /// Entries in order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The transcript as `Label: text` blocks separated by blank lines.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.role.label(), e.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Prompt for the next turn: the transcript followed by `next`.
    ///
    /// With an empty history this is just `next`.
    pub fn to_prompt(&self, next: &str) -> String {
        if self.entries.is_empty() {
            return next.to_owned();
        }
        format!("{}\n\n{next}", self.render())
    }
}
