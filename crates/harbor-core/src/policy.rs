//! Policy for malformed lines on a live message stream.

use serde::{Deserialize, Serialize};

/// What the transport does with a stream line that is not valid JSON or is
/// not a recognized message.
///
/// The direct enrichment API always fails on such input; this policy only
/// governs live streaming, where one bad line otherwise ends the whole turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineErrorPolicy {
    /// Log at `warn` and continue with the next line.
    #[default]
    Skip,
    /// End the stream with a parse error.
    Fail,
}

impl LineErrorPolicy {
    /// Parse a policy name, case-insensitive.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}
