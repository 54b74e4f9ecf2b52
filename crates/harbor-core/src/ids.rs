//! ID newtypes and stateless ID generation.
//!
//! Every identifier that crosses a crate boundary is a newtype around `String`
//! so a session ID can never be passed where a message ID is expected.
//!
//! Generation is a pure function of an entropy source (and, for sessions, the
//! clock). There are no process-wide counters, so generators can be called
//! from any task without coordination:
//!
//! - Message IDs are UUID v4 strings (36 chars, version nibble `4`).
//! - Session IDs look like `session_<unix-ms>_<9 base36 chars>`.
//! - Snapshot IDs are `snap_` followed by a UUID v4 without hyphens.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Number of random base36 characters in a generated session ID.
pub const SESSION_SUFFIX_LEN: usize = 9;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id! {
    /// Unique identifier of a single streamed message.
    MessageId
}

string_id! {
    /// Identifier grouping every message of one logical run.
    SessionId
}

string_id! {
    /// Identifier of a persisted execution-context snapshot.
    SnapshotId
}

impl MessageId {
    /// Generate a fresh UUID v4 message ID from thread-local entropy.
    #[must_use]
    pub fn new() -> Self {
        message_id_from(&mut rand::rng())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionId {
    /// Generate a fresh session ID from the wall clock and thread-local entropy.
    #[must_use]
    pub fn new() -> Self {
        session_id_from(chrono::Utc::now().timestamp_millis(), &mut rand::rng())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotId {
    /// Generate a fresh snapshot ID from thread-local entropy.
    #[must_use]
    pub fn new() -> Self {
        let uuid = random_uuid(&mut rand::rng());
        Self(format!("snap_{}", uuid.simple()))
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

fn random_uuid<R: RngCore>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// Generate a UUID v4 message ID from the given entropy source.
pub fn message_id_from<R: RngCore>(rng: &mut R) -> MessageId {
    MessageId(random_uuid(rng).to_string())
}

/// Generate a `session_<unix-ms>_<base36>` session ID.
pub fn session_id_from<R: RngCore>(unix_ms: i64, rng: &mut R) -> SessionId {
    let suffix: String = (0..SESSION_SUFFIX_LEN)
        .map(|_| BASE36[(rng.next_u32() % 36) as usize] as char)
        .collect();
    SessionId(format!("session_{unix_ms}_{suffix}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
