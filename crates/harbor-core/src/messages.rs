//! The closed message union streamed out of a sandboxed CLI run.
//!
//! Every line the driven process prints is one of seven message types. All of
//! them share a [`MessageBase`] (message ID, session ID, causal tool-use ID),
//! which the enricher guarantees is populated before a message leaves the
//! transport. Fields this crate does not model are kept in `extra` maps so a
//! message re-serializes without losing data.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content::{ApiMessage, MessageContent};
use crate::ids::{MessageId, SessionId};

// ─────────────────────────────────────────────────────────────────────────────
// Message type tag
// ─────────────────────────────────────────────────────────────────────────────

/// Discriminator of the closed message set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Session lifecycle and init information.
    System,
    /// User turn (including native tool results).
    User,
    /// Assistant turn.
    Assistant,
    /// Final result of one CLI invocation.
    Result,
    /// Tool invocation notice.
    ToolUse,
    /// Progress update.
    Progress,
    /// Error report.
    Error,
}

impl MessageType {
    /// Every member of the closed set.
    pub const ALL: [Self; 7] = [
        Self::System,
        Self::User,
        Self::Assistant,
        Self::Result,
        Self::ToolUse,
        Self::Progress,
        Self::Error,
    ];

    /// Wire name of the type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Result => "result",
            Self::ToolUse => "tool_use",
            Self::Progress => "progress",
            Self::Error => "error",
        }
    }

    /// Parse a wire name. Returns `None` for anything outside the closed set.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Base identity
// ─────────────────────────────────────────────────────────────────────────────

/// Identity fields shared by every message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageBase {
    /// Unique message ID.
    pub uuid: MessageId,
    /// Session this message belongs to.
    pub session_id: SessionId,
    /// Tool-use ID that caused this message, if any. Serialized as `null`
    /// when absent.
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

impl MessageBase {
    /// Fresh identity within the given session.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            uuid: MessageId::new(),
            session_id,
            parent_tool_use_id: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Variants
// ─────────────────────────────────────────────────────────────────────────────

/// `system` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// Identity.
    #[serde(flatten)]
    pub base: MessageBase,
    /// System subtype (`init`, `session_started`, `session_ended`, ...).
    #[serde(default)]
    pub subtype: String,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `user` or `assistant` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Identity.
    #[serde(flatten)]
    pub base: MessageBase,
    /// Role-tagged body.
    pub message: ApiMessage,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `result` message, printed once when a CLI invocation finishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    /// Identity.
    #[serde(flatten)]
    pub base: MessageBase,
    /// Result subtype (`success`, `error_max_turns`, ...).
    pub subtype: String,
    /// Whether the invocation ended in error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Final answer text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Number of internal turns the CLI took.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    /// Reported cost in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    /// Unmodeled fields (`usage`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `tool_use` notice message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolUseMessage {
    /// Identity.
    #[serde(flatten)]
    pub base: MessageBase,
    /// Name of the invoked tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `progress` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    /// Identity.
    #[serde(flatten)]
    pub base: MessageBase,
    /// Free-form progress note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Fraction complete, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Error payload of an `error` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// `error` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Identity.
    #[serde(flatten)]
    pub base: MessageBase,
    /// Error payload.
    pub error: ErrorBody,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A message streamed from a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// `system`
    System(SystemMessage),
    /// `user`
    User(ConversationMessage),
    /// `assistant`
    Assistant(ConversationMessage),
    /// `result`
    Result(ResultMessage),
    /// `tool_use`
    ToolUse(ToolUseMessage),
    /// `progress`
    Progress(ProgressMessage),
    /// `error`
    Error(ErrorMessage),
}

impl Message {
    /// Build a synthetic `system` message with extra fields.
    #[must_use]
    pub fn system(
        subtype: impl Into<String>,
        session_id: SessionId,
        extra: Map<String, Value>,
    ) -> Self {
        Self::System(SystemMessage {
            base: MessageBase::new(session_id),
            subtype: subtype.into(),
            extra,
        })
    }

    /// Discriminator of this message.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::System(_) => MessageType::System,
            Self::User(_) => MessageType::User,
            Self::Assistant(_) => MessageType::Assistant,
            Self::Result(_) => MessageType::Result,
            Self::ToolUse(_) => MessageType::ToolUse,
            Self::Progress(_) => MessageType::Progress,
            Self::Error(_) => MessageType::Error,
        }
    }

    /// Shared identity fields.
    #[must_use]
    pub fn base(&self) -> &MessageBase {
        match self {
            Self::System(m) => &m.base,
            Self::User(m) | Self::Assistant(m) => &m.base,
            Self::Result(m) => &m.base,
            Self::ToolUse(m) => &m.base,
            Self::Progress(m) => &m.base,
            Self::Error(m) => &m.base,
        }
    }

    /// Mutable identity fields.
    pub fn base_mut(&mut self) -> &mut MessageBase {
        match self {
            Self::System(m) => &mut m.base,
            Self::User(m) | Self::Assistant(m) => &mut m.base,
            Self::Result(m) => &mut m.base,
            Self::ToolUse(m) => &mut m.base,
            Self::Progress(m) => &mut m.base,
            Self::Error(m) => &mut m.base,
        }
    }

    /// Message ID.
    #[must_use]
    pub fn uuid(&self) -> &MessageId {
        &self.base().uuid
    }

    /// Session ID.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.base().session_id
    }

    /// `system` subtype, when this is a system message.
    #[must_use]
    pub fn system_subtype(&self) -> Option<&str> {
        match self {
            Self::System(m) => Some(&m.subtype),
            _ => None,
        }
    }

    /// Concatenated text of an assistant message; `None` for other types.
    #[must_use]
    pub fn assistant_text(&self) -> Option<String> {
        match self {
            Self::Assistant(m) => Some(m.message.content.text()),
            _ => None,
        }
    }

    /// Final text carried by a `result` message.
    #[must_use]
    pub fn result_text(&self) -> Option<&str> {
        match self {
            Self::Result(m) => m.result.as_deref(),
            _ => None,
        }
    }

    /// Body of a `user`/`assistant` message.
    #[must_use]
    pub fn content(&self) -> Option<&MessageContent> {
        match self {
            Self::User(m) | Self::Assistant(m) => Some(&m.message.content),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn base_json() -> Value {
        json!({"uuid": "m-1", "session_id": "s-1", "parent_tool_use_id": null})
    }

    fn with_base(mut v: Value) -> Value {
        for (k, val) in base_json().as_object().unwrap() {
            let _ = v.as_object_mut().unwrap().insert(k.clone(), val.clone());
        }
        v
    }

    #[test]
    fn type_names_roundtrip() {
        for t in MessageType::ALL {
            assert_eq!(MessageType::parse(t.as_str()), Some(t));
        }
        assert_eq!(MessageType::parse("stream_event"), None);
    }

    #[test]
    fn deserializes_result() {
        let msg: Message = serde_json::from_value(with_base(json!({
            "type": "result",
            "subtype": "success",
            "result": "done",
            "num_turns": 2,
            "usage": {"input_tokens": 3}
        })))
        .unwrap();
        assert_eq!(msg.message_type(), MessageType::Result);
        assert_eq!(msg.result_text(), Some("done"));
        assert_matches!(&msg, Message::Result(r) if r.extra["usage"]["input_tokens"] == 3);
    }

    #[test]
    fn deserializes_assistant_text() {
        let msg: Message = serde_json::from_value(with_base(json!({
            "type": "assistant",
            "message": {"role": "assistant", "content": [{"type": "text", "text": "hi"}]}
        })))
        .unwrap();
        assert_eq!(msg.assistant_text().as_deref(), Some("hi"));
        assert_eq!(msg.uuid().as_str(), "m-1");
        assert_eq!(msg.session_id().as_str(), "s-1");
    }

    #[test]
    fn serializes_null_parent() {
        let msg = Message::system("session_started", SessionId::from("s-9"), Map::new());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "system");
        assert_eq!(json["subtype"], "session_started");
        assert!(json["parent_tool_use_id"].is_null());
        assert!(json.as_object().unwrap().contains_key("parent_tool_use_id"));
    }

    #[test]
    fn extra_fields_survive_roundtrip() {
        let raw = with_base(json!({
            "type": "system",
            "subtype": "init",
            "tools": ["Bash"],
            "model": "claude"
        }));
        let msg: Message = serde_json::from_value(raw.clone()).unwrap();
        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn error_message_body() {
        let msg: Message = serde_json::from_value(with_base(json!({
            "type": "error",
            "error": {"code": "E", "message": "bad"}
        })))
        .unwrap();
        assert_matches!(msg, Message::Error(e) if e.error.code == "E");
    }

    #[test]
    fn base_mut_updates_identity() {
        let mut msg = Message::system("x", SessionId::from("a"), Map::new());
        msg.base_mut().session_id = SessionId::from("b");
        assert_eq!(msg.session_id().as_str(), "b");
        assert_eq!(msg.system_subtype(), Some("x"));
    }
}
