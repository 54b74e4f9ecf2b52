//! Content blocks carried inside `user` and `assistant` messages.
//!
//! The driven CLI emits Anthropic-style message bodies: `role` plus either a
//! plain string or an array of typed blocks. Unknown block types deserialize
//! to [`ContentBlock::Unknown`] with their raw payload, so a new upstream block
//! never breaks a stream and re-serializes unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single typed block inside a message body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Extended-thinking text.
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Verification signature.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Native tool invocation made inside the sandboxed CLI.
    ToolUse {
        /// Tool call ID.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input.
        #[serde(default)]
        input: Value,
    },
    /// Result of a native tool invocation.
    ToolResult {
        /// ID of the tool call this result answers.
        tool_use_id: String,
        /// Result payload (string or nested blocks).
        #[serde(default)]
        content: Value,
        /// Whether the tool errored.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Any block this crate does not model, kept verbatim.
    #[serde(untagged)]
    Unknown(Value),
}

impl ContentBlock {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text of this block, if it is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Body of a message: a bare string or a list of blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain string body.
    Text(String),
    /// Structured blocks.
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Blocks(Vec::new())
    }
}

impl MessageContent {
    /// Concatenate all text in the body, joining blocks with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Whether the body holds no content at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

/// The `message` payload of a `user` or `assistant` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Message body.
    #[serde(default)]
    pub content: MessageContent,
    /// Provider fields not modeled here (`id`, `model`, `usage`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiMessage {
    /// Create an empty body for the given role.
    #[must_use]
    pub fn empty(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: MessageContent::default(),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_block_serde() {
        let block = ContentBlock::text("hi");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json, json!({"type": "text", "text": "hi"}));
    }

    #[test]
    fn unknown_block_type_is_tolerated() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "server_tool_use", "id": "x"})).unwrap();
        assert_eq!(block, ContentBlock::Unknown(json!({"type": "server_tool_use", "id": "x"})));
    }

    #[test]
    fn unknown_block_reserializes_its_payload() {
        let raw = json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "searching"},
                {"type": "web_search_result", "url": "https://example.com", "rank": 1}
            ]
        });
        let msg: ApiMessage = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(msg.content.text(), "searching");
        assert_eq!(serde_json::to_value(&msg).unwrap(), raw);
    }

    #[test]
    fn tool_use_block_defaults_input() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "tool_use", "id": "t1", "name": "Bash"})).unwrap();
        match block {
            ContentBlock::ToolUse { input, .. } => assert!(input.is_null()),
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn content_accepts_plain_string() {
        let msg: ApiMessage =
            serde_json::from_value(json!({"role": "user", "content": "hello"})).unwrap();
        assert_eq!(msg.content, MessageContent::Text("hello".into()));
        assert_eq!(msg.content.text(), "hello");
    }

    #[test]
    fn content_text_joins_text_blocks_only() {
        let content = MessageContent::Blocks(vec![
            ContentBlock::text("one"),
            ContentBlock::Thinking {
                thinking: "hmm".into(),
                signature: None,
            },
            ContentBlock::text("two"),
        ]);
        assert_eq!(content.text(), "one\ntwo");
    }

    #[test]
    fn api_message_keeps_extra_fields() {
        let msg: ApiMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": [],
            "model": "claude-x",
            "id": "msg_1"
        }))
        .unwrap();
        assert_eq!(msg.extra["model"], "claude-x");
        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["id"], "msg_1");
    }

    #[test]
    fn empty_body_has_role_and_no_content() {
        let msg = ApiMessage::empty("assistant");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"role": "assistant", "content": []}));
    }
}
