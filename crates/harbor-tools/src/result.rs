//! Uniform tool results.
//!
//! The wire shape matches MCP `tools/call` results: a list of content blocks
//! plus an `isError` flag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One content block of a tool result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64 image.
    Image {
        /// Base64 data.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Embedded resource.
    Resource {
        /// Resource payload.
        resource: Value,
    },
}

/// Result of running a tool.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Content blocks.
    pub content: Vec<ToolContent>,
    /// Whether the call failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Text blocks joined by newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Successful plain-text result.
pub fn text_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![ToolContent::Text { text: text.into() }],
        is_error: false,
    }
}

/// Successful result holding pretty-printed JSON.
///
/// A value that cannot be serialized becomes an error result.
pub fn json_result<T: Serialize + ?Sized>(value: &T) -> ToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(text) => text_result(text),
        Err(e) => error_result(format!("Failed to serialize result: {e}")),
    }
}

/// Failed result with a message.
pub fn error_result(message: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![ToolContent::Text {
            text: message.into(),
        }],
        is_error: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_is_mcp() {
        let result = error_result("boom");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"content": [{"type": "text", "text": "boom"}], "isError": true})
        );
        let image = ToolContent::Image {
            data: "AAA=".into(),
            mime_type: "image/png".into(),
        };
        assert_eq!(serde_json::to_value(&image).unwrap()["mimeType"], "image/png");
    }

    #[test]
    fn json_result_is_pretty() {
        let result = json_result(&json!({"sum": 3}));
        assert!(!result.is_error);
        assert_eq!(result.text(), "{\n  \"sum\": 3\n}");
    }

    #[test]
    fn missing_is_error_defaults_false() {
        let result: ToolResult =
            serde_json::from_value(json!({"content": [{"type": "text", "text": "ok"}]})).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "ok");
    }
}
