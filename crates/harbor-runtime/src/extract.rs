//! Tool requests embedded in assistant text.
//!
//! The model asks for a tool by writing a JSON object with a `tool` string
//! and an optional `input` object. Two forms are recognized:
//!
//! 1. a fenced code block whose whole body is such an object;
//! 2. failing any fenced request, such an object written inline on one line.
//!
//! Matches are returned in order of appearance. Anything that does not parse
//! as that exact shape is ignored.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[\w-]*[ \t]*\r?\n?(.*?)```").expect("fenced block pattern is valid")
});

static TOOL_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""tool"\s*:"#).expect("tool key pattern is valid"));

/// A tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Tool name.
    pub tool: String,
    /// Tool input; `{}` when omitted.
    pub input: Value,
}

/// Extract every tool request from `text`, in order.
pub fn extract_tool_requests(text: &str) -> Vec<ToolRequest> {
    let fenced: Vec<ToolRequest> = FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| serde_json::from_str(body.as_str().trim()).ok())
        .filter_map(request_from_value)
        .collect();
    if !fenced.is_empty() {
        return fenced;
    }

    text.lines()
        .filter(|line| TOOL_KEY.is_match(line))
        .flat_map(inline_requests)
        .collect()
}

fn request_from_value(value: Value) -> Option<ToolRequest> {
    let Value::Object(mut map) = value else {
        return None;
    };
    let tool = match map.remove("tool")? {
        Value::String(name) if !name.trim().is_empty() => name,
        _ => return None,
    };
    let input = match map.remove("input") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(input @ Value::Object(_)) => input,
        Some(_) => return None,
    };
    Some(ToolRequest { tool, input })
}

/// Top-level JSON objects on one line that are tool requests.
fn inline_requests(line: &str) -> Vec<ToolRequest> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(pos) = line[offset..].find('{') {
        let start = offset + pos;
        let mut values = serde_json::Deserializer::from_str(&line[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                // Skip the whole object so nested objects are never matched.
                offset = start + values.byte_offset();
                if let Some(request) = request_from_value(value) {
                    found.push(request);
                }
            }
            _ => offset = start + 1,
        }
    }
    found
}
