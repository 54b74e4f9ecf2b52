//! Message validation and enrichment.
//!
//! Raw values from the CLI are gated on the closed message-type set, then
//! have their identity fields filled and per-type defaults applied before
//! being deserialized into a [`Message`].

use futures::{Stream, StreamExt};
use harbor_core::ids::{MessageId, SessionId};
use harbor_core::text::truncate_str;
use harbor_core::{LineErrorPolicy, Message, MessageType};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::errors::StreamError;

/// Bytes of an offending line included in skip warnings.
const LOG_PREVIEW_BYTES: usize = 200;

fn structural(reason: impl Into<String>, value: &Value) -> StreamError {
    StreamError::Structural {
        reason: reason.into(),
        value: value.to_string(),
    }
}

fn is_string(obj: &Map<String, Value>, key: &str) -> bool {
    matches!(obj.get(key), Some(Value::String(_)))
}

fn is_absent(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).is_none_or(Value::is_null)
}

/// Validate and enrich one parsed value.
///
/// Existing string identity fields are kept. A missing or non-string `uuid`
/// gets a fresh UUID v4; a missing `session_id` takes `current_session`, or a
/// freshly generated one; `parent_tool_use_id` becomes `null` unless it is a
/// string. Anything outside the closed type set is a
/// [`StreamError::Structural`].
pub fn enrich_message(
    value: Value,
    current_session: Option<&SessionId>,
) -> Result<Message, StreamError> {
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => return Err(structural("message must be a JSON object", &other)),
    };

    let kind = match obj.get("type") {
        Some(Value::String(name)) => match MessageType::parse(name) {
            Some(kind) => kind,
            None => {
                let reason = format!("unknown message type '{name}'");
                return Err(structural(reason, &Value::Object(obj)));
            }
        },
        Some(_) => return Err(structural("message type must be a string", &Value::Object(obj))),
        None => return Err(structural("message has no type", &Value::Object(obj))),
    };

    if !is_string(&obj, "uuid") {
        let _ = obj.insert("uuid".into(), Value::String(MessageId::new().into_inner()));
    }
    if !is_string(&obj, "session_id") {
        let session = current_session.cloned().unwrap_or_default();
        let _ = obj.insert("session_id".into(), Value::String(session.into_inner()));
    }
    if !is_string(&obj, "parent_tool_use_id") {
        let _ = obj.insert("parent_tool_use_id".into(), Value::Null);
    }

    match kind {
        MessageType::User | MessageType::Assistant if is_absent(&obj, "message") => {
            let _ = obj.insert(
                "message".into(),
                json!({"role": kind.as_str(), "content": []}),
            );
        }
        MessageType::Result if is_absent(&obj, "subtype") => {
            let _ = obj.insert("subtype".into(), Value::String("success".into()));
        }
        MessageType::Error if is_absent(&obj, "error") => {
            let _ = obj.insert(
                "error".into(),
                json!({"code": "UNKNOWN_ERROR", "message": "Unknown error occurred"}),
            );
        }
        _ => {}
    }

    let value = Value::Object(obj);
    Message::deserialize(&value)
        .map_err(|e| structural(format!("invalid {kind} message: {e}"), &value))
}

/// Enrich a stream of parsed lines under a [`LineErrorPolicy`].
///
/// With [`LineErrorPolicy::Skip`], malformed and unrecognized lines are logged
/// and dropped. With [`LineErrorPolicy::Fail`] they are yielded as errors and
/// the caller is expected to stop reading. Read errors are always yielded.
pub fn enrich_stream<S>(
    lines: S,
    session_id: SessionId,
    policy: LineErrorPolicy,
) -> impl Stream<Item = Result<Message, StreamError>>
where
    S: Stream<Item = Result<Value, StreamError>>,
{
    lines.filter_map(move |line| {
        let enriched = line.and_then(|value| enrich_message(value, Some(&session_id)));
        let item = match enriched {
            Ok(message) => Some(Ok(message)),
            Err(err) if err.is_line_anomaly() && policy == LineErrorPolicy::Skip => {
                let preview = err.raw().map(|raw| truncate_str(raw, LOG_PREVIEW_BYTES));
                warn!(
                    session_id = %session_id,
                    error = %err,
                    line = preview.unwrap_or_default(),
                    "skipping malformed stream line"
                );
                None
            }
            Err(err) => Some(Err(err)),
        };
        futures::future::ready(item)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
