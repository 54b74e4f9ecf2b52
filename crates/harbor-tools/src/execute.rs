//! Non-failing tool execution.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::definition::ToolDefinition;
use crate::result::{ToolResult, error_result};
use crate::validate::validate;

/// Validate `input` and run the tool's handler.
///
/// Never fails. Schema mismatches produce an `isError` result whose text is
/// `Validation error: <path>: <reason>, ...`; handler errors and panics
/// produce an `isError` result carrying the handler's message. A successful
/// handler result is returned unchanged.
#[instrument(skip_all, fields(tool_name = %tool.name))]
pub async fn execute_tool(tool: &ToolDefinition, input: &Value) -> ToolResult {
    let validated = match validate(tool.schema.root().as_ref(), input) {
        Ok(value) => value,
        Err(errors) => {
            debug!(issues = errors.issues().len(), "tool input failed validation");
            return error_result(format!("Validation error: {errors}"));
        }
    };

    let call = AssertUnwindSafe(tool.handler().call(validated)).catch_unwind();
    match call.await {
        Ok(Ok(result)) => {
            debug!(is_error = result.is_error, "tool finished");
            result
        }
        Ok(Err(e)) => {
            warn!(error = %e, "tool handler failed");
            error_result(format!("Tool execution failed: {e}"))
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            warn!(panic = %message, "tool handler panicked");
            error_result(format!("Tool execution failed: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::HandlerError;
    use crate::result::{json_result, text_result};
    use crate::schema::Schema;
    use proptest::prelude::*;
    use serde_json::json;

    fn calculator() -> ToolDefinition {
        ToolDefinition::new(
            "add",
            "Add two numbers",
            Schema::object([("a", Schema::number()), ("b", Schema::number())]),
            |input: Value| async move {
                let a = input["a"].as_f64().unwrap_or_default();
                let b = input["b"].as_f64().unwrap_or_default();
                Ok(json_result(&json!({"sum": a + b})))
            },
        )
    }

    #[tokio::test]
    async fn calculator_validation_error() {
        let result = execute_tool(&calculator(), &json!({"a": "x", "b": 3})).await;
        assert!(result.is_error);
        let text = result.text();
        assert!(text.contains("Validation error"), "{text}");
        assert!(text.contains("a: Expected number"), "{text}");
    }

    #[tokio::test]
    async fn handler_result_passes_through() {
        let result = execute_tool(&calculator(), &json!({"a": 1, "b": 2})).await;
        assert_eq!(result, json_result(&json!({"sum": 3.0})));
    }

    #[tokio::test]
    async fn handler_error_is_folded() {
        let tool = ToolDefinition::new("fail", "", Schema::any(), |_: Value| async move {
            Err::<ToolResult, HandlerError>("disk on fire".into())
        });
        let result = execute_tool(&tool, &json!({})).await;
        assert!(result.is_error);
        assert!(result.text().contains("disk on fire"));
    }

    #[tokio::test]
    async fn handler_panic_is_folded() {
        let tool = ToolDefinition::new("panic", "", Schema::any(), |_: Value| async move {
            if true {
                panic!("kaboom");
            }
            Ok(text_result("unreachable"))
        });
        let result = execute_tool(&tool, &json!(null)).await;
        assert!(result.is_error);
        assert!(result.text().contains("kaboom"));
    }

    #[tokio::test]
    async fn defaults_reach_handler() {
        let tool = ToolDefinition::new(
            "cfg",
            "",
            Schema::object([("verbose", Schema::boolean().with_default(true))]),
            |input: Value| async move { Ok(text_result(input["verbose"].to_string())) },
        );
        assert_eq!(execute_tool(&tool, &json!({})).await.text(), "true");
    }

    proptest! {
        #[test]
        fn non_numeric_input_never_panics(a in "[a-z]{0,8}", b in proptest::option::of(any::<bool>())) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let input = json!({"a": a, "b": b});
            let result = rt.block_on(execute_tool(&calculator(), &input));
            prop_assert!(result.is_error);
            prop_assert!(result.text().starts_with("Validation error"));
        }
    }
}
