//! Tool error types.
//!
//! These never escape [`execute_tool`](crate::execute_tool), which folds them
//! into `isError` results. They surface from the MCP transport and from
//! callers that want the typed failure.

use harbor_core::HarborError;
use thiserror::Error;

use crate::validate::ValidationErrors;

/// Errors around tool definitions and the MCP surface.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Input did not match the tool's schema.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationErrors),

    /// No tool with that name.
    #[error("unknown tool: {0}")]
    NotFound(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing the MCP transport failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ToolError> for HarborError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Validation(errors) => HarborError::Validation(errors.to_string()),
            ToolError::NotFound(name) => HarborError::Tool {
                message: format!("Unknown tool: {name}"),
                tool_name: name,
            },
            other => HarborError::wrap(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::ValidationIssue;
    use harbor_core::ErrorKind;

    #[test]
    fn kinds_map_onto_harbor_errors() {
        let validation = ToolError::Validation(ValidationErrors(vec![ValidationIssue {
            path: "a".into(),
            message: "Required".into(),
        }]));
        let err: HarborError = validation.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "validation error: a: Required");

        let err: HarborError = ToolError::NotFound("nope".into()).into();
        assert_eq!(err.kind(), ErrorKind::Tool);
    }
}
