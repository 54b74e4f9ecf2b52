//! # harbor-tools
//!
//! User-supplied tools the driven CLI can ask Harbor to run.
//!
//! - **Schema capability**: [`SchemaNode`] abstracts over schema sources; the
//!   native [`Schema`] builder and raw JSON-Schema documents
//!   ([`JsonSchemaNode`]) both implement it
//! - **Validation**: [`validate`] checks input and applies defaults
//! - **Projection**: [`to_json_schema`] renders any schema as JSON Schema
//! - **Execution**: [`execute_tool`] never fails; validation and handler
//!   errors come back as `isError` results
//! - **Registry**: [`ToolRegistry`] indexes tools by name
//! - **MCP**: [`McpServer`] exposes a registry over JSON-RPC 2.0

#![deny(unsafe_code)]

pub mod definition;
pub mod errors;
pub mod execute;
pub mod json_schema;
pub mod mcp;
pub mod registry;
pub mod result;
pub mod schema;
pub mod validate;

pub use definition::{HandlerError, ToolDefinition, ToolHandler, ToolSchema};
pub use errors::ToolError;
pub use execute::execute_tool;
pub use json_schema::to_json_schema;
pub use mcp::McpServer;
pub use registry::ToolRegistry;
pub use result::{ToolContent, ToolResult, error_result, json_result, text_result};
pub use schema::{JsonSchemaNode, Schema, SchemaKind, SchemaNode, SchemaType};
pub use validate::{ValidationErrors, ValidationIssue, validate};
