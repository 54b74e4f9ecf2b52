//! Tool registry: ordered index of tool definitions by name.
//!
//! The orchestrator builds one per run from the caller's tool list and uses
//! it to dispatch extracted calls. [`McpServer`](crate::McpServer) serves one
//! over JSON-RPC.

use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::definition::ToolDefinition;
use crate::errors::ToolError;
use crate::execute::execute_tool;
use crate::result::{ToolResult, error_result};

/// Tools keyed by name, in registration order.
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: ToolDefinition) {
        let name = tool.name.clone();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool_name = %name, "tool replaced");
        } else {
            debug!(tool_name = %name, "tool registered");
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// Look up a tool by name, failing when it is missing.
    pub fn require(&self, name: &str) -> Result<&ToolDefinition, ToolError> {
        self.get(name).ok_or_else(|| ToolError::NotFound(name.to_owned()))
    }

    /// All tools in registration order.
    pub fn list(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether a tool with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Remove a tool by name, returning it if it existed.
    pub fn remove(&mut self, name: &str) -> Option<ToolDefinition> {
        self.tools.shift_remove(name)
    }

    /// Run the named tool. Unknown names produce an `isError` result.
    pub async fn call(&self, name: &str, input: &Value) -> ToolResult {
        match self.require(name) {
            Ok(tool) => execute_tool(tool, input).await,
            Err(e) => {
                debug!(error = %e, "call to unregistered tool");
                error_result(format!("Unknown tool: {name}"))
            }
        }
    }

    /// MCP `tools/list` entries.
    pub fn descriptors(&self) -> Vec<Value> {
        self.list()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect()
    }
}

impl FromIterator<ToolDefinition> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = ToolDefinition>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::text_result;
    use crate::schema::Schema;
    use assert_matches::assert_matches;

    fn stub(name: &str, reply: &'static str) -> ToolDefinition {
        ToolDefinition::new(
            name,
            format!("Stub {name}"),
            Schema::object([("q", Schema::string().optional())]),
            move |_: Value| async move { Ok(text_result(reply)) },
        )
    }

    #[test]
    fn keeps_registration_order() {
        let registry: ToolRegistry = [stub("zeta", ""), stub("alpha", ""), stub("mid", "")]
            .into_iter()
            .collect();
        assert_eq!(registry.names(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(stub("a", "first"));
        registry.register(stub("a", "second"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_and_contains() {
        let mut registry: ToolRegistry = [stub("a", ""), stub("b", "")].into_iter().collect();
        assert!(registry.remove("a").is_some());
        assert!(!registry.contains("a"));
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.names(), vec!["b"]);
    }

    #[test]
    fn require_reports_missing() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_matches!(registry.require("nope"), Err(ToolError::NotFound(name)) if name == "nope");
    }

    #[tokio::test]
    async fn call_dispatches_and_reports_unknown() {
        let mut registry = ToolRegistry::new();
        registry.register(stub("a", "first"));
        registry.register(stub("a", "second"));
        assert_eq!(registry.call("a", &serde_json::json!({})).await.text(), "second");

        let missing = registry.call("nope", &serde_json::json!({})).await;
        assert!(missing.is_error);
        assert_eq!(missing.text(), "Unknown tool: nope");
    }

    #[test]
    fn descriptors_carry_input_schema() {
        let registry: ToolRegistry = [stub("a", "")].into_iter().collect();
        let descriptors = registry.descriptors();
        assert_eq!(descriptors[0]["name"], "a");
        assert_eq!(descriptors[0]["description"], "Stub a");
        assert_eq!(descriptors[0]["inputSchema"]["type"], "object");
    }
}
