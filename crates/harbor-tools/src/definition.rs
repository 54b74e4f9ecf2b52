//! Tool definitions: name, description, input schema, and handler.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::json_schema::to_json_schema;
use crate::result::ToolResult;
use crate::schema::{JsonSchemaNode, Schema, SchemaNode};

/// Error type handlers may return. Anything implementing `Error` converts
/// with `?`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Runs a tool on validated input.
///
/// Implemented for any `Fn(Value) -> impl Future<Output = Result<ToolResult,
/// HandlerError>>`, so closures work directly.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Handle one call.
    async fn call(&self, input: Value) -> Result<ToolResult, HandlerError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolResult, HandlerError>> + Send,
{
    async fn call(&self, input: Value) -> Result<ToolResult, HandlerError> {
        (self)(input).await
    }
}

/// Where a tool's input schema comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolSchema {
    /// Built with [`Schema`].
    Native(Schema),
    /// Imported JSON-Schema document.
    Json(Value),
}

impl ToolSchema {
    /// Root node for validation and projection.
    #[must_use]
    pub fn root(&self) -> Box<dyn SchemaNode + '_> {
        match self {
            Self::Native(schema) => Box::new(schema.clone()),
            Self::Json(doc) => Box::new(JsonSchemaNode::new(doc)),
        }
    }
}

impl From<Schema> for ToolSchema {
    fn from(schema: Schema) -> Self {
        Self::Native(schema)
    }
}

impl From<Value> for ToolSchema {
    fn from(doc: Value) -> Self {
        Self::Json(doc)
    }
}

/// A named, schema-validated tool.
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique name.
    pub name: String,
    /// What the tool does, shown to the model.
    pub description: String,
    /// Input schema.
    pub schema: ToolSchema,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    /// Define a tool whose handler receives the validated JSON input.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: impl Into<ToolSchema>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, HandlerError>> + Send + 'static,
    {
        Self::with_handler(name, description, schema, handler)
    }

    /// Define a tool backed by any [`ToolHandler`] implementation.
    pub fn with_handler<H>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: impl Into<ToolSchema>,
        handler: H,
    ) -> Self
    where
        H: ToolHandler + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: schema.into(),
            handler: Arc::new(handler),
        }
    }

    /// Define a tool whose handler receives the validated input deserialized
    /// into `T`.
    pub fn typed<T, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: impl Into<ToolSchema>,
        handler: F,
    ) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(name, description, schema, move |input: Value| {
            let handler = Arc::clone(&handler);
            async move {
                let typed: T = serde_json::from_value(input)?;
                handler(typed).await
            }
        })
    }

    /// Handler.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn ToolHandler> {
        &self.handler
    }

    /// Input schema as JSON Schema.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        to_json_schema(self.schema.root().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::text_result;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Greet {
        name: String,
    }

    #[tokio::test]
    async fn closure_handlers() {
        let tool = ToolDefinition::new(
            "echo",
            "Echo input",
            Schema::any(),
            |input: Value| async move { Ok(text_result(input.to_string())) },
        );
        let result = tool.handler().call(json!({"x": 1})).await.unwrap();
        assert_eq!(result.text(), r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn typed_handlers_deserialize() {
        let tool = ToolDefinition::typed(
            "greet",
            "Say hello",
            Schema::object([("name", Schema::string())]),
            |input: Greet| async move { Ok(text_result(format!("hello {}", input.name))) },
        );
        let result = tool.handler().call(json!({"name": "ada"})).await.unwrap();
        assert_eq!(result.text(), "hello ada");
        assert!(tool.handler().call(json!({"name": 3})).await.is_err());
    }

    struct Counter(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl ToolHandler for Counter {
        async fn call(&self, _input: Value) -> Result<ToolResult, HandlerError> {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            Ok(text_result(n.to_string()))
        }
    }

    #[tokio::test]
    async fn trait_handlers() {
        let tool = ToolDefinition::with_handler(
            "count",
            "Count calls",
            Schema::any(),
            Counter(std::sync::atomic::AtomicUsize::new(0)),
        );
        let _ = tool.handler().call(Value::Null).await.unwrap();
        let second = tool.handler().call(Value::Null).await.unwrap();
        assert_eq!(second.text(), "2");
    }

    #[test]
    fn input_schema_from_either_source() {
        let native = ToolDefinition::new(
            "a",
            "",
            Schema::object([("q", Schema::string())]),
            |_: Value| async move { Ok(text_result("")) },
        );
        let doc = json!({"type": "object", "properties": {"q": {"type": "string"}}, "required": ["q"]});
        let imported = ToolDefinition::new("b", "", doc.clone(), |_: Value| async move {
            Ok(text_result(""))
        });
        assert_eq!(native.input_schema(), doc);
        assert_eq!(imported.input_schema(), doc);
    }
}
