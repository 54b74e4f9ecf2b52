//! Schema capability interface and its two adapters.
//!
//! Validation and JSON-Schema projection never look at a concrete schema
//! representation. They walk a [`SchemaNode`], which reports its
//! [`SchemaKind`] with children already unwrapped, plus the modifiers
//! (description, default, optional, nullable) that sit around it.

use indexmap::IndexMap;
use serde_json::Value;

/// Structural kind of a schema node, with child nodes.
pub enum SchemaKind<'a> {
    /// Any string.
    String,
    /// A number; `integer` restricts to whole numbers.
    Number {
        /// Whole numbers only.
        integer: bool,
    },
    /// `true` or `false`.
    Boolean,
    /// Homogeneous array.
    Array(Box<dyn SchemaNode + 'a>),
    /// Object with named properties, in declaration order.
    Object(Vec<(String, Box<dyn SchemaNode + 'a>)>),
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    /// Exactly this value.
    Literal(Value),
    /// Any one of several schemas.
    Union(Vec<Box<dyn SchemaNode + 'a>>),
    /// Object with arbitrary keys and uniform values.
    Record(Box<dyn SchemaNode + 'a>),
    /// Anything.
    Any,
}

impl SchemaKind<'_> {
    /// Short name used in validation messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Number { .. } => "number",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
            Self::Object(_) | Self::Record(_) => "object",
            Self::Literal(_) => "literal",
            Self::Union(_) => "union",
            Self::Any => "any",
        }
    }
}

/// Read access to one node of a schema tree.
pub trait SchemaNode: Send + Sync {
    /// Structural kind.
    fn kind(&self) -> SchemaKind<'_>;
    /// Human-readable description.
    fn description(&self) -> Option<String>;
    /// Value used when the input omits this node.
    fn default_value(&self) -> Option<Value>;
    /// Whether the node may be omitted. Nodes with a default are optional.
    fn is_optional(&self) -> bool;
    /// Whether `null` is accepted.
    fn is_nullable(&self) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// Native schema builder
// ─────────────────────────────────────────────────────────────────────────────

/// Type of a native [`Schema`].
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaType {
    /// String.
    String,
    /// Floating-point number.
    Number,
    /// Whole number.
    Integer,
    /// Boolean.
    Boolean,
    /// Array of the inner schema.
    Array(Box<Schema>),
    /// Object with ordered properties.
    Object(IndexMap<String, Schema>),
    /// String enumeration.
    Enum(Vec<String>),
    /// Constant.
    Literal(Value),
    /// Alternatives.
    Union(Vec<Schema>),
    /// String-keyed map of the inner schema.
    Record(Box<Schema>),
    /// Unconstrained.
    Any,
}

/// A schema built in code.
///
/// ```ignore
/// let schema = Schema::object([
///     ("a", Schema::number().describe("left operand")),
///     ("b", Schema::number()),
///     ("op", Schema::enumeration(["add", "sub"]).with_default("add")),
/// ]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    ty: SchemaType,
    description: Option<String>,
    default: Option<Value>,
    optional: bool,
    nullable: bool,
}

impl Schema {
    fn of(ty: SchemaType) -> Self {
        Self {
            ty,
            description: None,
            default: None,
            optional: false,
            nullable: false,
        }
    }

    /// String schema.
    #[must_use]
    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    /// Number schema.
    #[must_use]
    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    /// Integer schema.
    #[must_use]
    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    /// Boolean schema.
    #[must_use]
    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    /// Array schema.
    #[must_use]
    pub fn array(items: Schema) -> Self {
        Self::of(SchemaType::Array(Box::new(items)))
    }

    /// Object schema from `(name, schema)` pairs.
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        Self::of(SchemaType::Object(
            properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// String enumeration.
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(SchemaType::Enum(values.into_iter().map(Into::into).collect()))
    }

    /// Constant value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::of(SchemaType::Literal(value.into()))
    }

    /// Any of the given schemas.
    #[must_use]
    pub fn union(options: Vec<Schema>) -> Self {
        Self::of(SchemaType::Union(options))
    }

    /// Map with string keys.
    #[must_use]
    pub fn record(values: Schema) -> Self {
        Self::of(SchemaType::Record(Box::new(values)))
    }

    /// Anything.
    #[must_use]
    pub fn any() -> Self {
        Self::of(SchemaType::Any)
    }

    /// Attach a description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a default, which also makes the node optional.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Allow the node to be omitted.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Accept `null`.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// The schema's type.
    #[must_use]
    pub fn schema_type(&self) -> &SchemaType {
        &self.ty
    }
}

fn boxed<'a>(node: &'a (dyn SchemaNode + 'a)) -> Box<dyn SchemaNode + 'a> {
    Box::new(NodeRef(node))
}

/// Borrowing wrapper so child nodes can be handed out as boxes.
struct NodeRef<'a>(&'a (dyn SchemaNode + 'a));

impl SchemaNode for NodeRef<'_> {
    fn kind(&self) -> SchemaKind<'_> {
        self.0.kind()
    }
    fn description(&self) -> Option<String> {
        self.0.description()
    }
    fn default_value(&self) -> Option<Value> {
        self.0.default_value()
    }
    fn is_optional(&self) -> bool {
        self.0.is_optional()
    }
    fn is_nullable(&self) -> bool {
        self.0.is_nullable()
    }
}

impl SchemaNode for Schema {
    fn kind(&self) -> SchemaKind<'_> {
        match &self.ty {
            SchemaType::String => SchemaKind::String,
            SchemaType::Number => SchemaKind::Number { integer: false },
            SchemaType::Integer => SchemaKind::Number { integer: true },
            SchemaType::Boolean => SchemaKind::Boolean,
            SchemaType::Array(items) => SchemaKind::Array(boxed(items.as_ref())),
            SchemaType::Object(props) => SchemaKind::Object(
                props
                    .iter()
                    .map(|(name, schema)| (name.clone(), boxed(schema)))
                    .collect(),
            ),
            SchemaType::Enum(values) => SchemaKind::Enum(values.clone()),
            SchemaType::Literal(value) => SchemaKind::Literal(value.clone()),
            SchemaType::Union(options) => {
                SchemaKind::Union(options.iter().map(|s| boxed(s)).collect())
            }
            SchemaType::Record(values) => SchemaKind::Record(boxed(values.as_ref())),
            SchemaType::Any => SchemaKind::Any,
        }
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }

    fn default_value(&self) -> Option<Value> {
        self.default.clone()
    }

    fn is_optional(&self) -> bool {
        self.optional || self.default.is_some()
    }

    fn is_nullable(&self) -> bool {
        self.nullable
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON-Schema adapter
// ─────────────────────────────────────────────────────────────────────────────

/// A node of a raw JSON-Schema document.
///
/// Supports the subset tool definitions use in practice: `type` (string or
/// array with `"null"`), `properties`/`required`, `items`,
/// `additionalProperties`, `enum`, `const`, `anyOf`/`oneOf`, `nullable`,
/// `description` and `default`.
#[derive(Clone, Copy, Debug)]
pub struct JsonSchemaNode<'a> {
    schema: &'a Value,
    optional: bool,
}

impl<'a> JsonSchemaNode<'a> {
    /// Root node of a document.
    #[must_use]
    pub fn new(schema: &'a Value) -> Self {
        Self {
            schema,
            optional: false,
        }
    }

    fn child(schema: &'a Value, optional: bool) -> Box<dyn SchemaNode + 'a> {
        Box::new(Self { schema, optional })
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.schema.get(key)
    }

    /// Declared type name, ignoring a `"null"` member of a type array.
    fn type_name(&self) -> Option<&'a str> {
        match self.get("type")? {
            Value::String(name) => Some(name),
            Value::Array(names) => names
                .iter()
                .filter_map(Value::as_str)
                .find(|name| *name != "null"),
            _ => None,
        }
    }

    fn object_kind(&self) -> SchemaKind<'a> {
        if let Some(Value::Object(props)) = self.get("properties") {
            let required: Vec<&str> = self
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            return SchemaKind::Object(
                props
                    .iter()
                    .map(|(name, schema)| {
                        let optional = !required.contains(&name.as_str());
                        (name.clone(), Self::child(schema, optional))
                    })
                    .collect(),
            );
        }
        match self.get("additionalProperties") {
            Some(values @ Value::Object(_)) => SchemaKind::Record(Self::child(values, false)),
            _ => SchemaKind::Object(Vec::new()),
        }
    }
}

impl SchemaNode for JsonSchemaNode<'_> {
    fn kind(&self) -> SchemaKind<'_> {
        if let Some(Value::Array(values)) = self.get("enum") {
            if values.iter().all(Value::is_string) {
                return SchemaKind::Enum(
                    values.iter().filter_map(Value::as_str).map(String::from).collect(),
                );
            }
            return SchemaKind::Union(
                values
                    .iter()
                    .map(|v| Box::new(LiteralNode(v.clone())) as Box<dyn SchemaNode>)
                    .collect(),
            );
        }
        if let Some(value) = self.get("const") {
            return SchemaKind::Literal(value.clone());
        }
        if let Some(Value::Array(options)) = self.get("anyOf").or_else(|| self.get("oneOf")) {
            let options: Vec<Box<dyn SchemaNode + '_>> = options
                .iter()
                .filter(|o| o.get("type").and_then(Value::as_str) != Some("null"))
                .map(|o| Self::child(o, false))
                .collect();
            return SchemaKind::Union(options);
        }
        match self.type_name() {
            Some("string") => SchemaKind::String,
            Some("number") => SchemaKind::Number { integer: false },
            Some("integer") => SchemaKind::Number { integer: true },
            Some("boolean") => SchemaKind::Boolean,
            Some("array") => match self.get("items") {
                Some(items) => SchemaKind::Array(Self::child(items, false)),
                None => SchemaKind::Array(Box::new(AnyNode)),
            },
            Some("object") => self.object_kind(),
            Some("null") => SchemaKind::Literal(Value::Null),
            _ if self.get("properties").is_some() => self.object_kind(),
            _ => SchemaKind::Any,
        }
    }

    fn description(&self) -> Option<String> {
        self.get("description").and_then(Value::as_str).map(String::from)
    }

    fn default_value(&self) -> Option<Value> {
        self.get("default").cloned()
    }

    fn is_optional(&self) -> bool {
        self.optional || self.get("default").is_some()
    }

    fn is_nullable(&self) -> bool {
        let in_type = self
            .get("type")
            .and_then(Value::as_array)
            .is_some_and(|names| names.iter().any(|n| n.as_str() == Some("null")));
        let in_any_of = self
            .get("anyOf")
            .or_else(|| self.get("oneOf"))
            .and_then(Value::as_array)
            .is_some_and(|opts| {
                opts.iter()
                    .any(|o| o.get("type").and_then(Value::as_str) == Some("null"))
            });
        let flag = self.get("nullable").and_then(Value::as_bool).unwrap_or(false);
        in_type || in_any_of || flag
    }
}

struct LiteralNode(Value);

impl SchemaNode for LiteralNode {
    fn kind(&self) -> SchemaKind<'_> {
        SchemaKind::Literal(self.0.clone())
    }
    fn description(&self) -> Option<String> {
        None
    }
    fn default_value(&self) -> Option<Value> {
        None
    }
    fn is_optional(&self) -> bool {
        false
    }
    fn is_nullable(&self) -> bool {
        self.0.is_null()
    }
}

struct AnyNode;

impl SchemaNode for AnyNode {
    fn kind(&self) -> SchemaKind<'_> {
        SchemaKind::Any
    }
    fn description(&self) -> Option<String> {
        None
    }
    fn default_value(&self) -> Option<Value> {
        None
    }
    fn is_optional(&self) -> bool {
        false
    }
    fn is_nullable(&self) -> bool {
        true
    }
}

/// Name of a JSON value's type, as used in validation messages.
#[must_use]
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
