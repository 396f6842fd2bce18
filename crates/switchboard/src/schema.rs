//! JSON Schema construction and sanitisation.
//!
//! Tools describe each argument with a [`ToolParameter`] built from a
//! [`ParamKind`]; the composed object schema is what adapters translate into
//! their native function-declaration dialects. Caller-supplied response
//! schemas (including reflector output full of `$defs` and meta keys) go
//! through [`sanitize_response_schema`] before they reach a provider.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The declared kind of a tool parameter, mapped to a JSON Schema fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Integer,
    UnsignedInteger,
    Number,
    Boolean,
    Array(Box<ParamKind>),
    /// A string-keyed mapping with open values.
    Map,
    /// A nested record, left open rather than recursively described.
    Object,
    /// Any JSON value.
    Any,
    Optional(Box<ParamKind>),
}

impl ParamKind {
    pub fn fragment(&self) -> Value {
        match self {
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Integer => json!({"type": "integer"}),
            ParamKind::UnsignedInteger => json!({"type": "integer", "minimum": 0}),
            ParamKind::Number => json!({"type": "number"}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::Array(inner) => match inner.as_ref() {
                // An open element type carries no items schema.
                ParamKind::Any => json!({"type": "array"}),
                other => json!({"type": "array", "items": other.fragment()}),
            },
            ParamKind::Map | ParamKind::Object | ParamKind::Any => {
                json!({"type": "object", "additionalProperties": true})
            }
            ParamKind::Optional(inner) => {
                let mut fragment = inner.fragment();
                if let Some(object) = fragment.as_object_mut() {
                    object.insert("nullable".to_string(), Value::Bool(true));
                }
                fragment
            }
        }
    }
}

/// A single named parameter accepted by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub schema: Value,
}

impl ToolParameter {
    /// Build a parameter from its declared kind. Parameters are required
    /// unless the kind is [`ParamKind::Optional`]; use [`required`] to
    /// override either way.
    ///
    /// [`required`]: ToolParameter::required
    pub fn new<S: Into<String>>(name: S, kind: ParamKind) -> Self {
        let required = !matches!(kind, ParamKind::Optional(_));
        ToolParameter {
            name: name.into(),
            required,
            description: String::new(),
            schema: kind.fragment(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// Override required-ness from an explicit list of parameter names, for
/// callers that gate it orthogonally to the declared kinds.
pub fn with_required_overrides(
    mut parameters: Vec<ToolParameter>,
    required: &[&str],
) -> Vec<ToolParameter> {
    for parameter in &mut parameters {
        parameter.required = required.contains(&parameter.name.as_str());
    }
    parameters
}

/// Compose a parameter list into a `{type: object, properties, required}`
/// schema. The `required` list is omitted when empty.
pub fn object_schema(parameters: &[ToolParameter]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for parameter in parameters {
        let fragment = if parameter.schema.is_null() {
            json!({"type": "string"})
        } else {
            parameter.schema.clone()
        };
        properties.insert(parameter.name.clone(), fragment);
        if parameter.required {
            required.push(Value::String(parameter.name.clone()));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    Value::Object(schema)
}

/// Generate a JSON Schema string for `T`, for structured-output requests.
pub fn json_schema_for<T: JsonSchema>() -> String {
    let schema = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
    serde_json::to_string(&schema).unwrap_or_else(|_| "{}".to_string())
}

const META_KEYS: [&str; 7] = [
    "$schema",
    "$id",
    "$defs",
    "definitions",
    "$ref",
    "title",
    "description",
];

/// Sanitise a response schema so strict providers accept it: inline a
/// top-level `$ref` into `$defs`/`definitions`, drop draft meta keys, and
/// force an object root with a `properties` map.
pub fn sanitize_response_schema(schema: &str) -> String {
    sanitize_schema(schema, false)
}

/// Like [`sanitize_response_schema`] but additionally strips
/// `additionalProperties`, which some vendors reject in tool parameters.
pub fn sanitize_tool_parameters(schema: &str) -> String {
    sanitize_schema(schema, true)
}

fn sanitize_schema(schema: &str, strip_additional: bool) -> String {
    let mut root: Map<String, Value> = match serde_json::from_str(schema) {
        Ok(Value::Object(map)) => map,
        _ => return r#"{"type":"object","properties":{}}"#.to_string(),
    };

    if let Some(name) = root
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|reference| reference.rsplit('/').next())
        .map(str::to_string)
    {
        let referent = root
            .get("$defs")
            .and_then(|defs| defs.get(&name))
            .or_else(|| root.get("definitions").and_then(|defs| defs.get(&name)))
            .cloned();
        if let Some(Value::Object(definition)) = referent {
            for (key, value) in definition {
                root.insert(key, value);
            }
        }
    }

    for key in META_KEYS {
        root.remove(key);
    }
    if strip_additional {
        root.remove("additionalProperties");
    }

    if root.get("type").and_then(Value::as_str) != Some("object") {
        root.insert("type".to_string(), json!("object"));
    }
    if !root.contains_key("properties") {
        root.insert("properties".to_string(), json!({}));
    }

    serde_json::to_string(&Value::Object(root)).unwrap_or_else(|_| "{}".to_string())
}
