//! Structural contracts for model output.
//!
//! A [`Schema`] names the fields a structured call object must carry and the
//! kind and bounds of each. The [`SchemaValidator`] checks and cleans objects
//! against a registry of schemas, recovers JSON from free model text, and
//! renders schemas for inclusion in prompts.

pub mod catalog;
mod error;
mod extract;
mod validator;

pub use error::{RangeBound, SchemaError};
pub use extract::{extract_json, first_json_object};
pub use validator::SchemaValidator;

use serde_json::{Map, Value, json};

/// The JSON kind a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A JSON string.
    String,
    /// Any JSON number.
    Number,
    /// A whole number that is not a boolean.
    Integer,
    /// A JSON boolean.
    Boolean,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
    /// Any value, constrained only by the allowed-values list.
    Enum,
}

impl FieldKind {
    /// The kind's JSON Schema type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Enum => "enum",
        }
    }
}

/// Type descriptor for one schema field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Required JSON kind.
    pub kind: FieldKind,
    /// Inclusive lower bound for numeric kinds.
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numeric kinds.
    pub maximum: Option<f64>,
    /// Allowed values, if constrained.
    pub allowed: Option<Vec<Value>>,
    /// Value used when repairing an object that lacks this field.
    pub default: Option<Value>,
    /// Free-form description rendered into prompts.
    pub description: Option<String>,
}

impl FieldSpec {
    /// Create a descriptor of the given kind with no constraints.
    #[must_use]
    pub const fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            minimum: None,
            maximum: None,
            allowed: None,
            default: None,
            description: None,
        }
    }

    /// A string field.
    #[must_use]
    pub const fn string() -> Self {
        Self::new(FieldKind::String)
    }

    /// A number field.
    #[must_use]
    pub const fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    /// An integer field.
    #[must_use]
    pub const fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    /// A boolean field.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    /// An array field.
    #[must_use]
    pub const fn array() -> Self {
        Self::new(FieldKind::Array)
    }

    /// An object field.
    #[must_use]
    pub const fn object() -> Self {
        Self::new(FieldKind::Object)
    }

    /// Set the inclusive minimum.
    #[must_use]
    pub const fn min(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    /// Set the inclusive maximum.
    #[must_use]
    pub const fn max(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    /// Restrict the field to the given values.
    #[must_use]
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Set the repair default.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Placeholder inserted by a repair pass when the field is missing.
    #[must_use]
    pub fn placeholder(&self) -> Value {
        if let Some(default) = &self.default {
            return default.clone();
        }
        if let Some(first) = self.allowed.as_ref().and_then(|values| values.first()) {
            return first.clone();
        }
        match self.kind {
            FieldKind::String => Value::String(String::new()),
            FieldKind::Number | FieldKind::Integer => json!(0),
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::Array => Value::Array(Vec::new()),
            FieldKind::Object | FieldKind::Enum => Value::Object(Map::new()),
        }
    }

    fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), json!(self.kind.as_str()));
        if let Some(description) = &self.description {
            obj.insert("description".into(), json!(description));
        }
        if let Some(minimum) = self.minimum {
            obj.insert("minimum".into(), number(minimum));
        }
        if let Some(maximum) = self.maximum {
            obj.insert("maximum".into(), number(maximum));
        }
        if let Some(allowed) = &self.allowed {
            obj.insert("enum".into(), Value::Array(allowed.clone()));
        }
        if let Some(default) = &self.default {
            obj.insert("default".into(), default.clone());
        }
        Value::Object(obj)
    }
}

/// Render whole bounds as integers so prompts read `59`, not `59.0`.
#[allow(clippy::cast_possible_truncation)]
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// A named structural contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    required: Vec<String>,
    fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    /// Create an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Mark fields as required.
    #[must_use]
    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    /// The schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Required field names, in declaration order.
    #[must_use]
    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    /// Look up a declared field.
    #[must_use]
    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, spec)| spec)
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Render as a JSON Schema object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, spec)| (name.clone(), spec.to_json()))
            .collect();

        let mut obj = Map::new();
        obj.insert("type".into(), json!("object"));
        if !self.required.is_empty() {
            obj.insert("required".into(), json!(self.required));
        }
        obj.insert("properties".into(), Value::Object(properties));
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(FieldSpec::string().placeholder(), json!(""));
        assert_eq!(FieldSpec::integer().placeholder(), json!(0));
        assert_eq!(FieldSpec::boolean().placeholder(), json!(false));
        assert_eq!(FieldSpec::array().placeholder(), json!([]));
        assert_eq!(FieldSpec::object().placeholder(), json!({}));
        assert_eq!(
            FieldSpec::string().one_of(["on", "off"]).placeholder(),
            json!("on")
        );
        assert_eq!(
            FieldSpec::integer().with_default(5).placeholder(),
            json!(5)
        );
    }

    #[test]
    fn test_schema_json() {
        let schema = Schema::new("timer")
            .required(["function"])
            .field("seconds", FieldSpec::integer().min(0.0).max(59.0));
        assert_eq!(
            schema.to_json(),
            json!({
                "type": "object",
                "required": ["function"],
                "properties": {
                    "seconds": {"type": "integer", "minimum": 0, "maximum": 59}
                }
            })
        );
        assert!(schema.field_spec("seconds").is_some());
        assert!(schema.field_spec("minutes").is_none());
    }
}
