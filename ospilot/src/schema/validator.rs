//! Schema registry and validation.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::{FieldKind, FieldSpec, RangeBound, Schema, SchemaError, catalog, extract_json};

/// Validates and cleans structured call objects against named schemas.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schemas: BTreeMap<String, Schema>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    /// Create a validator holding the built-in catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::empty().with_schemas(catalog::builtin())
    }

    /// Create a validator with no schemas registered.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Register a schema, replacing any schema with the same name.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.insert(schema.name().to_owned(), schema);
        self
    }

    /// Register several schemas.
    #[must_use]
    pub fn with_schemas(self, schemas: impl IntoIterator<Item = Schema>) -> Self {
        schemas.into_iter().fold(self, Self::with_schema)
    }

    /// Look up a registered schema.
    #[must_use]
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Names of every registered schema.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Validate `data` against the schema called `schema_name`.
    ///
    /// Returns the cleaned object: every input field, declared fields checked
    /// and echoed, undeclared fields passed through unless `strict` is set.
    pub fn validate(
        &self,
        data: &Value,
        schema_name: &str,
        strict: bool,
    ) -> Result<Map<String, Value>, SchemaError> {
        let schema = self
            .schema(schema_name)
            .ok_or_else(|| SchemaError::UnknownSchema(schema_name.to_owned()))?;

        let Value::Object(object) = data else {
            return Err(SchemaError::TypeMismatch {
                field: None,
                expected: "object",
                found: type_name(data),
            });
        };

        if let Some(missing) = schema
            .required_fields()
            .iter()
            .find(|field| !object.contains_key(field.as_str()))
        {
            return Err(SchemaError::MissingField(missing.clone()));
        }

        let mut cleaned = Map::with_capacity(object.len());
        for (field, value) in object {
            match schema.field_spec(field) {
                Some(spec) => check_field(field, value, spec)?,
                None if strict => return Err(SchemaError::UnexpectedField(field.clone())),
                None => {}
            }
            cleaned.insert(field.clone(), value.clone());
        }

        Ok(cleaned)
    }

    /// Recover a JSON object from free text and validate it.
    pub fn parse_and_validate(
        &self,
        text: &str,
        schema_name: &str,
        strict: bool,
    ) -> Result<Map<String, Value>, SchemaError> {
        let data = extract_json(text)
            .ok_or_else(|| SchemaError::parse("no JSON object found in response"))?;
        self.validate(&data, schema_name, strict)
    }

    /// Fill every missing required field with a placeholder.
    ///
    /// Declared fields get their default, their first allowed value, or an
    /// empty value of their kind. Undeclared required fields get `{}`. Anything
    /// that is not an object, or an unknown schema name, is returned unchanged.
    #[must_use]
    pub fn suggest_fix(&self, data: &Value, schema_name: &str) -> Value {
        let (Some(schema), Value::Object(object)) = (self.schema(schema_name), data) else {
            return data.clone();
        };

        let mut fixed = object.clone();
        for field in schema.required_fields() {
            if fixed.contains_key(field) {
                continue;
            }
            let placeholder = schema
                .field_spec(field)
                .map_or_else(|| Value::Object(Map::new()), FieldSpec::placeholder);
            debug!(schema = schema_name, field = %field, placeholder = %placeholder, "Filling missing field");
            fixed.insert(field.clone(), placeholder);
        }
        Value::Object(fixed)
    }

    /// Render the named schemas as prompt text. Unknown names are skipped.
    #[must_use]
    pub fn schema_prompt(&self, names: &[&str]) -> String {
        let mut parts = vec!["You must ALWAYS respond with valid JSON matching one of these schemas:\n".to_owned()];
        for schema in names.iter().filter_map(|name| self.schema(name)) {
            parts.push(format!("\n**{}:**", schema.name()));
            parts.push(
                serde_json::to_string_pretty(&schema.to_json()).unwrap_or_default(),
            );
        }
        parts.push("\n\nIMPORTANT: Always respond with ONLY valid JSON, no extra text.".to_owned());
        parts.join("\n")
    }
}

fn check_field(field: &str, value: &Value, spec: &FieldSpec) -> Result<(), SchemaError> {
    let mismatch = || SchemaError::TypeMismatch {
        field: Some(field.to_owned()),
        expected: spec.kind.as_str(),
        found: type_name(value),
    };

    match spec.kind {
        FieldKind::String if !value.is_string() => return Err(mismatch()),
        FieldKind::Boolean if !value.is_boolean() => return Err(mismatch()),
        FieldKind::Array if !value.is_array() => return Err(mismatch()),
        FieldKind::Object if !value.is_object() => return Err(mismatch()),
        FieldKind::Number => {
            let number = value.as_f64().ok_or_else(mismatch)?;
            check_range(field, number, spec)?;
        }
        FieldKind::Integer => {
            let number = as_integer(value).ok_or_else(mismatch)?;
            check_range(field, number, spec)?;
        }
        _ => {}
    }

    if let Some(allowed) = &spec.allowed
        && !allowed.contains(value)
    {
        return Err(SchemaError::EnumViolation {
            field: field.to_owned(),
            value: value.clone(),
            allowed: allowed.clone(),
        });
    }
    Ok(())
}

fn check_range(field: &str, number: f64, spec: &FieldSpec) -> Result<(), SchemaError> {
    let bound = match (spec.minimum, spec.maximum) {
        (Some(min), _) if number < min => RangeBound::Minimum(min),
        (_, Some(max)) if number > max => RangeBound::Maximum(max),
        _ => return Ok(()),
    };
    Err(SchemaError::RangeViolation {
        field: field.to_owned(),
        value: number,
        bound,
    })
}

/// Whole numbers count as integers whether written `5` or `5.0`.
fn as_integer(value: &Value) -> Option<f64> {
    let Value::Number(number) = value else {
        return None;
    };
    number
        .as_f64()
        .filter(|n| n.is_finite() && n.fract() == 0.0)
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::catalog::{APPLICATION, SYSTEM_CONTROL, TIMER, TOOL_CALL, VOLUME_CONTROL};
    use serde_json::json;

    #[test]
    fn test_valid_timer() {
        let validator = SchemaValidator::new();
        let data = json!({"function": "set_timer", "minutes": 5, "seconds": 30});
        let cleaned = validator.validate(&data, TIMER, false).unwrap();
        assert_eq!(Value::Object(cleaned), data);
    }

    #[test]
    fn test_unknown_schema() {
        let validator = SchemaValidator::new();
        let err = validator.validate(&json!({}), "teleport", false).unwrap_err();
        assert_eq!(err, SchemaError::UnknownSchema("teleport".into()));
    }

    #[test]
    fn test_top_level_must_be_object() {
        let validator = SchemaValidator::new();
        let err = validator.validate(&json!([1, 2]), TIMER, false).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::TypeMismatch { field: None, found: "array", .. }
        ));
    }

    #[test]
    fn test_missing_required_field() {
        let validator = SchemaValidator::new();
        let err = validator
            .validate(&json!({"function": "open_application"}), APPLICATION, false)
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingField("app_name".into()));
    }

    #[test]
    fn test_strict_rejects_extras() {
        let validator = SchemaValidator::new();
        let data = json!({"function": "set_timer", "label": "tea"});

        let cleaned = validator.validate(&data, TIMER, false).unwrap();
        assert_eq!(cleaned.get("label"), Some(&json!("tea")));

        let err = validator.validate(&data, TIMER, true).unwrap_err();
        assert_eq!(err, SchemaError::UnexpectedField("label".into()));
    }

    #[test]
    fn test_integer_rules() {
        let validator = SchemaValidator::new();
        assert!(
            validator
                .validate(&json!({"function": "set_timer", "minutes": 5.0}), TIMER, false)
                .is_ok()
        );
        let err = validator
            .validate(&json!({"function": "set_timer", "minutes": true}), TIMER, false)
            .unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { expected: "integer", .. }));
        let err = validator
            .validate(&json!({"function": "set_timer", "minutes": 2.5}), TIMER, false)
            .unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { .. }));
    }

    #[test]
    fn test_range_violation() {
        let validator = SchemaValidator::new();
        let err = validator
            .validate(&json!({"function": "set_timer", "seconds": 75}), TIMER, false)
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::RangeViolation {
                field: "seconds".into(),
                value: 75.0,
                bound: RangeBound::Maximum(59.0),
            }
        );
        let err = validator
            .validate(&json!({"function": "set_volume", "level": -1}), VOLUME_CONTROL, false)
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::RangeViolation { bound: RangeBound::Minimum(_), .. }
        ));
    }

    #[test]
    fn test_enum_violation() {
        let validator = SchemaValidator::new();
        let err = validator
            .validate(
                &json!({"function": "toggle_wifi", "action": "blink"}),
                SYSTEM_CONTROL,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::EnumViolation { ref field, .. } if field == "action"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let validator = SchemaValidator::new();
        let data = json!({"function": "set_volume", "level": 40, "note": "quiet"});
        let once = validator.validate(&data, VOLUME_CONTROL, false).unwrap();
        let twice = validator
            .validate(&Value::Object(once.clone()), VOLUME_CONTROL, false)
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_and_validate_with_noise() {
        let validator = SchemaValidator::new();
        let cleaned = validator
            .parse_and_validate(
                r#"noise {"function":"set_timer","minutes":5} noise"#,
                TIMER,
                false,
            )
            .unwrap();
        assert_eq!(cleaned.get("minutes"), Some(&json!(5)));

        let err = validator
            .parse_and_validate("sorry, I cannot do that", TIMER, false)
            .unwrap_err();
        assert!(matches!(err, SchemaError::ParseError(_)));
    }

    #[test]
    fn test_suggest_fix_repairs_missing_fields() {
        let validator = SchemaValidator::new();
        let data = json!({"function": "open_application"});
        assert!(validator.validate(&data, APPLICATION, false).is_err());

        let fixed = validator.suggest_fix(&data, APPLICATION);
        assert_eq!(fixed["app_name"], json!(""));
        assert!(validator.validate(&fixed, APPLICATION, false).is_ok());

        let fixed = validator.suggest_fix(&json!({"function": "toggle_wifi"}), SYSTEM_CONTROL);
        assert_eq!(fixed["action"], json!("on"));

        let fixed = validator.suggest_fix(&json!({}), TOOL_CALL);
        assert_eq!(fixed, json!({"function": "", "params": {}}));
    }

    #[test]
    fn test_suggest_fix_undeclared_required_and_default() {
        let validator = SchemaValidator::empty().with_schema(
            Schema::new("custom")
                .required(["mode", "extra"])
                .field("mode", FieldSpec::string().with_default("auto")),
        );
        let fixed = validator.suggest_fix(&json!({}), "custom");
        assert_eq!(fixed, json!({"mode": "auto", "extra": {}}));

        let untouched = validator.suggest_fix(&json!("text"), "custom");
        assert_eq!(untouched, json!("text"));
    }

    #[test]
    fn test_schema_prompt() {
        let validator = SchemaValidator::new();
        let prompt = validator.schema_prompt(&[TIMER, "missing"]);
        assert!(prompt.starts_with("You must ALWAYS respond with valid JSON"));
        assert!(prompt.contains("**timer:**"));
        assert!(prompt.contains("\"maximum\": 59"));
        assert!(!prompt.contains("missing"));
        assert!(prompt.ends_with("no extra text."));
    }
}
