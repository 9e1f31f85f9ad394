//! Error types for schema validation.

use serde_json::Value;

use crate::error::ErrorKind;

/// Errors produced while validating or extracting structured call objects.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// No schema is registered under this name.
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// A value has the wrong JSON type. `field` is `None` for the top-level value.
    #[error("{}: expected {expected}, got {found}", field.as_deref().unwrap_or("data"))]
    TypeMismatch {
        /// Offending field, if not the top-level value.
        field: Option<String>,
        /// Expected kind.
        expected: &'static str,
        /// Actual JSON type.
        found: &'static str,
    },

    /// A required field is absent.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// An undeclared field was present in strict mode.
    #[error("unexpected field: {0}")]
    UnexpectedField(String),

    /// A value is not one of the allowed values.
    #[error("{field}: value {value} not in allowed values {}", Value::Array(allowed.clone()))]
    EnumViolation {
        /// Offending field.
        field: String,
        /// The rejected value.
        value: Value,
        /// The allowed values.
        allowed: Vec<Value>,
    },

    /// A numeric value is outside its declared bounds.
    #[error("{field}: value {value} {bound}")]
    RangeViolation {
        /// Offending field.
        field: String,
        /// The rejected value.
        value: f64,
        /// Which bound was crossed.
        bound: RangeBound,
    },

    /// No JSON object could be recovered from text.
    #[error("could not extract JSON: {0}")]
    ParseError(String),
}

/// The bound a numeric value crossed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeBound {
    /// Below the declared minimum.
    Minimum(f64),
    /// Above the declared maximum.
    Maximum(f64),
}

impl std::fmt::Display for RangeBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minimum(min) => write!(f, "is below minimum {min}"),
            Self::Maximum(max) => write!(f, "exceeds maximum {max}"),
        }
    }
}

impl SchemaError {
    /// Create a parse error.
    #[must_use]
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Map onto the pipeline taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownSchema(_) => ErrorKind::UnknownSchema,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::MissingField(_) => ErrorKind::MissingField,
            Self::UnexpectedField(_) => ErrorKind::UnexpectedField,
            Self::EnumViolation { .. } => ErrorKind::EnumViolation,
            Self::RangeViolation { .. } => ErrorKind::RangeViolation,
            Self::ParseError(_) => ErrorKind::ParseError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_messages() {
        let err = SchemaError::RangeViolation {
            field: "seconds".into(),
            value: 75.0,
            bound: RangeBound::Maximum(59.0),
        };
        assert_eq!(err.to_string(), "seconds: value 75 exceeds maximum 59");

        let err = SchemaError::TypeMismatch {
            field: None,
            expected: "object",
            found: "array",
        };
        assert_eq!(err.to_string(), "data: expected object, got array");

        let err = SchemaError::EnumViolation {
            field: "action".into(),
            value: json!("blink"),
            allowed: vec![json!("on"), json!("off")],
        };
        assert_eq!(
            err.to_string(),
            r#"action: value "blink" not in allowed values ["on","off"]"#
        );
    }
}
