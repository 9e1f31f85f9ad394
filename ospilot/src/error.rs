//! Unified error types for ospilot.
//!
//! Every component owns a typed error ([`SchemaError`], [`ActionError`],
//! [`StoreError`], [`ProviderError`], [`ConfigError`]). They all convert into
//! the crate-level [`Error`], and every error maps onto the pipeline's
//! [`ErrorKind`] taxonomy where one applies.

use std::fmt;

use crate::schema::SchemaError;
use crate::store::StoreError;
use crate::tool::ActionError;

/// Result type alias for ospilot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for ospilot.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Schema validation or JSON extraction failed.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Completion provider error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Action provider or tool caller error.
    #[error("action error: {0}")]
    Action(#[from] ActionError),

    /// State store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Agent runtime error.
    #[error("agent error: {0}")]
    Agent(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an agent error with a message.
    #[must_use]
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    /// Map this error onto the pipeline taxonomy, if it belongs to it.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Schema(e) => Some(e.kind()),
            Self::Action(e) => Some(e.kind()),
            Self::Provider(e) => Some(e.error_kind()),
            _ => None,
        }
    }
}

/// The error taxonomy of the command pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No schema is registered under the requested name.
    UnknownSchema,
    /// A value has the wrong JSON type.
    TypeMismatch,
    /// A required field is absent.
    MissingField,
    /// A field not declared by the schema was present in strict mode.
    UnexpectedField,
    /// A value is not one of the allowed values.
    EnumViolation,
    /// A numeric value is outside its declared bounds.
    RangeViolation,
    /// No JSON object could be recovered from text.
    ParseError,
    /// The completion provider could not be reached.
    ProviderUnreachable,
    /// The action provider reported a failure.
    ActionFailed,
    /// The action provider did not answer in time.
    ActionTimeout,
    /// No catalog entry matches the requested function.
    UnknownFunction,
}

impl ErrorKind {
    /// Stable snake-case name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownSchema => "unknown_schema",
            Self::TypeMismatch => "type_mismatch",
            Self::MissingField => "missing_field",
            Self::UnexpectedField => "unexpected_field",
            Self::EnumViolation => "enum_violation",
            Self::RangeViolation => "range_violation",
            Self::ParseError => "parse_error",
            Self::ProviderUnreachable => "provider_unreachable",
            Self::ActionFailed => "action_failed",
            Self::ActionTimeout => "action_timeout",
            Self::UnknownFunction => "unknown_function",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Provider Errors
// ============================================================================

/// Error type for completion provider operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProviderError {
    /// The error kind.
    pub kind: ProviderErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Optional status code returned by the provider.
    pub code: Option<String>,
}

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProviderErrorKind {
    /// Connection refused or host unreachable.
    Unreachable,
    /// The request exceeded its timeout.
    Timeout,
    /// The provider answered with a non-success HTTP status.
    HttpStatus,
    /// The response body had an unexpected shape.
    ResponseFormat,
    /// The token stream broke mid-way.
    Stream,
}

impl ProviderError {
    /// Create a network error (provider unreachable).
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unreachable,
            message: message.into(),
            code: None,
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Timeout,
            message: message.into(),
            code: None,
        }
    }

    /// Create an HTTP status error.
    #[must_use]
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::HttpStatus,
            message: format!("HTTP {status}: {}", body.into()),
            code: Some(status.to_string()),
        }
    }

    /// Create a response format error.
    #[must_use]
    pub fn response_format(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::ResponseFormat,
            message: message.into(),
            code: None,
        }
    }

    /// Create a streaming error.
    #[must_use]
    pub fn stream(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Stream,
            message: message.into(),
            code: None,
        }
    }

    /// Whether the provider could not be reached at all.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::Unreachable)
    }

    /// The failure as a user-facing reply, always starting with `"Error: "`.
    #[must_use]
    pub fn reply_text(&self) -> String {
        if self.is_unreachable() {
            "Error: Cannot connect to Ollama. Make sure Ollama is running (ollama serve)".to_owned()
        } else {
            format!("Error: {self}")
        }
    }

    /// Map onto the pipeline taxonomy.
    ///
    /// Every provider failure surfaces to the pipeline as an unreachable provider.
    #[must_use]
    pub const fn error_kind(&self) -> ErrorKind {
        ErrorKind::ProviderUnreachable
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout("Request timed out")
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {err}"))
        } else if err.is_decode() {
            Self::response_format(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid value.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid value error.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let schema_err = SchemaError::MissingField("function".into());
        let err: Error = schema_err.into();
        assert_eq!(err.kind(), Some(ErrorKind::MissingField));

        let action_err = ActionError::unknown_function("fly_to_moon");
        let err: Error = action_err.into();
        assert_eq!(err.kind(), Some(ErrorKind::UnknownFunction));

        let err: Error = ProviderError::network("connection refused").into();
        assert_eq!(err.kind(), Some(ErrorKind::ProviderUnreachable));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::http_status(404, "model not found");
        assert_eq!(err.to_string(), "HTTP 404: model not found (code: 404)");
        assert!(!err.is_unreachable());
    }

    #[test]
    fn test_agent_error_has_no_kind() {
        let err = Error::agent("boom");
        assert!(err.kind().is_none());
        assert_eq!(ErrorKind::ActionTimeout.to_string(), "action_timeout");
    }
}
