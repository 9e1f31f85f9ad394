//! Error types for the tool module.

use std::time::Duration;

use crate::error::ErrorKind;

/// Errors raised while resolving or invoking an action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ActionError {
    /// No catalog entry matches the requested function.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// The parameters do not fit the function's parameter shape.
    #[error("Invalid parameters for {function}: {message}")]
    InvalidParams {
        /// Function name.
        function: String,
        /// What was wrong.
        message: String,
    },

    /// A failure that may go away on retry.
    #[error("{0}")]
    Transient(String),

    /// The provider did not answer within the attempt timeout.
    #[error("Execution timeout after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// A failure that will not go away on retry.
    #[error("{0}")]
    Fatal(String),
}

impl ActionError {
    /// Create an unknown-function error.
    #[must_use]
    pub fn unknown_function(name: impl Into<String>) -> Self {
        Self::UnknownFunction(name.into())
    }

    /// Create an invalid-parameters error.
    #[must_use]
    pub fn invalid_params(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a transient error.
    #[must_use]
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a fatal error.
    #[must_use]
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Whether another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }

    /// Map onto the pipeline taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownFunction(_) => ErrorKind::UnknownFunction,
            Self::Timeout(_) => ErrorKind::ActionTimeout,
            Self::InvalidParams { .. } | Self::Transient(_) | Self::Fatal(_) => {
                ErrorKind::ActionFailed
            }
        }
    }
}
