//! Row types of the state store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conversation turn to append.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewConversation {
    /// What the user typed.
    pub user_input: String,
    /// Raw model output.
    pub model_response: Option<String>,
    /// Model id that produced the response.
    pub model_used: Option<String>,
    /// Function dispatched, if any.
    pub function_called: Option<String>,
    /// Parameters passed to the function.
    pub function_params: Option<Value>,
    /// Outcome status.
    pub execution_status: Option<String>,
    /// Wall time of the turn.
    pub execution_time_ms: Option<f64>,
    /// Error detail, if the turn failed.
    pub error_message: Option<String>,
}

impl NewConversation {
    /// Start a record for `user_input`.
    #[must_use]
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            ..Self::default()
        }
    }

    /// Set the raw response and the model that produced it.
    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>, model: impl Into<String>) -> Self {
        self.model_response = Some(response.into());
        self.model_used = Some(model.into());
        self
    }

    /// Set the dispatched function and its parameters.
    #[must_use]
    pub fn with_function(mut self, function: impl Into<String>, params: Value) -> Self {
        self.function_called = Some(function.into());
        self.function_params = Some(params);
        self
    }

    /// Set the outcome status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.execution_status = Some(status.into());
        self
    }

    /// Set the wall time.
    #[must_use]
    pub const fn with_execution_time(mut self, ms: f64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    /// Set the error detail.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }
}

/// A stored conversation turn, column for column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ConversationRecord {
    pub id: i64,
    pub timestamp: String,
    pub user_input: String,
    pub model_response: Option<String>,
    pub model_used: Option<String>,
    pub function_called: Option<String>,
    pub function_params: Option<Value>,
    pub execution_status: Option<String>,
    pub execution_time_ms: Option<f64>,
    pub error_message: Option<String>,
}

/// A tool-call attempt record to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewToolCall {
    /// Function name.
    pub function_name: String,
    /// Parameters the function was called with.
    pub params: Value,
    /// Terminal status.
    pub status: String,
    /// Result payload, on success.
    pub result: Option<Value>,
    /// Last error, on failure.
    pub error: Option<String>,
    /// Wall time across every attempt.
    pub execution_time_ms: f64,
    /// Number of attempts made.
    pub attempts: u32,
}

/// A stored tool call, column for column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ToolCallRecord {
    pub id: i64,
    pub timestamp: String,
    pub function_name: String,
    pub params: Option<Value>,
    pub status: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub execution_time_ms: Option<f64>,
    pub attempts: Option<u32>,
}

/// Filter for [`StateStore::tool_calls`](super::StateStore::tool_calls).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallFilter {
    /// Only calls of this function.
    pub function_name: Option<String>,
    /// Only calls with this status.
    pub status: Option<String>,
    /// Maximum rows returned, newest first.
    pub limit: usize,
}

impl Default for ToolCallFilter {
    fn default() -> Self {
        Self {
            function_name: None,
            status: None,
            limit: 100,
        }
    }
}

impl ToolCallFilter {
    /// Only calls of `function`.
    #[must_use]
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function_name = Some(function.into());
        self
    }

    /// Only calls with `status`.
    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Cap the number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// How often a function was called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FunctionUsage {
    pub function: String,
    pub count: u64,
}

/// Aggregates over the tool-call table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ToolStatistics {
    pub total_calls: u64,
    pub by_status: BTreeMap<String, u64>,
    /// Fraction of calls with status `success`, in `[0, 1]`.
    pub success_rate: f64,
    pub avg_execution_time_ms: f64,
    /// The five most called functions, most used first.
    pub most_used_functions: Vec<FunctionUsage>,
}

/// A recorded metric sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct MetricRecord {
    pub id: i64,
    pub timestamp: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub tags: Option<Value>,
}

/// A named session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct SessionRecord {
    pub id: i64,
    pub session_name: String,
    pub created_at: String,
    pub last_accessed: String,
    pub metadata: Option<Value>,
    pub is_active: bool,
}

/// Aggregates over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Statistics {
    pub total_conversations: u64,
    pub total_tool_calls: u64,
    /// Conversation count per model id.
    pub models_used: BTreeMap<String, u64>,
    pub avg_response_time_ms: f64,
}
