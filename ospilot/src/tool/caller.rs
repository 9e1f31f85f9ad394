//! Retrying tool invocation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::catalog::Action;
use super::errors::ActionError;
use super::provider::{ActionProvider, ActionResponse};
use crate::error::ErrorKind;
use crate::store::{NewToolCall, StateStore};

/// Default attempts per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default exponential backoff base, in seconds.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;
/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry policy of a [`ToolCaller`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Attempts per call, at least one.
    pub max_attempts: u32,
    /// Wait before retry `n` is `backoff_factor^(n-1)` seconds.
    pub backoff_factor: f64,
    /// Bound on a single attempt.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RetryConfig {
    /// Wait after the failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    fn with_options(mut self, options: CallOptions) -> Self {
        if let Some(max_attempts) = options.max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(timeout) = options.timeout {
            self.timeout = timeout;
        }
        self.max_attempts = self.max_attempts.max(1);
        self
    }
}

/// Per-call overrides of the retry policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Attempts for this call.
    pub max_attempts: Option<u32>,
    /// Per-attempt timeout for this call.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    /// Override the attempt count.
    #[must_use]
    pub const fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Lifecycle status of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Created, not yet attempted.
    Pending,
    /// First attempt in flight.
    Executing,
    /// A later attempt in flight or waiting.
    Retrying,
    /// Succeeded.
    Success,
    /// Gave up after an error.
    Failed,
    /// Gave up after the last attempt timed out.
    Timeout,
}

impl CallStatus {
    /// Lowercase name, as persisted.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    /// Whether no further attempts will be made.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Timeout)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of a named action, across all of its attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id.
    pub id: Uuid,
    /// Function name.
    pub function: String,
    /// Parameters as given.
    pub params: Map<String, Value>,
    /// Current status.
    pub status: CallStatus,
    /// Attempts made so far.
    pub attempts: u32,
    /// Attempt limit.
    pub max_attempts: u32,
    /// Error of the latest failed attempt.
    pub last_error: Option<String>,
    /// Provider response on success.
    pub result: Option<Value>,
    /// When the call began.
    pub created_at: DateTime<Utc>,
}

impl ToolCall {
    fn new(function: &str, params: Map<String, Value>, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            function: function.to_owned(),
            params,
            status: CallStatus::Pending,
            attempts: 0,
            max_attempts,
            last_error: None,
            result: None,
            created_at: Utc::now(),
        }
    }
}

/// The outcome of one [`ToolCaller::execute_tool`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Whether the action succeeded.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Provider payload, if any.
    pub data: Option<Value>,
    /// Error detail on failure.
    pub error: Option<String>,
    /// Error classification on failure.
    pub error_kind: Option<ErrorKind>,
    /// Wall time across all attempts and backoff.
    pub execution_time_ms: f64,
    /// Attempt number the call concluded at.
    pub attempt: u32,
    /// Function name.
    pub function: String,
    /// Terminal status.
    pub status: CallStatus,
}

/// A call for [`ToolCaller::execute_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    /// Function name.
    pub function: String,
    /// Parameters.
    pub params: Map<String, Value>,
    /// Retry overrides.
    pub options: CallOptions,
}

impl ToolRequest {
    /// A request with default options.
    pub fn new(function: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            function: function.into(),
            params,
            options: CallOptions::default(),
        }
    }
}

/// Aggregates over the in-memory call history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallerStatistics {
    /// Calls recorded.
    pub total: usize,
    /// Calls per terminal status.
    pub by_status: BTreeMap<String, usize>,
    /// Share of successful calls.
    pub success_rate: f64,
    /// Mean attempts per call.
    pub avg_attempts: f64,
    /// Distinct function names, sorted.
    pub functions: Vec<String>,
}

/// Executes catalog actions with bounded retries and exponential backoff.
///
/// Every [`execute_tool`](Self::execute_tool) appends exactly one entry to the
/// in-memory history and, with a store attached, one tool-call row.
pub struct ToolCaller {
    provider: Arc<dyn ActionProvider>,
    retry: RwLock<RetryConfig>,
    history: Mutex<Vec<ToolCall>>,
    store: Option<StateStore>,
}

impl fmt::Debug for ToolCaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCaller")
            .field("retry", &self.retry_config())
            .field("history_len", &lock(&self.history).len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

impl ToolCaller {
    /// A caller over `provider` with the default retry policy.
    pub fn new(provider: impl ActionProvider + 'static) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    /// A caller over a shared provider.
    #[must_use]
    pub fn from_arc(provider: Arc<dyn ActionProvider>) -> Self {
        Self {
            provider,
            retry: RwLock::new(RetryConfig::default()),
            history: Mutex::new(Vec::new()),
            store: None,
        }
    }

    /// Persist every call to `store`.
    #[must_use]
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Start with `config` instead of the default policy.
    #[must_use]
    pub fn with_retry(self, config: RetryConfig) -> Self {
        self.set_retry_config(config);
        self
    }

    /// Replace the process-wide retry policy.
    pub fn set_retry_config(&self, config: RetryConfig) {
        *self.retry.write().unwrap_or_else(PoisonError::into_inner) = config;
        info!(
            max_attempts = config.max_attempts,
            backoff_factor = config.backoff_factor,
            timeout_secs = config.timeout.as_secs_f64(),
            "Retry config updated"
        );
    }

    /// The current retry policy.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        *self.retry.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `function` with `params`, retrying transient failures.
    #[instrument(skip(self, params, options), fields(function = %function))]
    pub async fn execute_tool(
        &self,
        function: &str,
        params: Map<String, Value>,
        options: CallOptions,
    ) -> ToolCallResult {
        let retry = self.retry_config().with_options(options);
        let started = Instant::now();
        let mut call = ToolCall::new(function, params, retry.max_attempts);

        let outcome = match Action::from_call(function, &call.params) {
            Ok(action) => self.attempt_loop(&action, &mut call, &retry).await,
            Err(e) => {
                call.status = CallStatus::Failed;
                call.last_error = Some(e.to_string());
                Err(e)
            }
        };
        let execution_time_ms = elapsed_ms(started);

        let result = match outcome {
            Ok(response) => {
                info!(attempt = call.attempts, elapsed_ms = execution_time_ms, "Tool call succeeded");
                ToolCallResult {
                    success: true,
                    message: response.message,
                    data: response.data,
                    error: None,
                    error_kind: None,
                    execution_time_ms,
                    attempt: call.attempts,
                    function: call.function.clone(),
                    status: call.status,
                }
            }
            Err(e) => {
                warn!(attempts = call.attempts, error = %e, "Tool call failed");
                let message = if e.is_retryable() {
                    format!("Failed after {} attempts", call.attempts)
                } else {
                    e.to_string()
                };
                ToolCallResult {
                    success: false,
                    message,
                    data: None,
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind()),
                    execution_time_ms,
                    attempt: call.attempts,
                    function: call.function.clone(),
                    status: call.status,
                }
            }
        };

        self.record(call, execution_time_ms).await;
        result
    }

    async fn attempt_loop(
        &self,
        action: &Action,
        call: &mut ToolCall,
        retry: &RetryConfig,
    ) -> Result<ActionResponse, ActionError> {
        loop {
            call.attempts += 1;
            call.status = if call.attempts == 1 {
                CallStatus::Executing
            } else {
                CallStatus::Retrying
            };
            debug!(attempt = call.attempts, max_attempts = call.max_attempts, "Executing");

            match self.attempt(action, retry.timeout).await {
                Ok(response) => {
                    call.status = CallStatus::Success;
                    call.result = serde_json::to_value(&response).ok();
                    return Ok(response);
                }
                Err(e) => {
                    call.last_error = Some(e.to_string());
                    if !e.is_retryable() || call.attempts >= call.max_attempts {
                        call.status = match e {
                            ActionError::Timeout(_) => CallStatus::Timeout,
                            _ => CallStatus::Failed,
                        };
                        return Err(e);
                    }
                    let wait = retry.backoff(call.attempts);
                    info!(attempt = call.attempts, error = %e, wait_secs = wait.as_secs_f64(), "Retrying");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        action: &Action,
        timeout: Duration,
    ) -> Result<ActionResponse, ActionError> {
        match tokio::time::timeout(timeout, self.provider.invoke(action)).await {
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => Err(ActionError::transient(response.message)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ActionError::Timeout(timeout)),
        }
    }

    async fn record(&self, call: ToolCall, execution_time_ms: f64) {
        if let Some(store) = &self.store {
            let row = NewToolCall {
                function_name: call.function.clone(),
                params: Value::Object(call.params.clone()),
                status: call.status.as_str().to_owned(),
                result: call.result.clone(),
                error: call.last_error.clone(),
                execution_time_ms,
                attempts: call.attempts,
            };
            if let Err(e) = store.add_tool_call(row).await {
                warn!(error = %e, "Failed to persist tool call");
            }
        }
        lock(&self.history).push(call);
    }

    /// Run one attempt with no retry and no history entry.
    pub async fn invoke_direct(&self, function: &str, params: &Map<String, Value>) -> ToolCallResult {
        let started = Instant::now();
        let timeout = self.retry_config().timeout;
        let outcome = match Action::from_call(function, params) {
            Ok(action) => self.attempt(&action, timeout).await,
            Err(e) => Err(e),
        };
        let execution_time_ms = elapsed_ms(started);

        match outcome {
            Ok(response) => ToolCallResult {
                success: true,
                message: response.message,
                data: response.data,
                error: None,
                error_kind: None,
                execution_time_ms,
                attempt: 1,
                function: function.to_owned(),
                status: CallStatus::Success,
            },
            Err(e) => ToolCallResult {
                success: false,
                message: e.to_string(),
                data: None,
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
                execution_time_ms,
                attempt: 1,
                function: function.to_owned(),
                status: if matches!(e, ActionError::Timeout(_)) {
                    CallStatus::Timeout
                } else {
                    CallStatus::Failed
                },
            },
        }
    }

    /// Run several calls, one after another or all at once.
    ///
    /// Results are in request order either way.
    pub async fn execute_batch(
        &self,
        requests: Vec<ToolRequest>,
        parallel: bool,
    ) -> Vec<ToolCallResult> {
        debug!(count = requests.len(), parallel, "Executing batch");
        if parallel {
            join_all(
                requests
                    .into_iter()
                    .map(|r| self.execute_tool_owned(r)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                results.push(self.execute_tool_owned(request).await);
            }
            results
        }
    }

    async fn execute_tool_owned(&self, request: ToolRequest) -> ToolCallResult {
        self.execute_tool(&request.function, request.params, request.options)
            .await
    }

    /// Newest-last history, limited to the latest `limit` entries.
    #[must_use]
    pub fn history(&self, limit: Option<usize>) -> Vec<ToolCall> {
        let history = lock(&self.history);
        let skip = limit.map_or(0, |n| history.len().saturating_sub(n));
        history[skip..].to_vec()
    }

    /// Forget the in-memory history. Persisted rows are kept.
    pub fn clear_history(&self) {
        lock(&self.history).clear();
        info!("Call history cleared");
    }

    /// Aggregates over the in-memory history.
    #[must_use]
    pub fn statistics(&self) -> CallerStatistics {
        let history = lock(&self.history);
        if history.is_empty() {
            return CallerStatistics::default();
        }

        let mut by_status = BTreeMap::new();
        for call in history.iter() {
            *by_status.entry(call.status.as_str().to_owned()).or_insert(0) += 1;
        }
        let total = history.len();
        let successful = by_status.get(CallStatus::Success.as_str()).copied().unwrap_or(0);
        let attempts: u64 = history.iter().map(|c| u64::from(c.attempts)).sum();
        let functions: BTreeSet<&str> = history.iter().map(|c| c.function.as_str()).collect();

        CallerStatistics {
            total,
            by_status,
            success_rate: successful as f64 / total as f64,
            avg_attempts: attempts as f64 / total as f64,
            functions: functions.into_iter().map(str::to_owned).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ToolCallFilter;
    use crate::tool::DryRunPlatform;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `error` for the first `failures` calls, then succeeds.
    struct Scripted {
        failures: u32,
        error: ActionError,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(failures: u32, error: ActionError) -> Arc<Self> {
            Arc::new(Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ActionProvider for Scripted {
        async fn invoke(&self, _action: &Action) -> Result<ActionResponse, ActionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(ActionResponse::success("done"))
            }
        }
    }

    /// Never answers in time.
    struct Stalled;

    #[async_trait]
    impl ActionProvider for Stalled {
        async fn invoke(&self, _action: &Action) -> Result<ActionResponse, ActionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ActionResponse::success("late"))
        }
    }

    /// Reports a failed status every time.
    struct Refusing;

    #[async_trait]
    impl ActionProvider for Refusing {
        async fn invoke(&self, _action: &Action) -> Result<ActionResponse, ActionError> {
            Ok(ActionResponse::failed("Could not lock screen"))
        }
    }

    fn caller_over(provider: Arc<dyn ActionProvider>) -> ToolCaller {
        ToolCaller::from_arc(provider)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let provider = Scripted::new(2, ActionError::transient("busy"));
        let caller = caller_over(Arc::clone(&provider) as Arc<dyn ActionProvider>);
        let started = Instant::now();

        let result = caller
            .execute_tool("lock_screen", Map::new(), CallOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.attempt, 3);
        assert_eq!(result.status, CallStatus::Success);
        assert_eq!(result.message, "done");
        assert_eq!(provider.calls(), 3);
        // 1.5^0 + 1.5^1 seconds of backoff
        assert!(started.elapsed() >= Duration::from_millis(2500));

        let history = caller.history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CallStatus::Success);
        assert_eq!(history[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_exhausts_attempts() {
        let provider = Scripted::new(u32::MAX, ActionError::transient("busy"));
        let caller = caller_over(Arc::clone(&provider) as Arc<dyn ActionProvider>);

        let result = caller
            .execute_tool("lock_screen", Map::new(), CallOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.attempt, 3);
        assert_eq!(result.status, CallStatus::Failed);
        assert_eq!(result.message, "Failed after 3 attempts");
        assert_eq!(result.error.as_deref(), Some("busy"));
        assert_eq!(provider.calls(), 3);

        let history = caller.history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CallStatus::Failed);
        assert!(history[0].attempts <= history[0].max_attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let provider = Scripted::new(u32::MAX, ActionError::fatal("no such device"));
        let caller = caller_over(Arc::clone(&provider) as Arc<dyn ActionProvider>);

        let result = caller
            .execute_tool("toggle_bluetooth", Map::new(), CallOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.attempt, 1);
        assert_eq!(result.message, "no such device");
        assert_eq!(result.error_kind, Some(ErrorKind::ActionFailed));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_status() {
        let caller = caller_over(Arc::new(Stalled));
        let options = CallOptions::default()
            .max_attempts(2)
            .timeout(Duration::from_secs(1));

        let result = caller.execute_tool("lock_screen", Map::new(), options).await;

        assert!(!result.success);
        assert_eq!(result.attempt, 2);
        assert_eq!(result.status, CallStatus::Timeout);
        assert_eq!(result.error_kind, Some(ErrorKind::ActionTimeout));
        assert_eq!(result.error.as_deref(), Some("Execution timeout after 1s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_response_is_retried() {
        let caller = caller_over(Arc::new(Refusing));
        let result = caller
            .execute_tool("lock_screen", Map::new(), CallOptions::default().max_attempts(2))
            .await;
        assert_eq!(result.attempt, 2);
        assert_eq!(result.error.as_deref(), Some("Could not lock screen"));
    }

    #[tokio::test]
    async fn test_unknown_function_is_recorded() {
        let caller = ToolCaller::new(DryRunPlatform);
        let result = caller
            .execute_tool("fly_to_moon", Map::new(), CallOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.attempt, 0);
        assert_eq!(result.message, "Unknown function: fly_to_moon");
        assert_eq!(result.error_kind, Some(ErrorKind::UnknownFunction));
        assert_eq!(caller.history(None).len(), 1);
    }

    #[tokio::test]
    async fn test_persists_to_store() {
        let store = StateStore::in_memory().unwrap();
        let caller = ToolCaller::new(DryRunPlatform).with_store(store.clone());
        caller
            .execute_tool(
                "open_application",
                json!({"app_name": "notepad"}).as_object().cloned().unwrap(),
                CallOptions::default(),
            )
            .await;

        let rows = store.tool_calls(ToolCallFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].function_name, "open_application");
        assert_eq!(rows[0].status.as_deref(), Some("success"));
        assert_eq!(rows[0].attempts, Some(1));
    }

    #[tokio::test]
    async fn test_batch_and_statistics() {
        let caller = ToolCaller::new(DryRunPlatform);
        let requests = vec![
            ToolRequest::new("lock_screen", Map::new()),
            ToolRequest::new("get_system_info", Map::new()),
            ToolRequest::new("fly_to_moon", Map::new()),
        ];

        let results = caller.execute_batch(requests.clone(), true).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].function, "lock_screen");
        assert!(results[1].success);
        assert!(!results[2].success);

        caller.execute_batch(requests, false).await;
        let stats = caller.statistics();
        assert_eq!(stats.total, 6);
        assert_eq!(stats.by_status["success"], 4);
        assert_eq!(stats.by_status["failed"], 2);
        assert!((stats.success_rate - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(
            stats.functions,
            vec!["fly_to_moon", "get_system_info", "lock_screen"]
        );

        assert_eq!(caller.history(Some(2)).len(), 2);
        caller.clear_history();
        assert_eq!(caller.statistics(), CallerStatistics::default());
    }

    #[tokio::test]
    async fn test_invoke_direct_skips_history() {
        let caller = ToolCaller::new(DryRunPlatform);
        let result = caller.invoke_direct("lock_screen", &Map::new()).await;
        assert!(result.success);
        assert_eq!(result.message, "Screen locked");
        assert!(caller.history(None).is_empty());
    }

    #[test]
    fn test_retry_config() {
        let caller = ToolCaller::new(DryRunPlatform);
        assert_eq!(caller.retry_config(), RetryConfig::default());

        let config = RetryConfig {
            max_attempts: 5,
            backoff_factor: 2.0,
            timeout: Duration::from_secs(10),
        };
        caller.set_retry_config(config);
        assert_eq!(caller.retry_config(), config);
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(3), Duration::from_secs(4));

        let merged = config.with_options(CallOptions::default().max_attempts(0));
        assert_eq!(merged.max_attempts, 1);
    }
}
