//! Delayed dispatch of tool calls.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::providers::CancelHandle;
use crate::tool::{ActionError, CallOptions, ToolCallResult, ToolCaller};

const STEP: Duration = Duration::from_secs(1);

/// Runs tool calls after a delay, one background task per call.
#[derive(Clone)]
pub struct DelayedDispatcher {
    caller: Arc<ToolCaller>,
}

impl fmt::Debug for DelayedDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedDispatcher").finish_non_exhaustive()
    }
}

/// A pending delayed call.
pub struct ScheduledHandle {
    /// Schedule id.
    pub id: Uuid,
    /// When the call is due.
    pub fire_at: DateTime<Utc>,
    cancel: CancelHandle,
    task: JoinHandle<Option<ToolCallResult>>,
}

impl fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("id", &self.id)
            .field("fire_at", &self.fire_at)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ScheduledHandle {
    /// Stop the call from running. Takes effect within one second.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the background task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the call; `None` if it was cancelled before running.
    pub async fn wait(self) -> Option<ToolCallResult> {
        self.task.await.ok().flatten()
    }
}

impl DelayedDispatcher {
    /// Dispatch through `caller`.
    #[must_use]
    pub const fn new(caller: Arc<ToolCaller>) -> Self {
        Self { caller }
    }

    /// Run `function` with `params` once `delay` has elapsed.
    ///
    /// The task sleeps in one-second steps and checks its cancel flag after
    /// each. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an invalid-params error when the due time is not
    /// representable; nothing is scheduled in that case.
    pub fn schedule(
        &self,
        delay: Duration,
        function: impl Into<String>,
        params: Map<String, Value>,
    ) -> Result<ScheduledHandle, ActionError> {
        let function = function.into();
        let Some(fire_at) = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
        else {
            warn!(function = %function, delay_secs = delay.as_secs(), "Delay out of range");
            return Err(ActionError::invalid_params(
                &function,
                format!("delay of {}s is out of range", delay.as_secs()),
            ));
        };
        let id = Uuid::new_v4();
        let cancel = CancelHandle::new();

        info!(%id, function = %function, delay_secs = delay.as_secs(), "Action scheduled");

        let caller = Arc::clone(&self.caller);
        let flag = cancel.clone();
        let task = tokio::spawn(async move {
            let mut left = delay;
            while !left.is_zero() {
                if flag.is_cancelled() {
                    info!(%id, "Scheduled action cancelled");
                    return None;
                }
                let step = left.min(STEP);
                tokio::time::sleep(step).await;
                left -= step;
            }
            if flag.is_cancelled() {
                info!(%id, "Scheduled action cancelled");
                return None;
            }

            let result = caller
                .execute_tool(&function, params, CallOptions::default())
                .await;
            if result.success {
                info!(%id, function = %function, message = %result.message, "Scheduled action completed");
            } else {
                warn!(%id, function = %function, error = ?result.error, "Scheduled action failed");
            }
            Some(result)
        });

        Ok(ScheduledHandle {
            id,
            fire_at,
            cancel,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{CallStatus, SystemActions};
    use serde_json::json;

    fn dispatcher() -> (DelayedDispatcher, Arc<ToolCaller>) {
        let caller = Arc::new(ToolCaller::new(SystemActions::dry_run()));
        (DelayedDispatcher::new(Arc::clone(&caller)), caller)
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_delay() {
        let (dispatcher, caller) = dispatcher();
        let started = tokio::time::Instant::now();
        let handle = dispatcher.schedule(
            Duration::from_secs(10),
            "open_application",
            params(json!({"app_name": "notepad"})),
        )
        .unwrap();
        assert!(caller.history(None).is_empty());

        let result = handle.wait().await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Application 'notepad' opened");
        assert!(started.elapsed() >= Duration::from_secs(10));

        let history = caller.history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CallStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_fire() {
        let (dispatcher, caller) = dispatcher();
        let handle = dispatcher
            .schedule(Duration::from_secs(30), "lock_screen", Map::new())
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.cancel();
        assert!(handle.is_cancelled());

        assert!(handle.wait().await.is_none());
        assert!(caller.history(None).is_empty());
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_delay() {
        let (dispatcher, caller) = dispatcher();
        let err = dispatcher
            .schedule(Duration::from_secs(u64::MAX), "lock_screen", Map::new())
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams { .. }));
        assert!(err.to_string().contains("out of range"));
        assert!(caller.history(None).is_empty());

        let err = dispatcher
            .schedule(Duration::from_secs(3_600_000_000_000_000), "lock_screen", Map::new())
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams { .. }));
    }
}
