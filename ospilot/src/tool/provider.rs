//! The action provider seam and its built-in implementations.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::catalog::{Action, Toggle, VolumeAction, volume_from_text};
use super::errors::ActionError;
use crate::timer::TimerManager;

/// Outcome status reported by an action provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The action took effect.
    Success,
    /// The action ran but did not take effect.
    Failed,
    /// The action could not run.
    Error,
}

/// What an action provider returns for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Outcome status.
    pub status: ResponseStatus,
    /// Human-readable summary.
    pub message: String,
    /// Structured payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResponse {
    /// A successful response.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: None,
        }
    }

    /// A response for an action that ran without effect.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failed,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether the status is [`ResponseStatus::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Something that can carry out catalog actions.
///
/// A `Failed` or `Error` response status is treated by the tool caller as a
/// transient failure and retried.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    /// Carry out one action.
    async fn invoke(&self, action: &Action) -> Result<ActionResponse, ActionError>;
}

#[async_trait]
impl<T: ActionProvider + ?Sized> ActionProvider for Arc<T> {
    async fn invoke(&self, action: &Action) -> Result<ActionResponse, ActionError> {
        (**self).invoke(action).await
    }
}

/// Where a background change points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundTarget {
    /// A named or hex colour.
    Color(String),
    /// An image file.
    Image(String),
}

impl BackgroundTarget {
    /// Pick the target from the call's `color` and `image_path` values.
    ///
    /// The first present value wins; anything that looks like a file path is an
    /// image, everything else a colour. Defaults to blue.
    #[must_use]
    pub fn resolve(color: Option<&str>, image_path: Option<&str>) -> Self {
        let input = color.or(image_path).unwrap_or("blue").trim();
        let lower = input.to_lowercase();
        let is_path = input.contains(['/', '\\'])
            || [".png", ".jpg", ".jpeg", ".bmp"]
                .iter()
                .any(|ext| lower.ends_with(ext));
        if is_path {
            Self::Image(input.to_owned())
        } else {
            Self::Color(input.to_owned())
        }
    }

    /// The raw input text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Color(s) | Self::Image(s) => s,
        }
    }
}

/// A platform that performs no OS effect and reports what it would have done.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPlatform;

impl DryRunPlatform {
    fn toggled(subject: &str, action: Toggle) -> ActionResponse {
        ActionResponse::success(format!("{subject} turned {}", action.as_str()))
    }

    fn volume(action: VolumeAction, level: Option<u8>) -> ActionResponse {
        match (action, level) {
            (VolumeAction::Mute, _) => ActionResponse::success("Volume muted"),
            (VolumeAction::Unmute, _) => ActionResponse::success("Volume unmuted"),
            (VolumeAction::Increase, None) => ActionResponse::success("Volume increased"),
            (VolumeAction::Decrease, None) => ActionResponse::success("Volume decreased"),
            (VolumeAction::Increase | VolumeAction::Decrease, Some(level)) => {
                ActionResponse::success(format!("Volume set to {level}%"))
                    .with_data(json!({"level": level}))
            }
        }
    }
}

#[async_trait]
impl ActionProvider for DryRunPlatform {
    async fn invoke(&self, action: &Action) -> Result<ActionResponse, ActionError> {
        debug!(function = action.name(), "Dry run");
        let response = match action {
            Action::OpenApplication { app_name } => {
                ActionResponse::success(format!("Application '{app_name}' opened"))
            }
            Action::ToggleBluetooth { action } => Self::toggled("Bluetooth", *action),
            Action::ToggleWifi { action } => Self::toggled("Wi-Fi", *action),
            Action::ToggleAirplaneMode { action } => Self::toggled("Airplane mode", *action),
            Action::ChangeBackground { color, image_path } => {
                let target = BackgroundTarget::resolve(color.as_deref(), image_path.as_deref());
                ActionResponse::success(format!("Background changed to {}", target.as_str()))
            }
            Action::SetBrightness { level } => {
                ActionResponse::success(format!("Brightness set to {level}%"))
            }
            Action::SetVolume { level, level_text } => {
                let level = level_text
                    .as_deref()
                    .and_then(volume_from_text)
                    .or(*level)
                    .unwrap_or(50);
                ActionResponse::success(format!("Volume set to {level}%"))
                    .with_data(json!({"level": level}))
            }
            Action::ControlVolume { action, level } => Self::volume(*action, *level),
            Action::LockScreen => ActionResponse::success("Screen locked"),
            Action::SleepSystem => ActionResponse::success("System going to sleep"),
            Action::ShutdownSystem => ActionResponse::success("System shutting down"),
            Action::RestartSystem => ActionResponse::success("System restarting"),
            Action::OpenSystemSettings { setting_type } => {
                ActionResponse::success(format!("Opened {setting_type} settings"))
            }
            Action::GetSystemInfo => ActionResponse::success("System information collected")
                .with_data(json!({
                    "os": std::env::consts::OS,
                    "arch": std::env::consts::ARCH,
                    "family": std::env::consts::FAMILY,
                })),
            Action::SetTimer { .. } | Action::GetTimerStatus { .. } | Action::CancelTimer { .. } => {
                return Err(ActionError::fatal(format!(
                    "{} is served by the timer manager",
                    action.name()
                )));
            }
        };
        Ok(response)
    }
}

/// Routes timer actions to a [`TimerManager`] and everything else to a platform.
#[derive(Clone)]
pub struct SystemActions {
    platform: Arc<dyn ActionProvider>,
    timers: TimerManager,
}

impl fmt::Debug for SystemActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemActions")
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}

impl SystemActions {
    /// Build a router over `platform` and `timers`.
    pub fn new(platform: impl ActionProvider + 'static, timers: TimerManager) -> Self {
        Self {
            platform: Arc::new(platform),
            timers,
        }
    }

    /// A router over [`DryRunPlatform`] with a fresh timer manager.
    #[must_use]
    pub fn dry_run() -> Self {
        Self::new(DryRunPlatform, TimerManager::new())
    }

    /// The timer manager serving timer actions.
    #[must_use]
    pub const fn timers(&self) -> &TimerManager {
        &self.timers
    }

    fn timer_action(&self, action: &Action) -> Result<ActionResponse, ActionError> {
        match action {
            Action::SetTimer {
                minutes,
                seconds,
                timer_id,
            } => {
                let total = minutes.saturating_mul(60).saturating_add(*seconds);
                if total == 0 {
                    return Err(ActionError::invalid_params(
                        action.name(),
                        "Timer must be greater than 0",
                    ));
                }
                self.timers.start(timer_id, total);
                info!(timer_id = %timer_id, total_seconds = total, "Timer set");
                Ok(
                    ActionResponse::success(format!("Timer set for {minutes}m {seconds}s"))
                        .with_data(json!({"timer_id": timer_id, "total_seconds": total})),
                )
            }
            Action::CancelTimer { timer_id } => {
                if self.timers.cancel(timer_id) {
                    Ok(ActionResponse::success(format!("Timer {timer_id} cancelled")))
                } else {
                    Err(no_timer(timer_id))
                }
            }
            Action::GetTimerStatus { timer_id } => {
                let status = self.timers.status(timer_id).ok_or_else(|| no_timer(timer_id))?;
                let message = format!("Timer {timer_id}: {} remaining", status.remaining);
                let data = serde_json::to_value(&status)
                    .map_err(|e| ActionError::fatal(e.to_string()))?;
                Ok(ActionResponse::success(message).with_data(data))
            }
            other => Err(ActionError::fatal(format!(
                "{} is not a timer action",
                other.name()
            ))),
        }
    }
}

fn no_timer(timer_id: &str) -> ActionError {
    ActionError::fatal(format!("No timer found with ID {timer_id}"))
}

#[async_trait]
impl ActionProvider for SystemActions {
    async fn invoke(&self, action: &Action) -> Result<ActionResponse, ActionError> {
        if action.is_timer() {
            self.timer_action(action)
        } else {
            self.platform.invoke(action).await
        }
    }
}
