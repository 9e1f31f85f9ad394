use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::tool::ToolCallResult;

/// The result of one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The model answered conversationally.
    Chat {
        /// The reply.
        response: String,
    },
    /// A function call was deferred to the delayed dispatcher.
    Scheduled {
        /// Id for [`CommandAgent::cancel_scheduled`](super::CommandAgent::cancel_scheduled).
        schedule_id: Uuid,
        /// Delay in seconds.
        delay_seconds: u64,
        /// Delay as shown to the user.
        delay_display: String,
        /// Function that will run.
        function: String,
        /// Its parameters.
        params: Map<String, Value>,
    },
    /// A function call ran.
    Executed(ToolCallResult),
    /// The command could not be carried out.
    Error {
        /// Summary.
        message: String,
        /// Underlying error, if any.
        error: Option<String>,
        /// Error classification, if any.
        kind: Option<ErrorKind>,
        /// The model's raw reply, if one was received.
        raw: Option<String>,
    },
}

impl CommandOutcome {
    /// `"success"`, `"failed"` or `"error"`.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Chat { .. } | Self::Scheduled { .. } => "success",
            Self::Executed(result) if result.success => "success",
            Self::Executed(_) => "failed",
            Self::Error { .. } => "error",
        }
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Chat { response } => response.clone(),
            Self::Scheduled { delay_display, .. } => format!("Will execute in {delay_display}"),
            Self::Executed(result) => result.message.clone(),
            Self::Error { message, .. } => message.clone(),
        }
    }

    /// The function this outcome ran or will run.
    #[must_use]
    pub fn function(&self) -> Option<&str> {
        match self {
            Self::Scheduled { function, .. } => Some(function),
            Self::Executed(result) => Some(&result.function),
            Self::Chat { .. } | Self::Error { .. } => None,
        }
    }

    /// Whether the outcome is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status() == "success"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::CallStatus;

    fn executed(success: bool) -> CommandOutcome {
        CommandOutcome::Executed(ToolCallResult {
            success,
            message: if success { "Screen locked" } else { "Failed after 3 attempts" }.into(),
            data: None,
            error: None,
            error_kind: None,
            execution_time_ms: 1.0,
            attempt: 1,
            function: "lock_screen".into(),
            status: if success {
                CallStatus::Success
            } else {
                CallStatus::Failed
            },
        })
    }

    #[test]
    fn test_status_message_pairs() {
        let chat = CommandOutcome::Chat {
            response: "Hi".into(),
        };
        assert_eq!((chat.status(), chat.message()), ("success", "Hi".to_owned()));

        let scheduled = CommandOutcome::Scheduled {
            schedule_id: Uuid::nil(),
            delay_seconds: 10,
            delay_display: "10 seconds".into(),
            function: "lock_screen".into(),
            params: Map::new(),
        };
        assert_eq!(scheduled.message(), "Will execute in 10 seconds");
        assert_eq!(scheduled.function(), Some("lock_screen"));
        assert!(scheduled.is_success());

        assert_eq!(executed(true).status(), "success");
        assert_eq!(executed(false).status(), "failed");
        assert!(!executed(false).is_success());

        let error = CommandOutcome::Error {
            message: "Could not understand the command".into(),
            error: None,
            kind: None,
            raw: Some("I cannot do that".into()),
        };
        assert_eq!(error.status(), "error");
        assert_eq!(error.function(), None);
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(CommandOutcome::Chat {
            response: "Hi".into(),
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({"outcome": "chat", "response": "Hi"}));
    }
}
