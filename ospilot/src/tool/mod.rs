//! The function catalog and tool execution.
//!
//! A model names a function and passes loose JSON parameters. The
//! [`ToolCaller`] resolves them into a typed [`Action`], hands it to an
//! [`ActionProvider`] and retries transient failures with exponential backoff.
//!
//! [`SystemActions`] is the provider used by default: timer actions are served
//! in-process, everything else goes to a platform provider such as
//! [`DryRunPlatform`].

pub mod catalog;
pub mod caller;
pub mod errors;
pub mod provider;

pub use catalog::{
    Action, DEFAULT_TIMER_ID, FUNCTIONS, FunctionSpec, Toggle, VolumeAction, function_definitions,
    function_spec, volume_from_text,
};
pub use caller::{
    CallOptions, CallStatus, CallerStatistics, RetryConfig, ToolCall, ToolCallResult, ToolCaller,
    ToolRequest,
};
pub use errors::ActionError;
pub use provider::{
    ActionProvider, ActionResponse, BackgroundTarget, DryRunPlatform, ResponseStatus,
    SystemActions,
};
