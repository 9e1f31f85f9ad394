//! Common imports.

pub use crate::agent::{CommandAgent, CommandAgentBuilder, CommandOutcome};
pub use crate::config::{AgentConfig, Config};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::providers::{CompletionProvider, OllamaClient};
pub use crate::schema::SchemaValidator;
pub use crate::store::StateStore;
pub use crate::timer::TimerManager;
pub use crate::tool::{
    Action, ActionProvider, ActionResponse, DryRunPlatform, SystemActions, ToolCaller,
};
