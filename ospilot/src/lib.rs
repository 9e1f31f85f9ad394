//! Ospilot turns natural-language commands into local OS actions.
//!
//! A command flows through the [`agent::CommandAgent`]: delay phrases are
//! split off, a completion provider maps the rest onto a catalog function
//! (optionally validated against a [`schema`]), and the [`tool::ToolCaller`]
//! runs it with retries and timeouts. Delayed commands go to the
//! [`timer::DelayedDispatcher`]. Every step leaves a trail in the
//! [`store::StateStore`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ospilot::prelude::*;
//!
//! let store = StateStore::open(ospilot::config::default_db_path()).await?;
//! let agent = CommandAgent::builder(Arc::new(OllamaClient::new()))
//!     .store(store)
//!     .build();
//! let outcome = agent.execute_command("set volume to 40").await;
//! ```
extern crate self as ospilot;

pub mod agent;
pub mod config;
pub mod error;
pub mod prelude;
pub mod providers;
pub mod schema;
pub mod store;
pub mod timer;
pub mod tool;

pub use agent::{CommandAgent, CommandOutcome};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
