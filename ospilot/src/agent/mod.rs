//! The command agent.
//!
//! [`CommandAgent`] turns one line of user text into a [`CommandOutcome`]:
//!
//! 1. A delay phrase ("after 10 seconds") is split off the command.
//! 2. The command and the function catalog go to the completion provider.
//! 3. The reply is read as a chat answer or a function call.
//! 4. Function calls run through the [`ToolCaller`], or are handed to the
//!    [`DelayedDispatcher`] when a delay was given.
//!
//! Every command leaves a latency metric in the state store, and resolved
//! calls and chat turns leave conversation rows.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ospilot::agent::CommandAgent;
//! use ospilot::providers::OllamaClient;
//!
//! let agent = CommandAgent::builder(Arc::new(OllamaClient::new()))
//!     .model("mistral")
//!     .build();
//!
//! let outcome = agent.execute_command("open notepad after 10 seconds").await;
//! println!("{}: {}", outcome.status(), outcome.message());
//! ```

pub mod delay;
pub mod intent;
mod outcome;
pub mod prompt;

pub use delay::{DelayDescriptor, extract_delay, format_delay};
pub use intent::Intent;
pub use outcome::CommandOutcome;
pub use prompt::{ChatTurn, Speaker};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{AgentConfig, DEFAULT_MODEL};
use crate::error::{Error, ProviderError, Result};
use crate::providers::{
    CancelHandle, CompletionProvider, StreamBuffer, TokenStream, collect_stream,
};
use crate::schema::catalog::RESPONSE;
use crate::schema::{SchemaError, SchemaValidator, extract_json};
use crate::store::{
    ConversationRecord, ExportDocument, NewConversation, StateStore, Statistics, ToolStatistics,
};
use crate::timer::{DelayedDispatcher, ScheduledHandle};
use crate::tool::{
    Action, CallOptions, CallerStatistics, SystemActions, ToolCallResult, ToolCaller,
};

/// Metric recorded once per command.
pub const LATENCY_METRIC: &str = "command_latency_ms";

/// Preference key holding the selected model.
pub const MODEL_PREFERENCE: &str = "ollama.model";

const NOT_UNDERSTOOD: &str = "Could not understand the command";
const NO_FUNCTION: &str = "No function found in response";

/// Receives streamed reply text in chunks.
pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// How a reply was resolved before anything runs.
enum Resolution {
    Call {
        function: String,
        params: Map<String, Value>,
        raw: String,
    },
    Done(CommandOutcome),
}

/// Maps natural-language commands onto catalog actions.
pub struct CommandAgent {
    provider: Arc<dyn CompletionProvider>,
    caller: Arc<ToolCaller>,
    dispatcher: DelayedDispatcher,
    validator: SchemaValidator,
    store: Option<StateStore>,
    config: AgentConfig,
    model: RwLock<String>,
    chat_history: Mutex<Vec<ChatTurn>>,
    scheduled: Mutex<BTreeMap<Uuid, ScheduledHandle>>,
    active_stream: Mutex<CancelHandle>,
    on_chunk: Option<ChunkCallback>,
}

impl fmt::Debug for CommandAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandAgent")
            .field("model", &self.model())
            .field("config", &self.config)
            .field("caller", &self.caller)
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

impl CommandAgent {
    /// Start building an agent over `provider`.
    #[must_use]
    pub fn builder(provider: Arc<dyn CompletionProvider>) -> CommandAgentBuilder {
        CommandAgentBuilder::new(provider)
    }

    /// The current model id.
    #[must_use]
    pub fn model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The tool caller used for dispatch.
    #[must_use]
    pub const fn caller(&self) -> &Arc<ToolCaller> {
        &self.caller
    }

    /// The attached state store, if any.
    #[must_use]
    pub const fn state_store(&self) -> Option<&StateStore> {
        self.store.as_ref()
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Carry out one command.
    #[instrument(skip(self), fields(model = %self.model()))]
    pub async fn execute_command(&self, input: &str) -> CommandOutcome {
        let started = Instant::now();
        let outcome = self.run_command(input, None).await;
        self.record_latency(started, &outcome).await;
        outcome
    }

    /// Carry out one command, validating the reply against `schema_name`.
    ///
    /// An invalid reply gets one repair pass that fills missing required
    /// fields before it is rejected.
    #[instrument(skip(self), fields(model = %self.model()))]
    pub async fn execute_command_with_schema(
        &self,
        input: &str,
        schema_name: &str,
    ) -> CommandOutcome {
        let started = Instant::now();
        let outcome = self.run_command(input, Some(schema_name)).await;
        self.record_latency(started, &outcome).await;
        outcome
    }

    async fn run_command(&self, input: &str, schema: Option<&str>) -> CommandOutcome {
        let delay = extract_delay(input);
        if delay.has_delay {
            debug!(delay_seconds = delay.delay_seconds, command = %delay.command, "Delay found");
            return match self.resolve(&delay.command, schema).await {
                Resolution::Call {
                    function,
                    params,
                    raw,
                } => self.schedule(input, &delay, function, params, raw).await,
                Resolution::Done(outcome) => outcome,
            };
        }

        match self.resolve(input, schema).await {
            Resolution::Call {
                function,
                params,
                raw,
            } => self.dispatch(input, function, params, raw).await,
            Resolution::Done(outcome) => outcome,
        }
    }

    async fn resolve(&self, command: &str, schema: Option<&str>) -> Resolution {
        let prompt = match schema {
            None => prompt::command_prompt(command),
            Some(name) => prompt::schema_command_prompt(
                command,
                name,
                &self.validator.schema_prompt(&[name, RESPONSE]),
            ),
        };

        let raw = match self.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Completion failed");
                return Resolution::Done(CommandOutcome::Error {
                    message: e.reply_text(),
                    error: Some(e.to_string()),
                    kind: Some(e.error_kind()),
                    raw: None,
                });
            }
        };
        debug!(raw = %raw, "Model replied");

        let intent = match schema {
            None => Intent::parse(&raw),
            Some(name) => match self.validated_intent(&raw, name) {
                Ok(intent) => intent,
                Err(e) => {
                    warn!(schema = name, error = %e, "Reply rejected");
                    return Resolution::Done(CommandOutcome::Error {
                        message: NOT_UNDERSTOOD.to_owned(),
                        error: Some(e.to_string()),
                        kind: Some(e.kind()),
                        raw: Some(raw),
                    });
                }
            },
        };

        match intent {
            Intent::Call { function, params } => Resolution::Call {
                function,
                params,
                raw,
            },
            Intent::Chat(response) => {
                self.record_conversation(
                    NewConversation::new(command)
                        .with_response(&raw, self.model())
                        .with_status("chat"),
                )
                .await;
                Resolution::Done(CommandOutcome::Chat { response })
            }
            Intent::Unparsed => {
                let message = if schema.is_some() {
                    NO_FUNCTION
                } else {
                    NOT_UNDERSTOOD
                };
                Resolution::Done(CommandOutcome::Error {
                    message: message.to_owned(),
                    error: None,
                    kind: None,
                    raw: Some(raw),
                })
            }
        }
    }

    /// Validate the reply, with one `suggest_fix` repair on failure.
    fn validated_intent(
        &self,
        raw: &str,
        schema_name: &str,
    ) -> std::result::Result<Intent, SchemaError> {
        let data = extract_json(raw)
            .ok_or_else(|| SchemaError::parse("no JSON object found in response"))?;

        if let Intent::Chat(reply) = Intent::from_value(&data) {
            return Ok(Intent::Chat(reply));
        }

        let cleaned = match self.validator.validate(&data, schema_name, false) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                debug!(error = %e, "Attempting repair");
                let fixed = self.validator.suggest_fix(&data, schema_name);
                self.validator.validate(&fixed, schema_name, false)?
            }
        };
        Ok(Intent::from_value(&Value::Object(cleaned)))
    }

    async fn dispatch(
        &self,
        input: &str,
        function: String,
        params: Map<String, Value>,
        raw: String,
    ) -> CommandOutcome {
        let result = if self.config.use_retry {
            self.caller
                .execute_tool(&function, params.clone(), CallOptions::default())
                .await
        } else {
            self.caller.invoke_direct(&function, &params).await
        };

        let mut turn = NewConversation::new(input)
            .with_response(raw, self.model())
            .with_function(&function, Value::Object(params))
            .with_status(result.status.as_str())
            .with_execution_time(result.execution_time_ms);
        if let Some(error) = &result.error {
            turn = turn.with_error(error);
        }
        self.record_conversation(turn).await;

        CommandOutcome::Executed(result)
    }

    async fn schedule(
        &self,
        input: &str,
        delay: &DelayDescriptor,
        function: String,
        params: Map<String, Value>,
        raw: String,
    ) -> CommandOutcome {
        let scheduled = Action::from_call(&function, &params).and_then(|_| {
            self.dispatcher.schedule(
                Duration::from_secs(delay.delay_seconds),
                &function,
                params.clone(),
            )
        });
        let handle = match scheduled {
            Ok(handle) => handle,
            Err(e) => {
                return CommandOutcome::Error {
                    message: e.to_string(),
                    error: Some(e.to_string()),
                    kind: Some(e.kind()),
                    raw: Some(raw),
                };
            }
        };
        let schedule_id = handle.id;

        self.record_conversation(
            NewConversation::new(input)
                .with_response(raw, self.model())
                .with_function(&function, Value::Object(params.clone()))
                .with_status("scheduled"),
        )
        .await;

        {
            let mut scheduled = lock(&self.scheduled);
            scheduled.retain(|_, handle| !handle.is_finished());
            scheduled.insert(schedule_id, handle);
        }
        info!(%schedule_id, function = %function, delay = %delay.display, "Command scheduled");

        CommandOutcome::Scheduled {
            schedule_id,
            delay_seconds: delay.delay_seconds,
            delay_display: delay.display.clone(),
            function,
            params,
        }
    }

    // ------------------------------------------------------------------
    // Scheduled actions
    // ------------------------------------------------------------------

    /// Cancel a scheduled action; returns whether it was still pending.
    pub fn cancel_scheduled(&self, schedule_id: Uuid) -> bool {
        let Some(handle) = lock(&self.scheduled).remove(&schedule_id) else {
            return false;
        };
        if handle.is_finished() {
            return false;
        }
        handle.cancel();
        info!(%schedule_id, "Scheduled action cancelled");
        true
    }

    /// Ids of scheduled actions that have not run yet.
    #[must_use]
    pub fn pending_scheduled(&self) -> Vec<Uuid> {
        lock(&self.scheduled)
            .iter()
            .filter(|(_, handle)| !handle.is_finished() && !handle.is_cancelled())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Wait for every scheduled action to run or be cancelled.
    pub async fn wait_scheduled(&self) -> Vec<ToolCallResult> {
        let handles: Vec<ScheduledHandle> = {
            let mut scheduled = lock(&self.scheduled);
            std::mem::take(&mut *scheduled).into_values().collect()
        };
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(result) = handle.wait().await {
                results.push(result);
            }
        }
        results
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    /// One conversational turn over the recent chat history.
    pub async fn chat(&self, message: &str) -> String {
        let prompt = {
            let mut history = lock(&self.chat_history);
            history.push(ChatTurn::user(message));
            prompt::chat_prompt(&history, self.config.history_window)
        };

        let reply = match self.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Chat completion failed");
                e.reply_text()
            }
        };

        lock(&self.chat_history).push(ChatTurn::assistant(&reply));
        self.record_conversation(
            NewConversation::new(message)
                .with_response(&reply, self.model())
                .with_status("chat"),
        )
        .await;
        reply
    }

    /// The in-memory chat history.
    #[must_use]
    pub fn chat_history(&self) -> Vec<ChatTurn> {
        lock(&self.chat_history).clone()
    }

    /// Stop the reply currently being streamed.
    ///
    /// The pending command or chat call returns with the text received so
    /// far. Has no effect when nothing is streaming.
    pub fn stop_stream(&self) {
        let cancel = lock(&self.active_stream);
        if !cancel.is_cancelled() {
            info!("Stopping streamed reply");
            cancel.cancel();
        }
    }

    // ------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------

    /// Models the provider offers, sorted; empty if it cannot say.
    pub async fn available_models(&self) -> Vec<String> {
        match self.provider.list_models().await {
            Ok(mut models) => {
                models.sort();
                models
            }
            Err(e) => {
                warn!(error = %e, "Could not list models");
                Vec::new()
            }
        }
    }

    /// Switch models. Returns `false` if the provider lists models and this is not one.
    ///
    /// Switching clears the chat history and saves the choice as the
    /// `ollama.model` preference.
    pub async fn set_model(&self, model: &str) -> Result<bool> {
        let available = self.available_models().await;
        if !available.is_empty() && !available.iter().any(|m| m == model) {
            warn!(model, "Model not available");
            return Ok(false);
        }

        *self.model.write().unwrap_or_else(PoisonError::into_inner) = model.to_owned();
        lock(&self.chat_history).clear();
        if let Some(store) = &self.store {
            store.set_preference(MODEL_PREFERENCE, &json!(model)).await?;
        }
        info!(model, "Model switched");
        Ok(true)
    }

    /// Adopt the model saved by [`set_model`](Self::set_model), if there is one.
    pub async fn load_saved_model(&self) -> Result<Option<String>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let saved = store
            .preference(MODEL_PREFERENCE)
            .await?
            .and_then(|value| value.as_str().map(str::to_owned));
        if let Some(model) = &saved {
            *self.model.write().unwrap_or_else(PoisonError::into_inner) = model.clone();
            debug!(model = %model, "Restored saved model");
        }
        Ok(saved)
    }

    // ------------------------------------------------------------------
    // Store pass-throughs
    // ------------------------------------------------------------------

    fn store(&self) -> Result<&StateStore> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::agent("no state store attached"))
    }

    /// Conversation and tool-call aggregates.
    pub async fn statistics(&self) -> Result<Statistics> {
        Ok(self.store()?.statistics().await?)
    }

    /// Persisted tool-call aggregates.
    pub async fn tool_statistics(&self) -> Result<ToolStatistics> {
        Ok(self.store()?.tool_statistics().await?)
    }

    /// Aggregates over the tool caller's in-memory history.
    #[must_use]
    pub fn caller_statistics(&self) -> CallerStatistics {
        self.caller.statistics()
    }

    /// Newest-first conversation rows.
    pub async fn conversation_history(&self, limit: usize) -> Result<Vec<ConversationRecord>> {
        Ok(self.store()?.conversation_history(limit, 0, None).await?)
    }

    /// Export the whole store to `path`.
    pub async fn export(&self, path: impl AsRef<Path>) -> Result<ExportDocument> {
        Ok(self.store()?.export(path).await?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let model = self.model();
        if !self.config.use_streaming {
            return self.provider.complete(&model, prompt).await;
        }

        let cancel = CancelHandle::new();
        *lock(&self.active_stream) = cancel.clone();
        let stream = self.provider.stream(&model, prompt, cancel.clone()).await?;
        let stream: TokenStream =
            Box::pin(stream.take_until(async move { cancel.cancelled().await }));
        let mut buffer = StreamBuffer::new(self.config.chunk_size);
        let on_chunk = self.on_chunk.as_ref();
        let text = collect_stream(stream, |token| {
            if let (Some(chunk), Some(callback)) = (buffer.push(token), on_chunk) {
                callback(&chunk);
            }
        })
        .await?;
        if let (Some(rest), Some(callback)) = (buffer.flush(), on_chunk) {
            callback(&rest);
        }
        Ok(text.trim().to_owned())
    }

    async fn record_conversation(&self, turn: NewConversation) {
        if let Some(store) = &self.store
            && let Err(e) = store.add_conversation(turn).await
        {
            warn!(error = %e, "Failed to record conversation");
        }
    }

    async fn record_latency(&self, started: Instant, outcome: &CommandOutcome) {
        let ms = elapsed_ms(started);
        debug!(elapsed_ms = ms, status = outcome.status(), "Command finished");
        if let Some(store) = &self.store {
            let tags = json!({"model": self.model(), "status": outcome.status()});
            if let Err(e) = store.record_metric(LATENCY_METRIC, ms, Some(tags)).await {
                warn!(error = %e, "Failed to record latency");
            }
        }
    }
}

/// Builder for [`CommandAgent`].
pub struct CommandAgentBuilder {
    provider: Arc<dyn CompletionProvider>,
    caller: Option<Arc<ToolCaller>>,
    validator: Option<SchemaValidator>,
    store: Option<StateStore>,
    config: AgentConfig,
    model: Option<String>,
    on_chunk: Option<ChunkCallback>,
}

impl fmt::Debug for CommandAgentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandAgentBuilder")
            .field("model", &self.model)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CommandAgentBuilder {
    fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            caller: None,
            validator: None,
            store: None,
            config: AgentConfig::default(),
            model: None,
            on_chunk: None,
        }
    }

    /// Dispatch through `caller`. Defaults to a dry-run caller.
    #[must_use]
    pub fn caller(mut self, caller: Arc<ToolCaller>) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Validate schema-aware replies with `validator`. Defaults to the built-in schemas.
    #[must_use]
    pub fn validator(mut self, validator: SchemaValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Record conversations, metrics and the model choice in `store`.
    #[must_use]
    pub fn store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Agent behaviour settings.
    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Initial model id. Defaults to `mistral`.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Receive streamed reply text in chunks of `chunk_size` tokens.
    #[must_use]
    pub fn on_chunk(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_chunk = Some(Arc::new(callback));
        self
    }

    /// Build the agent.
    #[must_use]
    pub fn build(self) -> CommandAgent {
        let caller = self.caller.unwrap_or_else(|| {
            let caller = ToolCaller::new(SystemActions::dry_run());
            Arc::new(match &self.store {
                Some(store) => caller.with_store(store.clone()),
                None => caller,
            })
        });

        CommandAgent {
            provider: self.provider,
            dispatcher: DelayedDispatcher::new(Arc::clone(&caller)),
            caller,
            validator: self.validator.unwrap_or_default(),
            store: self.store,
            config: self.config,
            model: RwLock::new(self.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned())),
            chat_history: Mutex::new(Vec::new()),
            scheduled: Mutex::new(BTreeMap::new()),
            active_stream: Mutex::new(CancelHandle::new()),
            on_chunk: self.on_chunk,
        }
    }
}
