//! Completion providers.
//!
//! The [`CompletionProvider`] trait is the seam between the command pipeline
//! and the text generator. [`ollama`] implements it over the Ollama HTTP API.

pub mod ollama;
pub mod streaming;

pub use ollama::{OllamaClient, OllamaClientBuilder};
pub use streaming::{
    CancelHandle, JsonAssembler, NdjsonStreamParser, StreamBuffer, StreamEvent, TokenStream,
    collect_stream, ndjson_events,
};

use async_trait::async_trait;

use crate::error::ProviderError;

/// A text generator that turns a prompt into a completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate the full completion for `prompt` with `model`.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError>;

    /// Generate the completion as a token stream.
    ///
    /// Setting `cancel` ends the stream promptly without an error event.
    async fn stream(
        &self,
        model: &str,
        prompt: &str,
        cancel: CancelHandle,
    ) -> Result<TokenStream, ProviderError>;

    /// Models the provider can serve.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}
