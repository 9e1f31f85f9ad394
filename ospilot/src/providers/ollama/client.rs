//! Ollama API client.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::ProviderError;

/// Default Ollama API base URL (local server).
pub const OLLAMA_API_BASE_URL: &str = "http://localhost:11434";

/// Timeout of a non-streaming generation request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Timeout of a whole streaming generation.
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 300;

const MODEL_LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for a local Ollama server.
///
/// # Example
///
/// ```rust,ignore
/// use ospilot::providers::OllamaClient;
///
/// let client = OllamaClient::builder()
///     .base_url("http://192.168.1.100:11434")
///     .timeout_secs(120)
///     .build();
///
/// let text = client.generate_text("mistral", "Say hi").await;
/// ```
#[derive(Clone)]
pub struct OllamaClient {
    pub(super) http_client: reqwest::Client,
    pub(super) base_url: Arc<str>,
    pub(super) request_timeout: Duration,
    pub(super) stream_timeout: Duration,
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("stream_timeout", &self.stream_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaClient {
    /// Create a client for `http://localhost:11434` with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> OllamaClientBuilder {
        OllamaClientBuilder::default()
    }

    /// The server base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(super) fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Generate a completion, folding every failure into an `"Error: ..."` string.
    ///
    /// Callers that need to tell failures apart use
    /// [`CompletionProvider::complete`](crate::providers::CompletionProvider::complete).
    pub async fn generate_text(&self, model: &str, prompt: &str) -> String {
        match self.generate(model, prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Generation failed");
                e.reply_text()
            }
        }
    }

    /// Check if the Ollama server is running and accessible.
    pub async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(MODEL_LIST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    /// List models installed on the server, sorted by name.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(MODEL_LIST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status, body));
        }

        let json: Value = response.json().await?;
        let mut models: Vec<String> = json["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str())
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        models.sort();

        Ok(models)
    }
}

/// Builder for [`OllamaClient`].
#[derive(Debug, Default)]
pub struct OllamaClientBuilder {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    stream_timeout_secs: Option<u64>,
}

impl OllamaClientBuilder {
    /// Set a custom base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the non-streaming request timeout in seconds (default 60).
    #[must_use]
    pub const fn timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = Some(timeout);
        self
    }

    /// Set the streaming request timeout in seconds (default 300).
    #[must_use]
    pub const fn stream_timeout_secs(mut self, timeout: u64) -> Self {
        self.stream_timeout_secs = Some(timeout);
        self
    }

    /// Build the client.
    #[must_use]
    pub fn build(self) -> OllamaClient {
        let base_url = self
            .base_url
            .unwrap_or_else(|| OLLAMA_API_BASE_URL.to_owned());

        OllamaClient {
            http_client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').into(),
            request_timeout: Duration::from_secs(
                self.timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            stream_timeout: Duration::from_secs(
                self.stream_timeout_secs
                    .unwrap_or(DEFAULT_STREAM_TIMEOUT_SECS),
            ),
        }
    }
}
