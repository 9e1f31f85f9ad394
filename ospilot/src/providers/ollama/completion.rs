//! `/api/generate` requests and the [`CompletionProvider`] implementation.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::client::OllamaClient;
use crate::error::ProviderError;
use crate::providers::streaming::{CancelHandle, TokenStream, ndjson_events};
use crate::providers::CompletionProvider;

const TEMPERATURE: f64 = 0.7;
const TOP_P: f64 = 0.9;

impl OllamaClient {
    fn request_body(model: &str, prompt: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "prompt": prompt,
            "stream": stream,
        });
        if !stream {
            body["options"] = json!({ "temperature": TEMPERATURE, "top_p": TOP_P });
        }
        body
    }

    async fn post_generate(
        &self,
        body: &Value,
        timeout: std::time::Duration,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http_client
            .post(self.generate_url())
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status, error_text));
        }
        Ok(response)
    }

    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub(super) async fn generate(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let body = Self::request_body(model, prompt, false);
        debug!("Sending request to Ollama API");

        let json: Value = self
            .post_generate(&body, self.request_timeout)
            .await?
            .json()
            .await?;

        let text = json["response"]
            .as_str()
            .ok_or_else(|| ProviderError::response_format("missing 'response' field"))?;
        Ok(text.trim().to_owned())
    }

    #[instrument(skip(self, prompt, cancel), fields(prompt_len = prompt.len()))]
    pub(super) async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        cancel: CancelHandle,
    ) -> Result<TokenStream, ProviderError> {
        let body = Self::request_body(model, prompt, true);
        debug!("Sending streaming request to Ollama API");

        let response = self.post_generate(&body, self.stream_timeout).await?;
        Ok(ndjson_events(response.bytes_stream(), cancel))
    }
}

#[async_trait]
impl CompletionProvider for OllamaClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        self.generate(model, prompt).await
    }

    async fn stream(
        &self,
        model: &str,
        prompt: &str,
        cancel: CancelHandle,
    ) -> Result<TokenStream, ProviderError> {
        self.generate_stream(model, prompt, cancel).await
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Self::list_models(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::streaming::collect_stream;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> OllamaClient {
        OllamaClient::builder().base_url(server.url()).build()
    }

    #[tokio::test]
    async fn test_complete() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({
                "model": "mistral",
                "prompt": "hi",
                "stream": false,
                "options": {"temperature": 0.7, "top_p": 0.9}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response": "  Hello there!  ", "done": true}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let text = client.complete("mistral", "hi").await.unwrap();
        assert_eq!(text, "Hello there!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_becomes_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(404)
            .with_body("model not found")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.complete("nope", "hi").await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("404"));

        let text = client.generate_text("nope", "hi").await;
        assert!(text.starts_with("Error: HTTP 404"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let client = OllamaClient::builder()
            .base_url("http://127.0.0.1:1")
            .build();
        let text = client.generate_text("mistral", "hi").await;
        assert_eq!(text, UNREACHABLE);
        assert!(!client.health_check().await);
    }

    const UNREACHABLE: &str =
        "Error: Cannot connect to Ollama. Make sure Ollama is running (ollama serve)";

    #[tokio::test]
    async fn test_stream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_body(concat!(
                "{\"response\":\"{\\\"type\\\": \",\"done\":false}\n",
                "{\"response\":\"\\\"chat\\\"}\",\"done\":false}\n",
                "{\"response\":\"\",\"done\":true}\n",
            ))
            .create_async()
            .await;

        let client = client_for(&server);
        let stream = client
            .stream("mistral", "hi", CancelHandle::new())
            .await
            .unwrap();
        let mut tokens = 0;
        let text = collect_stream(stream, |_| tokens += 1).await.unwrap();
        assert_eq!(text, r#"{"type": "chat"}"#);
        assert_eq!(tokens, 2);
    }

    #[tokio::test]
    async fn test_list_models_sorted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models": [{"name": "mistral:latest"}, {"name": "llama3.2"}, {"size": 1}]}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let models = CompletionProvider::list_models(&client).await.unwrap();
        assert_eq!(models, vec!["llama3.2", "mistral:latest"]);
        assert!(client.health_check().await);
    }
}
