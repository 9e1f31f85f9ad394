//! Ollama provider.
//!
//! Talks to a local Ollama server through `POST /api/generate`, either as one
//! request/response or as an NDJSON token stream.

mod client;
mod completion;

pub use client::{
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STREAM_TIMEOUT_SECS, OLLAMA_API_BASE_URL, OllamaClient,
    OllamaClientBuilder,
};
