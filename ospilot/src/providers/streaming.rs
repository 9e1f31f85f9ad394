//! Token streaming for completion providers.
//!
//! Ollama streams newline-delimited JSON fragments. [`NdjsonStreamParser`]
//! splits the byte stream into lines and [`ndjson_events`] turns those lines
//! into a cancellable stream of [`StreamEvent`]s. [`StreamBuffer`] and
//! [`JsonAssembler`] are consumer-side helpers for batching tokens and
//! recovering JSON from a partial response.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::schema::{extract_json, first_json_object};

/// Default number of tokens per [`StreamBuffer`] chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// One event of a token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A generated text fragment.
    Token(String),
    /// The stream finished; carries the concatenation of every token.
    Complete(String),
    /// The stream failed; no further events follow.
    Error(String),
}

/// A stream of [`StreamEvent`]s.
pub type TokenStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Caller-visible cancellation flag for a stream or scheduled task.
///
/// Clones share the flag. [`cancelled`](Self::cancelled) lets a task wake
/// on cancellation instead of polling.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    /// Create an un-cancelled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every task waiting on it.
    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Newline-delimited JSON line splitter over a byte stream.
#[derive(Debug)]
pub struct NdjsonStreamParser<S> {
    inner: S,
    buffer: String,
}

impl<S> NdjsonStreamParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    /// Create a new NDJSON stream parser.
    pub const fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: String::new(),
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.find('\n')?;
        let rest = self.buffer.split_off(pos + 1);
        let mut line = std::mem::replace(&mut self.buffer, rest);
        line.truncate(pos);
        Some(line)
    }
}

impl<S> Stream for NdjsonStreamParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(line) = self.next_line() {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    return Poll::Ready(Some(Ok(trimmed.to_owned())));
                }
                continue;
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(ProviderError::stream(e.to_string()))));
                }
                Poll::Ready(None) => {
                    let remaining = std::mem::take(&mut self.buffer);
                    let trimmed = remaining.trim();
                    if trimmed.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Ok(trimmed.to_owned())));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// One `/api/generate` stream fragment.
#[derive(Debug, Deserialize)]
struct GenerateFragment {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

/// Turn an Ollama NDJSON byte stream into [`StreamEvent`]s.
///
/// Malformed fragments are logged and skipped. Cancelling ends the stream
/// without an error event, even while it is waiting on a stalled body.
/// A body that ends without a `done` fragment still completes with the text
/// received so far.
pub fn ndjson_events<S>(bytes: S, cancel: CancelHandle) -> TokenStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    Box::pin(stream! {
        let mut lines = NdjsonStreamParser::new(bytes);
        let mut full_text = String::new();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                line = lines.next() => Some(line),
            };
            let Some(line) = next else {
                debug!(received = full_text.len(), "Stream cancelled");
                return;
            };
            let Some(line) = line else {
                break;
            };
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    yield StreamEvent::Error(e.to_string());
                    return;
                }
            };
            let fragment: GenerateFragment = match serde_json::from_str(&line) {
                Ok(fragment) => fragment,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed stream fragment");
                    continue;
                }
            };
            if let Some(error) = fragment.error {
                yield StreamEvent::Error(error);
                return;
            }
            if !fragment.response.is_empty() {
                full_text.push_str(&fragment.response);
                yield StreamEvent::Token(fragment.response);
            }
            if fragment.done {
                break;
            }
        }

        if !cancel.is_cancelled() {
            debug!(length = full_text.len(), "Stream completed");
            yield StreamEvent::Complete(full_text);
        }
    })
}

/// Drive a token stream to the end, calling `on_token` for every token.
///
/// Returns the full text on completion, or the text received so far when the
/// stream was cancelled.
pub async fn collect_stream<F>(mut stream: TokenStream, mut on_token: F) -> Result<String, ProviderError>
where
    F: FnMut(&str) + Send,
{
    let mut received = String::new();
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Token(token) => {
                on_token(&token);
                received.push_str(&token);
            }
            StreamEvent::Complete(full_text) => return Ok(full_text),
            StreamEvent::Error(message) => return Err(ProviderError::stream(message)),
        }
    }
    Ok(received)
}

/// Batches streamed tokens into chunks of a fixed token count.
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    tokens: Vec<String>,
    chunk_size: usize,
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl StreamBuffer {
    /// Create a buffer that yields a chunk every `chunk_size` tokens.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tokens: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    /// Add a token; returns the joined chunk once the buffer is full.
    pub fn push(&mut self, token: impl Into<String>) -> Option<String> {
        self.tokens.push(token.into());
        (self.tokens.len() >= self.chunk_size).then(|| self.drain())
    }

    /// Return whatever is buffered, if anything.
    pub fn flush(&mut self) -> Option<String> {
        (!self.tokens.is_empty()).then(|| self.drain())
    }

    /// Buffered text without draining.
    #[must_use]
    pub fn content(&self) -> String {
        self.tokens.concat()
    }

    fn drain(&mut self) -> String {
        let chunk = self.tokens.concat();
        self.tokens.clear();
        chunk
    }
}

/// Accumulates streamed tokens and recovers JSON objects as they complete.
#[derive(Debug, Clone, Default)]
pub struct JsonAssembler {
    buffer: String,
    last: Option<Value>,
}

impl JsonAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token; returns a newly completed object, if this token closed one.
    ///
    /// Incomplete or malformed text is not an error; the assembler simply
    /// waits for more tokens.
    pub fn push(&mut self, token: &str) -> Option<Value> {
        self.buffer.push_str(token);
        if !token.contains('}') {
            return None;
        }
        let object = first_json_object(&self.buffer)?;
        if self.last.as_ref() == Some(&object) {
            return None;
        }
        debug!(object = %object, "Assembled JSON object from stream");
        self.last = Some(object.clone());
        Some(object)
    }

    /// Final extraction over everything received.
    #[must_use]
    pub fn finish(self) -> Option<Value> {
        extract_json(&self.buffer).or(self.last)
    }
}
