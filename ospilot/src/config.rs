//! Configuration file handling.
//!
//! The configuration is one JSON document with `ollama`, `retry`, `agent` and
//! `store` sections. Every field has a default, so a partial or missing file is
//! fine. `OLLAMA_HOST` and `OSPILOT_MODEL` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::providers::ollama::{
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STREAM_TIMEOUT_SECS, OLLAMA_API_BASE_URL,
};
use crate::providers::streaming::DEFAULT_CHUNK_SIZE;
use crate::store::DEFAULT_DB_FILE;
use crate::tool::RetryConfig;
use crate::tool::caller::{DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT};

/// Model used when nothing else selects one.
pub const DEFAULT_MODEL: &str = "mistral";

const APP_DIR: &str = "ospilot";
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding [`OllamaConfig::base_url`].
pub const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";
/// Environment variable overriding [`OllamaConfig::model`].
pub const ENV_MODEL: &str = "OSPILOT_MODEL";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Completion backend.
    pub ollama: OllamaConfig,
    /// Tool-call retry policy.
    pub retry: RetrySettings,
    /// Command agent behaviour.
    pub agent: AgentConfig,
    /// State store location.
    pub store: StoreConfig,
}

/// Ollama connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Server base URL.
    pub base_url: String,
    /// Model id.
    pub model: String,
    /// Timeout of a non-streaming request, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout of a whole streaming request, in seconds.
    pub stream_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: OLLAMA_API_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT_SECS,
        }
    }
}

/// Retry policy as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per tool call.
    pub max_attempts: u32,
    /// Exponential backoff base, in seconds.
    pub backoff_factor: f64,
    /// Per-attempt timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff_factor: settings.backoff_factor,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

/// Command agent behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Request completions as token streams.
    pub use_streaming: bool,
    /// Dispatch through the retrying tool caller instead of a single attempt.
    pub use_retry: bool,
    /// Messages of chat context sent with each chat turn.
    pub history_window: usize,
    /// Tokens per chunk delivered to the streaming callback.
    pub chunk_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            use_streaming: false,
            use_retry: true,
            history_window: 5,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// State store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; the user data directory when unset.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// The database file to open.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_db_path)
    }
}

/// Default configuration file location.
#[must_use]
pub fn default_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Default database location.
#[must_use]
pub fn default_db_path() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(DEFAULT_DB_FILE)
}

impl Config {
    /// Read the configuration at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Read the configuration at [`default_path`], or the defaults if there is none.
    pub async fn load_default() -> Result<Self, ConfigError> {
        let path = default_path();
        if tokio::fs::try_exists(&path).await? {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration to `path` as pretty JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Apply `OLLAMA_HOST` and `OSPILOT_MODEL` from the process environment.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup(ENV_OLLAMA_HOST).filter(|h| !h.trim().is_empty()) {
            self.ollama.base_url = normalize_host(&host);
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
            self.ollama.model = model.trim().to_owned();
        }
        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama.model.trim().is_empty() {
            return Err(ConfigError::invalid("ollama.model must not be empty"));
        }
        if self.ollama.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("ollama.base_url must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts must be at least 1"));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor <= 0.0 {
            return Err(ConfigError::invalid("retry.backoff_factor must be positive"));
        }
        if self.agent.chunk_size == 0 {
            return Err(ConfigError::invalid("agent.chunk_size must be at least 1"));
        }
        Ok(())
    }
}

/// `OLLAMA_HOST` may omit the scheme, as the Ollama CLI allows.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("http://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.ollama.model, "mistral");
        assert_eq!(config.ollama.request_timeout_secs, 60);
        assert_eq!(config.ollama.stream_timeout_secs, 300);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.agent.use_retry);
        assert!(!config.agent.use_streaming);
        assert_eq!(config.agent.history_window, 5);
        assert!(config.validate().is_ok());

        let retry = RetryConfig::from(&config.retry);
        assert_eq!(retry, RetryConfig::default());
    }

    #[tokio::test]
    async fn test_partial_file_and_round_trip() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("config.json");
        file.write_str(r#"{"ollama": {"model": "llama3.2"}, "agent": {"use_streaming": true}}"#)
            .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.ollama.model, "llama3.2");
        assert_eq!(config.ollama.base_url, OLLAMA_API_BASE_URL);
        assert!(config.agent.use_streaming);

        let saved = dir.child("nested/config.json");
        config.save(saved.path()).await.unwrap();
        let written = std::fs::read_to_string(saved.path()).unwrap();
        assert!(written.contains("\"model\": \"llama3.2\""));
        assert_eq!(Config::load(saved.path()).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_invalid_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("config.json");
        file.write_str(r#"{"retry": {"max_attempts": 0}}"#).unwrap();
        assert!(matches!(
            Config::load(file.path()).await,
            Err(ConfigError::Invalid(_))
        ));

        file.write_str("{not json").unwrap();
        assert!(matches!(
            Config::load(file.path()).await,
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_overrides(|key| match key {
            ENV_OLLAMA_HOST => Some("192.168.1.20:11434/".into()),
            ENV_MODEL => Some(" phi3 ".into()),
            _ => None,
        });
        assert_eq!(config.ollama.base_url, "http://192.168.1.20:11434");
        assert_eq!(config.ollama.model, "phi3");

        let untouched = Config::default().with_overrides(|_| Some(String::new()));
        assert_eq!(untouched, Config::default());
    }
}
