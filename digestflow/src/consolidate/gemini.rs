//! Generative Language API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use super::GenerativeClient;
use crate::cancellation::CancellationToken;
use crate::errors::{DigestError, Result};
use crate::fetch::{with_retry, RetryPolicy};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Configuration for [`GeminiClient`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key sent with every request.
    pub api_key: String,
    /// Base URL of the REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Retry policy for throttled or failed requests.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout() -> f64 {
    300.0
}

impl GeminiConfig {
    /// Creates a configuration with the given key and defaults.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            retry: RetryPolicy::default(),
        }
    }

    /// Reads the key from `GEMINI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(DigestError::Config(format!(
                "no API key given and {API_KEY_ENV} is not set"
            ))),
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Gets timeout as Duration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a negative, non-finite or overflowing
    /// `timeout_seconds`.
    pub fn timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.timeout_seconds).map_err(|e| {
            DigestError::Config(format!("invalid timeout_seconds {}: {e}", self.timeout_seconds))
        })
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

enum CallError {
    Status { status: u16, body: String },
    Transport(reqwest::Error),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "status {status}: {body}"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

/// Calls `models/{model}:generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
    token: CancellationToken,
}

impl GeminiClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key is empty, the timeout is
    /// invalid or the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(DigestError::Config("API key is empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout()?)
            .build()
            .map_err(|e| DigestError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            token: CancellationToken::new(),
        })
    }

    /// Makes retry back-off sleeps observe `token`.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    async fn call(&self, url: &str, body: &GenerateRequest<'_>) -> std::result::Result<String, CallError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(CallError::Transport)?;

        let status = response.status();
        let text = response.text().await.map_err(CallError::Transport)?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(CallError::Status {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
        };

        let policy = &self.config.retry;
        let raw = with_retry(
            policy,
            &self.token,
            model,
            |e: &CallError| match e {
                CallError::Status { status, .. } => policy.should_retry_status(*status),
                CallError::Transport(err) => err.is_timeout() || err.is_connect(),
            },
            || self.call(&url, &body),
        )
        .await
        .map_err(|e| DigestError::Generation(format!("{model}: {e}")))?;

        let parsed: GenerateResponse = serde_json::from_str(&raw)?;
        let text = parsed
            .text()
            .ok_or_else(|| DigestError::Generation(format!("{model}: response contained no text")))?;
        debug!(model, chars = text.len(), "Generation complete");
        Ok(text)
    }
}
