//! Fetching source content.
//!
//! The [`Fetcher`] trait is the narrow per-source capability; the
//! [`ResilientFetcher`] drives it across a batch with bounded concurrency,
//! cool-down delays and one sequential retry pass.

mod config;
#[cfg(feature = "http")]
mod http;
mod resilient;
mod retry;

pub use config::FetchConfig;
#[cfg(feature = "http")]
pub use http::{ExtractionConfig, HttpFetcher, HttpFetcherConfig};
pub use resilient::{FetchOutcome, ResilientFetcher};
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{FetchErrorKind, Result};

/// Text extracted from one source by a [`Fetcher`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// The extracted body text.
    pub text: String,
    /// Whether a body was located at all.
    pub body_found: bool,
}

impl Extraction {
    /// An extraction that located a body.
    #[must_use]
    pub fn found(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            body_found: true,
        }
    }

    /// An extraction that located no body.
    #[must_use]
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Per-source fetch capability.
///
/// Cancellation of an in-flight call happens by dropping the returned future.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches and extracts the text body of `source_id`.
    async fn fetch(&self, source_id: &str) -> Result<Extraction>;
}

/// The outcome of fetching one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResult {
    /// The source identifier (typically a URL).
    pub source_id: String,
    /// Extracted text, possibly empty.
    pub content: String,
    /// Why the source produced no usable content, if it did not.
    pub error: Option<FetchErrorKind>,
}

impl SourceResult {
    /// A successful result.
    #[must_use]
    pub fn success(source_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            content: content.into(),
            error: None,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(source_id: impl Into<String>, error: FetchErrorKind) -> Self {
        Self {
            source_id: source_id.into(),
            content: String::new(),
            error: Some(error),
        }
    }

    /// Builds a result from a fetcher's extraction.
    ///
    /// A missing body or whitespace-only text becomes [`FetchErrorKind::NoBody`]
    /// even though the call itself succeeded.
    #[must_use]
    pub fn from_extraction(source_id: impl Into<String>, extraction: Extraction) -> Self {
        if !extraction.body_found || extraction.text.trim().is_empty() {
            return Self::failure(source_id, FetchErrorKind::NoBody);
        }
        Self::success(source_id, extraction.text)
    }

    /// Whether this result carries usable content.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.error.is_none() && !self.content.is_empty()
    }
}

/// Splits results into successful ones and the identifiers of failed ones.
///
/// Every input appears in exactly one of the two outputs.
#[must_use]
pub fn classify(results: Vec<SourceResult>) -> (Vec<SourceResult>, Vec<String>) {
    let mut successful = Vec::new();
    let mut failed = Vec::new();
    for result in results {
        if result.is_successful() {
            successful.push(result);
        } else {
            failed.push(result.source_id);
        }
    }
    (successful, failed)
}

/// Shortens transport error text for logging.
///
/// Drops any echoed response body and keeps only the last reported error
/// when the message chains several attempts.
#[must_use]
pub fn shorten_error_message(message: &str) -> String {
    let mut msg = message;
    if let Some(idx) = msg.find(", body: <") {
        msg = &msg[..idx];
    }
    if let Some(idx) = msg.rfind("last error:") {
        return msg[idx..].trim().to_string();
    }
    msg.to_string()
}
