//! Run configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::consolidate::MapConfig;
use crate::errors::{DigestError, Result};
use crate::fetch::FetchConfig;
use crate::segment::DEFAULT_MAX_SEGMENT_CHARS;

#[cfg(feature = "http")]
use crate::consolidate::GeminiConfig;
#[cfg(feature = "http")]
use crate::fetch::HttpFetcherConfig;

/// Immutable configuration for one run.
///
/// Built once at startup and shared read-only with every component.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Generation API key. `None` means read it from the environment.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Per-call generation timeout in seconds.
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    /// Deadline for the whole run in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    /// Parallel fetch limit.
    #[serde(default = "default_fetch_concurrency")]
    pub max_fetch_concurrency: usize,
    /// Parallel Map call limit.
    #[serde(default = "default_map_concurrency")]
    pub max_map_concurrency: usize,
    /// Largest segment sent to the Map phase, in characters.
    #[serde(default = "default_max_segment_chars")]
    pub max_segment_chars: usize,
    /// Minimum spacing between Map calls in milliseconds.
    #[serde(default = "default_map_rate_interval")]
    pub map_rate_interval_ms: u64,
    /// Pause after the parallel fetch batch in milliseconds.
    #[serde(default = "default_initial_cooldown")]
    pub initial_cooldown_ms: u64,
    /// Pause before the retry pass in milliseconds.
    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_ms: u64,
    /// Model for per-segment summaries.
    #[serde(default = "default_map_model")]
    pub map_model: String,
    /// Model for the final consolidation.
    #[serde(default = "default_reduce_model")]
    pub reduce_model: String,
    /// Location of the source list.
    #[serde(default)]
    pub source_list: String,
    /// Output location. Empty prints a preview to stdout.
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_generation_timeout() -> u64 {
    300
}

fn default_run_timeout() -> u64 {
    1800
}

fn default_fetch_concurrency() -> usize {
    5
}

fn default_map_concurrency() -> usize {
    2
}

fn default_max_segment_chars() -> usize {
    DEFAULT_MAX_SEGMENT_CHARS
}

fn default_map_rate_interval() -> u64 {
    2000
}

fn default_initial_cooldown() -> u64 {
    2000
}

fn default_retry_cooldown() -> u64 {
    5000
}

fn default_map_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_reduce_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_output() -> String {
    "./output/output_reduce_final.md".to_string()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            fetch_timeout_secs: default_fetch_timeout(),
            generation_timeout_secs: default_generation_timeout(),
            run_timeout_secs: default_run_timeout(),
            max_fetch_concurrency: default_fetch_concurrency(),
            max_map_concurrency: default_map_concurrency(),
            max_segment_chars: default_max_segment_chars(),
            map_rate_interval_ms: default_map_rate_interval(),
            initial_cooldown_ms: default_initial_cooldown(),
            retry_cooldown_ms: default_retry_cooldown(),
            map_model: default_map_model(),
            reduce_model: default_reduce_model(),
            source_list: String::new(),
            output: default_output(),
        }
    }
}

impl RunOptions {
    /// Creates options for `source_list` with defaults for everything else.
    #[must_use]
    pub fn new(source_list: impl Into<String>) -> Self {
        Self {
            source_list: source_list.into(),
            ..Self::default()
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the output location.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Sets the fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the generation timeout.
    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the run deadline.
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the parallel fetch limit.
    #[must_use]
    pub fn with_max_fetch_concurrency(mut self, limit: usize) -> Self {
        self.max_fetch_concurrency = limit;
        self
    }

    /// Sets the parallel Map call limit.
    #[must_use]
    pub fn with_max_map_concurrency(mut self, limit: usize) -> Self {
        self.max_map_concurrency = limit;
        self
    }

    /// Sets the segment size limit.
    #[must_use]
    pub fn with_max_segment_chars(mut self, chars: usize) -> Self {
        self.max_segment_chars = chars;
        self
    }

    /// Sets the Map rate interval.
    #[must_use]
    pub fn with_map_rate_interval(mut self, interval: Duration) -> Self {
        self.map_rate_interval_ms = millis(interval);
        self
    }

    /// Sets both fetch cool-downs.
    #[must_use]
    pub fn with_cooldowns(mut self, initial: Duration, retry: Duration) -> Self {
        self.initial_cooldown_ms = millis(initial);
        self.retry_cooldown_ms = millis(retry);
        self
    }

    /// Sets the Map model.
    #[must_use]
    pub fn with_map_model(mut self, model: impl Into<String>) -> Self {
        self.map_model = model.into();
        self
    }

    /// Sets the Reduce model.
    #[must_use]
    pub fn with_reduce_model(mut self, model: impl Into<String>) -> Self {
        self.reduce_model = model.into();
        self
    }

    /// Gets the fetch timeout as a Duration.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Gets the generation timeout as a Duration.
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Gets the run deadline as a Duration.
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Checks the options for values no run can use.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.source_list.trim().is_empty() {
            return Err(DigestError::Config("source list path is required".to_string()));
        }
        if self.map_model.trim().is_empty() {
            return Err(DigestError::Config("map model must not be empty".to_string()));
        }
        if self.reduce_model.trim().is_empty() {
            return Err(DigestError::Config("reduce model must not be empty".to_string()));
        }
        if self.max_segment_chars == 0 {
            return Err(DigestError::Config(
                "max segment size must be at least 1 character".to_string(),
            ));
        }
        Ok(())
    }

    /// Derives the fetch stage configuration.
    #[must_use]
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::new()
            .with_max_concurrency(self.max_fetch_concurrency)
            .with_initial_cooldown(Duration::from_millis(self.initial_cooldown_ms))
            .with_retry_cooldown(Duration::from_millis(self.retry_cooldown_ms))
    }

    /// Derives the Map phase configuration.
    #[must_use]
    pub fn map_config(&self) -> MapConfig {
        MapConfig::new()
            .with_max_concurrency(self.max_map_concurrency)
            .with_rate_interval(Duration::from_millis(self.map_rate_interval_ms))
            .with_model(self.map_model.clone())
            .with_timeout(self.generation_timeout())
    }

    /// Derives the HTTP fetcher configuration.
    #[cfg(feature = "http")]
    #[must_use]
    pub fn http_fetcher_config(&self) -> HttpFetcherConfig {
        HttpFetcherConfig::new().with_timeout(self.fetch_timeout())
    }

    /// Derives the generation client configuration, falling back to the
    /// environment when no key was given.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Config`] if no key is available.
    #[cfg(feature = "http")]
    pub fn gemini_config(&self) -> Result<GeminiConfig> {
        let config = match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => GeminiConfig::new(key),
            _ => GeminiConfig::from_env()?,
        };
        Ok(config.with_timeout(self.generation_timeout()))
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("generation_timeout_secs", &self.generation_timeout_secs)
            .field("run_timeout_secs", &self.run_timeout_secs)
            .field("max_fetch_concurrency", &self.max_fetch_concurrency)
            .field("max_map_concurrency", &self.max_map_concurrency)
            .field("max_segment_chars", &self.max_segment_chars)
            .field("map_rate_interval_ms", &self.map_rate_interval_ms)
            .field("initial_cooldown_ms", &self.initial_cooldown_ms)
            .field("retry_cooldown_ms", &self.retry_cooldown_ms)
            .field("map_model", &self.map_model)
            .field("reduce_model", &self.reduce_model)
            .field("source_list", &self.source_list)
            .field("output", &self.output)
            .finish()
    }
}
