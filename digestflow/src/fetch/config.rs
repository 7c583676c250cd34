//! Configuration for the resilient batch fetcher.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Concurrency used when a non-positive limit is supplied.
pub const FALLBACK_CONCURRENCY: usize = 10;

/// Configuration for [`ResilientFetcher`](super::ResilientFetcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of sources fetched at once. Zero means the fallback.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Delay after the parallel batch, in milliseconds.
    #[serde(default = "default_initial_cooldown_ms")]
    pub initial_cooldown_ms: u64,
    /// Delay before the sequential retry pass, in milliseconds.
    #[serde(default = "default_retry_cooldown_ms")]
    pub retry_cooldown_ms: u64,
}

fn default_max_concurrency() -> usize {
    FALLBACK_CONCURRENCY
}

fn default_initial_cooldown_ms() -> u64 {
    2000
}

fn default_retry_cooldown_ms() -> u64 {
    5000
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            initial_cooldown_ms: default_initial_cooldown_ms(),
            retry_cooldown_ms: default_retry_cooldown_ms(),
        }
    }
}

impl FetchConfig {
    /// Creates a new fetch configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Sets the delay after the parallel batch.
    #[must_use]
    pub fn with_initial_cooldown(mut self, delay: Duration) -> Self {
        self.initial_cooldown_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the delay before the retry pass.
    #[must_use]
    pub fn with_retry_cooldown(mut self, delay: Duration) -> Self {
        self.retry_cooldown_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The concurrency limit actually used, never zero.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrency == 0 {
            FALLBACK_CONCURRENCY
        } else {
            self.max_concurrency
        }
    }

    /// Gets the post-batch cool-down as a Duration.
    #[must_use]
    pub fn initial_cooldown(&self) -> Duration {
        Duration::from_millis(self.initial_cooldown_ms)
    }

    /// Gets the pre-retry cool-down as a Duration.
    #[must_use]
    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.effective_concurrency(), 10);
        assert_eq!(config.initial_cooldown(), Duration::from_secs(2));
        assert_eq!(config.retry_cooldown(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_concurrency_falls_back() {
        let config = FetchConfig::new().with_max_concurrency(0);
        assert_eq!(config.effective_concurrency(), FALLBACK_CONCURRENCY);
        let config = FetchConfig::new().with_max_concurrency(3);
        assert_eq!(config.effective_concurrency(), 3);
    }

    #[test]
    fn test_fetch_config_serde_defaults() {
        let config: FetchConfig = serde_json::from_str(r#"{"max_concurrency": 4}"#).unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.retry_cooldown_ms, 5000);
    }
}
