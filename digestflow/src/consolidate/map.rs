//! The concurrent Map phase.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info};

use super::{GenerativeClient, MapPromptData, PromptBuilder, RateLimiter};
use crate::cancellation::CancellationToken;
use crate::errors::{DigestError, Result};
use crate::segment::Segment;

/// Configuration for [`MapExecutor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Maximum concurrent generation calls. Values below 1 mean 1.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Minimum spacing between generation calls, in milliseconds.
    #[serde(default = "default_rate_interval_ms")]
    pub rate_interval_ms: u64,
    /// Model used for every segment.
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
}

fn default_max_concurrency() -> usize {
    2
}

fn default_rate_interval_ms() -> u64 {
    2000
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_timeout() -> f64 {
    300.0
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            rate_interval_ms: default_rate_interval_ms(),
            model: default_model(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl MapConfig {
    /// Creates a new map configuration with defaults.
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

    /// Sets the rate interval.
    #[must_use]
    pub fn with_rate_interval(mut self, interval: Duration) -> Self {
        self.rate_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// The concurrency limit actually used, at least 1.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    /// Gets the rate interval as a Duration.
    #[must_use]
    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.rate_interval_ms)
    }

    /// Gets the per-call timeout as a Duration.
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

struct MapOutcome {
    index: usize,
    summary: Result<String>,
}

/// Summarizes segments concurrently under a shared rate limit.
pub struct MapExecutor {
    client: Arc<dyn GenerativeClient>,
    prompts: Arc<PromptBuilder>,
    config: MapConfig,
}

impl MapExecutor {
    /// Creates a new map executor.
    #[must_use]
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        prompts: Arc<PromptBuilder>,
        config: MapConfig,
    ) -> Self {
        Self {
            client,
            prompts,
            config,
        }
    }

    /// Gets the configuration.
    #[must_use]
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Summarizes every segment, failing if any one segment fails.
    ///
    /// Summaries are returned ordered by segment position. No partial list is
    /// ever returned.
    ///
    /// # Errors
    ///
    /// Returns the first failure reported, as [`DigestError::SegmentGeneration`]
    /// or [`DigestError::Cancelled`].
    pub async fn run(&self, segments: &[Segment], token: &CancellationToken) -> Result<Vec<String>> {
        let concurrency = self.config.effective_concurrency();
        let timeout = self.config.timeout()?;
        info!(
            total_segments = segments.len(),
            max_parallel = concurrency,
            rate_interval_ms = self.config.rate_interval_ms,
            model = %self.config.model,
            "Starting map phase"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let limiter = Arc::new(RateLimiter::new(self.config.rate_interval()));
        let (tx, mut rx) = mpsc::channel(segments.len().max(1));

        for (index, segment) in segments.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                () = token.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                let _ = tx
                    .send(MapOutcome {
                        index,
                        summary: Err(token.error()),
                    })
                    .await;
                continue;
            };

            let worker = Worker {
                client: Arc::clone(&self.client),
                prompts: Arc::clone(&self.prompts),
                limiter: Arc::clone(&limiter),
                model: self.config.model.clone(),
                timeout,
                token: token.clone(),
            };
            let segment = segment.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let summary = worker.summarize(index, &segment).await;
                let _ = tx.send(MapOutcome { index, summary }).await;
            });
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(segments.len());
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }

        let mut summaries = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            summaries.push((outcome.index, outcome.summary?));
        }
        if summaries.len() != segments.len() {
            return Err(DigestError::Generation(format!(
                "{} of {} map workers did not report",
                segments.len() - summaries.len(),
                segments.len()
            )));
        }
        summaries.sort_by_key(|(index, _)| *index);

        info!(summaries = summaries.len(), "Map phase complete");
        Ok(summaries.into_iter().map(|(_, summary)| summary).collect())
    }
}

impl std::fmt::Debug for MapExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct Worker {
    client: Arc<dyn GenerativeClient>,
    prompts: Arc<PromptBuilder>,
    limiter: Arc<RateLimiter>,
    model: String,
    timeout: Duration,
    token: CancellationToken,
}

impl Worker {
    async fn summarize(&self, index: usize, segment: &Segment) -> Result<String> {
        self.token
            .run_until_cancelled(self.limiter.acquire())
            .await?;

        let failed = |message: String| DigestError::SegmentGeneration {
            index: index + 1,
            source_id: segment.source_id.clone(),
            message,
        };

        let prompt = self
            .prompts
            .build_map(MapPromptData {
                segment_text: &segment.text,
                source_url: &segment.source_id,
            })
            .map_err(|e| failed(e.to_string()))?;

        debug!(segment = index + 1, source = %segment.source_id, "Generating segment summary");
        let call = tokio::time::timeout(self.timeout, self.client.generate(&prompt, &self.model));
        match self.token.run_until_cancelled(call).await? {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(_) => Err(failed(format!(
                "generation timed out after {}s",
                self.timeout.as_secs_f64()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::MockGenerativeClient;
    use pretty_assertions::assert_eq;

    fn segments(n: usize) -> Vec<Segment> {
        (0..n)
            .map(|i| Segment::new(format!("text {i}"), format!("https://example.com/{i}")))
            .collect()
    }

    fn executor(mock: MockGenerativeClient) -> MapExecutor {
        MapExecutor::new(
            Arc::new(mock),
            Arc::new(PromptBuilder::new().with_map_template("{{segment_text}}")),
            MapConfig::default().with_rate_interval(Duration::from_millis(10)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_returns_one_summary_per_segment_in_order() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate()
            .times(3)
            .returning(|prompt, _| Ok(format!("summary of {prompt}")));

        let summaries = executor(mock)
            .run(&segments(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            summaries,
            vec!["summary of text 0", "summary of text 1", "summary of text 2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_uses_configured_model() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate()
            .withf(|_, model| model.to_string() == "gemini-2.5-flash")
            .returning(|_, _| Ok("ok".to_string()));

        let result = executor(mock).run(&segments(2), &CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_fails_fast_on_any_segment_error() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate().returning(|prompt, _| {
            if prompt == "text 1" {
                Err(DigestError::Generation("quota exceeded".to_string()))
            } else {
                Ok("fine".to_string())
            }
        });

        let err = executor(mock)
            .run(&segments(3), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            DigestError::SegmentGeneration {
                index, source_id, ..
            } => {
                assert_eq!(index, 2);
                assert_eq!(source_id, "https://example.com/1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_map_cancelled_skips_generation() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate().never();

        let token = CancellationToken::new();
        token.cancel("deadline");
        let err = executor(mock).run(&segments(2), &token).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_timeout_is_segment_error() {
        struct Slow;

        #[async_trait::async_trait]
        impl GenerativeClient for Slow {
            async fn generate(&self, _prompt: &str, _model: &str) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok("late".to_string())
            }
        }

        let executor = MapExecutor::new(
            Arc::new(Slow),
            Arc::new(PromptBuilder::new()),
            MapConfig::default().with_timeout(Duration::from_secs(1)),
        );
        let err = executor
            .run(&segments(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::SegmentGeneration { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_negative_timeout_is_config_error() {
        let config: MapConfig = serde_json::from_str(r#"{"timeout_seconds": -1.0}"#).unwrap();
        assert!(matches!(config.timeout(), Err(DigestError::Config(_))));

        let config = MapConfig {
            timeout_seconds: f64::NAN,
            ..MapConfig::default()
        };
        assert!(matches!(config.timeout(), Err(DigestError::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_timeout_fails_before_generation() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate().never();

        let executor = MapExecutor::new(
            Arc::new(mock),
            Arc::new(PromptBuilder::new()),
            MapConfig {
                timeout_seconds: -5.0,
                ..MapConfig::default()
            },
        );
        let err = executor
            .run(&segments(2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::Config(_)));
    }

    #[test]
    fn test_concurrency_normalized_to_one() {
        assert_eq!(MapConfig::new().with_max_concurrency(0).effective_concurrency(), 1);
    }
}
