//! Batch fetching with bounded concurrency and a one-shot retry pass.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use super::{classify, shorten_error_message, FetchConfig, Fetcher, SourceResult};
use crate::cancellation::CancellationToken;
use crate::errors::{DigestError, FetchErrorKind, Result};

/// What a batch fetch produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Sources with usable content; initial successes first, then retried ones.
    pub successful: Vec<SourceResult>,
    /// Sources that succeeded in the parallel batch.
    pub initial_successes: usize,
    /// Sources that succeeded only in the retry pass.
    pub retried_successes: usize,
    /// Sources that failed both attempts.
    pub failed: Vec<String>,
}

/// Fetches a batch of sources through a [`Fetcher`].
///
/// The parallel batch, the cool-downs and the sequential retry pass are strict
/// barriers: each completes fully before the next begins.
pub struct ResilientFetcher {
    fetcher: Arc<dyn Fetcher>,
    config: FetchConfig,
}

impl ResilientFetcher {
    /// Creates a new resilient fetcher.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, config: FetchConfig) -> Self {
        Self { fetcher, config }
    }

    /// Gets the configuration.
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches every source, retries failures once, and returns the usable set.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::BatchExhausted`] when nothing usable was fetched,
    /// or [`DigestError::Cancelled`] when `token` fires before the stage ends.
    pub async fn fetch_all(
        &self,
        sources: &[String],
        token: &CancellationToken,
    ) -> Result<FetchOutcome> {
        info!(
            sources = sources.len(),
            concurrency = self.config.effective_concurrency(),
            "Starting parallel fetch"
        );

        let results = self.fetch_parallel(sources, token).await;

        info!(
            delay_ms = self.config.initial_cooldown_ms,
            "Parallel fetch complete; cooling down"
        );
        token.sleep(self.config.initial_cooldown()).await?;

        let (mut successful, failed) = classify(results);
        let initial_successes = successful.len();

        let mut still_failed = Vec::new();
        let mut retried_successes = 0;
        if !failed.is_empty() {
            warn!(
                failed = failed.len(),
                delay_ms = self.config.retry_cooldown_ms,
                "Some sources failed; retrying sequentially after cool-down"
            );
            token.sleep(self.config.retry_cooldown()).await?;

            for source_id in failed {
                token.check()?;
                let result = self.fetch_one(&source_id, token).await;
                if result.is_successful() {
                    info!(source = %source_id, "Source succeeded on retry");
                    retried_successes += 1;
                    successful.push(result);
                } else {
                    let err = result
                        .error
                        .unwrap_or(FetchErrorKind::NoBody)
                        .into_error(&source_id);
                    if err.is_cancellation() {
                        return Err(token.error());
                    }
                    warn!(
                        source = %source_id,
                        error = %shorten_error_message(&err.to_string()),
                        "Source failed again on retry; dropping"
                    );
                    still_failed.push(source_id);
                }
            }
        }

        info!(
            successful = successful.len(),
            total = sources.len(),
            initial_successful = initial_successes,
            retry_successful = retried_successes,
            "Fetch stage complete"
        );

        if successful.is_empty() {
            token.check()?;
            return Err(DigestError::BatchExhausted {
                attempted: sources.len(),
            });
        }

        Ok(FetchOutcome {
            successful,
            initial_successes,
            retried_successes,
            failed: still_failed,
        })
    }

    /// Fetches every source concurrently, returning results in input order.
    ///
    /// Sources not started before cancellation are reported with
    /// [`FetchErrorKind::Cancelled`].
    pub async fn fetch_parallel(
        &self,
        sources: &[String],
        token: &CancellationToken,
    ) -> Vec<SourceResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.effective_concurrency()));
        let (tx, mut rx) = mpsc::channel(sources.len().max(1));

        for (index, source_id) in sources.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                () = token.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                let reason = token.reason().unwrap_or_default();
                let result = SourceResult::failure(source_id, FetchErrorKind::Cancelled(reason));
                let _ = tx.send((index, result)).await;
                continue;
            };

            let fetcher = Arc::clone(&self.fetcher);
            let token = token.clone();
            let tx = tx.clone();
            let source_id = source_id.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let result = fetch_source(fetcher.as_ref(), &source_id, &token).await;
                // The receiver outlives every sender.
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<SourceResult>> = vec![None; sources.len()];
        while let Some((index, result)) = rx.recv().await {
            debug!(
                source = %result.source_id,
                ok = result.is_successful(),
                "Fetch finished"
            );
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .zip(sources)
            .map(|(slot, source_id)| {
                slot.unwrap_or_else(|| {
                    SourceResult::failure(
                        source_id,
                        FetchErrorKind::Transport("fetch task aborted".to_string()),
                    )
                })
            })
            .collect()
    }

    async fn fetch_one(&self, source_id: &str, token: &CancellationToken) -> SourceResult {
        fetch_source(self.fetcher.as_ref(), source_id, token).await
    }
}

impl std::fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn fetch_source(
    fetcher: &dyn Fetcher,
    source_id: &str,
    token: &CancellationToken,
) -> SourceResult {
    if token.is_cancelled() {
        let reason = token.reason().unwrap_or_default();
        return SourceResult::failure(source_id, FetchErrorKind::Cancelled(reason));
    }

    match token.run_until_cancelled(fetcher.fetch(source_id)).await {
        Err(cancelled) => {
            SourceResult::failure(source_id, FetchErrorKind::Cancelled(cancelled.to_string()))
        }
        Ok(Err(e)) => SourceResult::failure(source_id, FetchErrorKind::Transport(e.to_string())),
        Ok(Ok(extraction)) => SourceResult::from_extraction(source_id, extraction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Extraction, MockFetcher};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_succeed_without_retry() {
        let mut mock = MockFetcher::new();
        mock.expect_fetch()
            .times(2)
            .returning(|id| Ok(Extraction::found(format!("body of {id}"))));

        let fetcher = ResilientFetcher::new(Arc::new(mock), FetchConfig::default());
        let outcome = fetcher
            .fetch_all(&ids(&["a", "b"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.initial_successes, 2);
        assert_eq!(outcome.retried_successes, 0);
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.successful[0].content, "body of a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_source_retried_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        let mut mock = MockFetcher::new();
        mock.expect_fetch().returning(move |id| {
            if id == "flaky" && a.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DigestError::TransientFetch {
                    source_id: id.to_string(),
                    reason: "connection reset".to_string(),
                })
            } else {
                Ok(Extraction::found("ok"))
            }
        });

        let fetcher = ResilientFetcher::new(Arc::new(mock), FetchConfig::default());
        let outcome = fetcher
            .fetch_all(&ids(&["a", "flaky"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.initial_successes, 1);
        assert_eq!(outcome.retried_successes, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failing_is_batch_exhausted() {
        let mut mock = MockFetcher::new();
        mock.expect_fetch()
            .times(4)
            .returning(|_| Ok(Extraction::not_found()));

        let fetcher = ResilientFetcher::new(Arc::new(mock), FetchConfig::default());
        let err = fetcher
            .fetch_all(&ids(&["a", "b"]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DigestError::BatchExhausted { attempted: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_without_body_on_retry_is_dropped() {
        let mut mock = MockFetcher::new();
        mock.expect_fetch().returning(|id| {
            if id == "empty" {
                Ok(Extraction::found("   "))
            } else {
                Ok(Extraction::found("body"))
            }
        });

        let fetcher = ResilientFetcher::new(Arc::new(mock), FetchConfig::default());
        let outcome = fetcher
            .fetch_all(&ids(&["a", "empty", "b"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.initial_successes, 2);
        assert_eq!(outcome.retried_successes, 0);
        assert_eq!(outcome.failed, vec!["empty".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_fetcher() {
        let mut mock = MockFetcher::new();
        mock.expect_fetch().never();

        let token = CancellationToken::new();
        token.cancel("shutdown");
        let fetcher = ResilientFetcher::new(Arc::new(mock), FetchConfig::default());

        let results = fetcher.fetch_parallel(&ids(&["a", "b"]), &token).await;
        assert!(results
            .iter()
            .all(|r| matches!(r.error, Some(FetchErrorKind::Cancelled(_)))));

        let err = fetcher.fetch_all(&ids(&["a"]), &token).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_cooldown() {
        let mut mock = MockFetcher::new();
        mock.expect_fetch().returning(|_| Ok(Extraction::found("x")));

        let token = CancellationToken::new();
        token.cancel_after(Duration::from_millis(500));
        let fetcher = ResilientFetcher::new(Arc::new(mock), FetchConfig::default());

        let err = fetcher.fetch_all(&ids(&["a"]), &token).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_results_keep_input_order() {
        let mut mock = MockFetcher::new();
        mock.expect_fetch()
            .returning(|id| Ok(Extraction::found(id.to_string())));

        let fetcher = ResilientFetcher::new(
            Arc::new(mock),
            FetchConfig::default().with_max_concurrency(2),
        );
        let sources = ids(&["s1", "s2", "s3", "s4", "s5"]);
        let results = fetcher
            .fetch_parallel(&sources, &CancellationToken::new())
            .await;

        let got: Vec<_> = results.iter().map(|r| r.content.clone()).collect();
        assert_eq!(got, sources);
    }
}
