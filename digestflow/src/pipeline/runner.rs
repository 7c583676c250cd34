//! Pipeline execution.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::RunOptions;
use crate::cancellation::CancellationToken;
use crate::consolidate::{
    Consolidation, Consolidator, GenerativeClient, MapExecutor, PromptBuilder, ReduceExecutor,
};
use crate::errors::{Phase, Result};
use crate::fetch::{FetchOutcome, Fetcher, ResilientFetcher};
use crate::io::{read_source_list, BlobReader, BlobWriter, OutputSink, OutputTarget};
use crate::observability::{PhaseTimer, RunReport};

/// A configured run, built with [`PipelineBuilder`](super::PipelineBuilder).
///
/// Phases run strictly in order. Every fatal error is labelled with the
/// phase it came from, and nothing is written on failure.
pub struct Pipeline {
    pub(super) options: Arc<RunOptions>,
    pub(super) reader: Arc<dyn BlobReader>,
    pub(super) writer: Arc<dyn BlobWriter>,
    pub(super) fetcher: Arc<dyn Fetcher>,
    pub(super) generator: Arc<dyn GenerativeClient>,
    pub(super) prompts: Arc<PromptBuilder>,
    pub(super) target: OutputTarget,
}

impl Pipeline {
    /// Gets the run options.
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Gets the output target.
    #[must_use]
    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    /// Runs the pipeline under a fresh token armed with the run deadline.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::execute`].
    pub async fn run(&self) -> Result<RunReport> {
        let token = CancellationToken::new();
        token.cancel_after(self.options.run_timeout());
        let result = self.execute(&token).await;
        token.cancel("run finished");
        result
    }

    /// Runs every phase under `token`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error wrapped with its phase. Cancellation is
    /// reported as [`DigestError::Cancelled`](crate::errors::DigestError::Cancelled)
    /// inside the wrapping.
    pub async fn execute(&self, token: &CancellationToken) -> Result<RunReport> {
        let started = Instant::now();
        let mut report = RunReport::begin();
        info!(
            run_id = %report.run_id,
            source_list = %self.options.source_list,
            output = %self.target,
            "Starting run"
        );

        let sources = self
            .load_sources(token)
            .await
            .map_err(|e| e.in_phase(Phase::UrlGeneration))?;
        report.total_sources = sources.len();

        let fetched = self
            .fetch(&sources, token)
            .await
            .map_err(|e| e.in_phase(Phase::ContentFetch))?;
        report.initial_successes = fetched.initial_successes;
        report.retried_successes = fetched.retried_successes;
        report.failed_sources = fetched.failed.clone();

        let consolidation = self
            .consolidate(&fetched, token)
            .await
            .map_err(|e| e.in_phase(Phase::Consolidation))?;
        report.segments = consolidation.segments;
        report.forced_cuts = consolidation.forced_cuts;
        report.document_chars = consolidation.document.chars().count();
        report.output = self.target.to_string();

        report.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        report.emit();
        Ok(report)
    }

    async fn load_sources(&self, token: &CancellationToken) -> Result<Vec<String>> {
        let timer = PhaseTimer::start(Phase::UrlGeneration);
        let sources = token
            .run_until_cancelled(read_source_list(
                self.reader.as_ref(),
                &self.options.source_list,
            ))
            .await??;
        timer.finish();
        Ok(sources)
    }

    async fn fetch(&self, sources: &[String], token: &CancellationToken) -> Result<FetchOutcome> {
        let timer = PhaseTimer::start(Phase::ContentFetch);
        let fetcher = ResilientFetcher::new(Arc::clone(&self.fetcher), self.options.fetch_config());
        let outcome = fetcher.fetch_all(sources, token).await?;
        timer.finish();
        Ok(outcome)
    }

    async fn consolidate(
        &self,
        fetched: &FetchOutcome,
        token: &CancellationToken,
    ) -> Result<Consolidation> {
        let timer = PhaseTimer::start(Phase::Consolidation);
        let consolidator = Consolidator::new(
            MapExecutor::new(
                Arc::clone(&self.generator),
                Arc::clone(&self.prompts),
                self.options.map_config(),
            ),
            ReduceExecutor::new(
                Arc::clone(&self.generator),
                Arc::clone(&self.prompts),
                self.options.reduce_model.clone(),
                self.options.generation_timeout(),
            ),
            self.options.max_segment_chars,
        );
        let consolidation = consolidator.consolidate(&fetched.successful, token).await?;

        token.check()?;
        OutputSink::new(Arc::clone(&self.writer))
            .deliver(&self.target, &consolidation.document)
            .await?;
        info!(output = %self.target, "Final document written");
        timer.finish();
        Ok(consolidation)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
