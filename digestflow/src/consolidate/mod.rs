//! Map/Reduce consolidation of fetched text.
//!
//! Source texts are segmented, every segment is summarized concurrently
//! (Map), and the summaries are merged by one final generation call (Reduce).

#[cfg(feature = "http")]
mod gemini;
mod map;
mod prompt;
mod rate;
mod reduce;

#[cfg(feature = "http")]
pub use gemini::{GeminiClient, GeminiConfig, API_KEY_ENV};
pub use map::{MapConfig, MapExecutor};
pub use prompt::{
    MapPromptData, PromptBuilder, ReducePromptData, DEFAULT_MAP_TEMPLATE, DEFAULT_REDUCE_TEMPLATE,
};
pub use rate::RateLimiter;
pub use reduce::{
    extract_final_payload, ReduceExecutor, FINAL_END_MARKER, FINAL_START_MARKER,
    INTERMEDIATE_SEPARATOR,
};

use async_trait::async_trait;
use tracing::info;

use crate::cancellation::CancellationToken;
use crate::errors::Result;
use crate::fetch::SourceResult;
use crate::segment::segment_sources;

/// Text generation capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Generates a completion for `prompt` with `model`.
    async fn generate(&self, prompt: &str, model: &str) -> Result<String>;
}

/// The consolidated document and what went into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consolidation {
    /// The final document.
    pub document: String,
    /// Number of segments summarized.
    pub segments: usize,
    /// Segments cut at the size limit instead of a paragraph break.
    pub forced_cuts: usize,
}

/// Runs segmentation, Map and Reduce in sequence.
#[derive(Debug)]
pub struct Consolidator {
    map: MapExecutor,
    reduce: ReduceExecutor,
    max_segment_chars: usize,
}

impl Consolidator {
    /// Creates a new consolidator.
    #[must_use]
    pub fn new(map: MapExecutor, reduce: ReduceExecutor, max_segment_chars: usize) -> Self {
        Self {
            map,
            reduce,
            max_segment_chars,
        }
    }

    /// Consolidates the successful fetch results into one document.
    ///
    /// # Errors
    ///
    /// Propagates Map and Reduce failures, including cancellation.
    pub async fn consolidate(
        &self,
        sources: &[SourceResult],
        token: &CancellationToken,
    ) -> Result<Consolidation> {
        let segmented = segment_sources(sources, self.max_segment_chars);
        info!(
            sources = sources.len(),
            total_segments = segmented.segments.len(),
            forced_cuts = segmented.forced_cuts,
            "Split content into segments"
        );

        let summaries = self.map.run(&segmented.segments, token).await?;
        let document = self.reduce.run(&summaries, token).await?;

        Ok(Consolidation {
            document,
            segments: segmented.segments.len(),
            forced_cuts: segmented.forced_cuts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DigestError;
    use std::sync::Arc;
    use std::time::Duration;

    fn consolidator(mock: MockGenerativeClient, max_chars: usize) -> Consolidator {
        let client: Arc<dyn GenerativeClient> = Arc::new(mock);
        let prompts = Arc::new(
            PromptBuilder::new()
                .with_map_template("MAP {{segment_text}}")
                .with_reduce_template("REDUCE {{combined_text}}"),
        );
        Consolidator::new(
            MapExecutor::new(
                Arc::clone(&client),
                Arc::clone(&prompts),
                MapConfig::default().with_rate_interval(Duration::ZERO),
            ),
            ReduceExecutor::new(client, prompts, "gemini-2.5-pro", Duration::from_secs(5)),
            max_chars,
        )
    }

    #[tokio::test]
    async fn test_consolidate_runs_map_then_reduce() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate()
            .withf(|prompt, _| prompt.starts_with("MAP "))
            .times(3)
            .returning(|_, _| Ok("summary".to_string()));
        mock.expect_generate()
            .withf(|prompt, _| prompt.starts_with("REDUCE "))
            .times(1)
            .returning(|_, _| Ok("<FINAL_START>final<FINAL_END>".to_string()));

        let sources = vec![
            SourceResult::success("a", "0123456789abcdef"),
            SourceResult::success("b", "short"),
        ];
        let result = consolidator(mock, 10)
            .consolidate(&sources, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.document, "final");
        assert_eq!(result.segments, 3);
        assert_eq!(result.forced_cuts, 1);
    }

    #[tokio::test]
    async fn test_map_failure_skips_reduce() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate()
            .withf(|prompt, _| prompt.starts_with("MAP "))
            .returning(|_, _| Err(DigestError::Generation("boom".to_string())));
        mock.expect_generate()
            .withf(|prompt, _| prompt.starts_with("REDUCE "))
            .never();

        let err = consolidator(mock, 100)
            .consolidate(&[SourceResult::success("a", "text")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::SegmentGeneration { .. }));
    }
}
