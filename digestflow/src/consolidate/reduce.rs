//! The single-call Reduce phase and final payload extraction.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{GenerativeClient, PromptBuilder, ReducePromptData};
use crate::cancellation::CancellationToken;
use crate::errors::{DigestError, Result};

/// Separator placed after each intermediate summary when joining them.
pub const INTERMEDIATE_SEPARATOR: &str = "\n\n--- INTERMEDIATE SUMMARY END ---\n\n";

/// Marker the model is asked to put before the final document.
pub const FINAL_START_MARKER: &str = "<FINAL_START>";

/// Marker the model is asked to put after the final document.
pub const FINAL_END_MARKER: &str = "<FINAL_END>";

/// Pulls the final document out of a marker-wrapped response.
///
/// Falls back to the whole trimmed response when either marker is missing
/// or the markers are out of order.
#[must_use]
pub fn extract_final_payload(response: &str) -> String {
    let start = response.find(FINAL_START_MARKER);
    let end = response.find(FINAL_END_MARKER);

    match (start, end) {
        (Some(start), Some(end)) if start < end => response
            [start + FINAL_START_MARKER.len()..end]
            .trim()
            .to_string(),
        _ => {
            warn!("Final markers missing or out of order; using the whole response");
            response.trim().to_string()
        }
    }
}

/// Consolidates all intermediate summaries with one generation call.
pub struct ReduceExecutor {
    client: Arc<dyn GenerativeClient>,
    prompts: Arc<PromptBuilder>,
    model: String,
    timeout: Duration,
}

impl ReduceExecutor {
    /// Creates a new reduce executor.
    #[must_use]
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        prompts: Arc<PromptBuilder>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            prompts,
            model: model.into(),
            timeout,
        }
    }

    /// Gets the model used for the Reduce call.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Joins `summaries`, runs the Reduce call and extracts the final document.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Reduce`] if the prompt cannot be built or the
    /// call fails, or [`DigestError::Cancelled`] on cancellation.
    pub async fn run(&self, summaries: &[String], token: &CancellationToken) -> Result<String> {
        let combined = summaries.join(INTERMEDIATE_SEPARATOR);
        info!(
            summaries = summaries.len(),
            chars = combined.chars().count(),
            model = %self.model,
            "Starting reduce phase"
        );

        let prompt = self
            .prompts
            .build_reduce(ReducePromptData {
                combined_text: &combined,
            })
            .map_err(|e| DigestError::Reduce(e.to_string()))?;

        let call = tokio::time::timeout(self.timeout, self.client.generate(&prompt, &self.model));
        let response = match token.run_until_cancelled(call).await? {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(DigestError::Reduce(e.to_string())),
            Err(_) => {
                return Err(DigestError::Reduce(format!(
                    "generation timed out after {}s",
                    self.timeout.as_secs_f64()
                )))
            }
        };

        Ok(extract_final_payload(&response))
    }
}

impl std::fmt::Debug for ReduceExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReduceExecutor")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::MockGenerativeClient;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_between_markers() {
        assert_eq!(
            extract_final_payload("noise<FINAL_START> clean text <FINAL_END>trailing"),
            "clean text"
        );
    }

    #[test]
    fn test_extract_missing_end_marker() {
        assert_eq!(
            extract_final_payload("  <FINAL_START> partial answer \n"),
            "<FINAL_START> partial answer"
        );
    }

    #[test]
    fn test_extract_reversed_markers() {
        let response = "<FINAL_END> a <FINAL_START>";
        assert_eq!(extract_final_payload(response), response);
    }

    #[test]
    fn test_extract_no_markers() {
        assert_eq!(extract_final_payload("\n# Doc\n"), "# Doc");
    }

    #[tokio::test]
    async fn test_reduce_joins_with_separator_and_uses_reduce_model() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate()
            .times(1)
            .withf(|prompt, model| {
                prompt.to_string() == "a\n\n--- INTERMEDIATE SUMMARY END ---\n\nb"
                    && model.to_string() == "gemini-2.5-pro"
            })
            .returning(|_, _| Ok("<FINAL_START>\nmerged\n<FINAL_END>".to_string()));

        let reduce = ReduceExecutor::new(
            Arc::new(mock),
            Arc::new(PromptBuilder::new().with_reduce_template("{{combined_text}}")),
            "gemini-2.5-pro",
            Duration::from_secs(5),
        );
        let doc = reduce
            .run(&["a".to_string(), "b".to_string()], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(doc, "merged");
    }

    #[tokio::test]
    async fn test_reduce_call_failure_is_reduce_error() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate()
            .returning(|_, _| Err(DigestError::Generation("503".to_string())));

        let reduce = ReduceExecutor::new(
            Arc::new(mock),
            Arc::new(PromptBuilder::new()),
            "m",
            Duration::from_secs(5),
        );
        let err = reduce
            .run(&["a".to_string()], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::Reduce(_)));
    }

    #[tokio::test]
    async fn test_reduce_with_no_summaries_fails_before_calling() {
        let mut mock = MockGenerativeClient::new();
        mock.expect_generate().never();

        let reduce = ReduceExecutor::new(
            Arc::new(mock),
            Arc::new(PromptBuilder::new()),
            "m",
            Duration::from_secs(5),
        );
        let err = reduce.run(&[], &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DigestError::Reduce(_)));
    }
}
