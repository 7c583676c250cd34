//! The single wide event summarizing a finished run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Summary of a completed run, emitted once as a structured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Sources listed in the input.
    pub total_sources: usize,
    /// Sources fetched in the parallel batch.
    pub initial_successes: usize,
    /// Sources fetched only on retry.
    pub retried_successes: usize,
    /// Sources dropped after the retry pass.
    pub failed_sources: Vec<String>,
    /// Segments summarized in the Map phase.
    pub segments: usize,
    /// Segments cut at the size limit.
    pub forced_cuts: usize,
    /// Where the document was written.
    pub output: String,
    /// Characters in the final document.
    pub document_chars: usize,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
}

impl RunReport {
    /// Starts a report for a new run.
    #[must_use]
    pub fn begin() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            total_sources: 0,
            initial_successes: 0,
            retried_successes: 0,
            failed_sources: Vec::new(),
            segments: 0,
            forced_cuts: 0,
            output: String::new(),
            document_chars: 0,
            duration_ms: 0.0,
        }
    }

    /// Sources that ended with usable content.
    #[must_use]
    pub fn successful_sources(&self) -> usize {
        self.initial_successes + self.retried_successes
    }

    /// Builds the event payload.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let serde_json::Value::Object(ref mut map) = payload {
            map.insert(
                "successful_sources".to_string(),
                serde_json::json!(self.successful_sources()),
            );
        }
        payload
    }

    /// Logs the report as one `run.wide` event.
    pub fn emit(&self) {
        info!(
            event = "run.wide",
            run_id = %self.run_id,
            payload = %self.to_payload(),
            "Run complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_includes_counts() {
        let mut report = RunReport::begin();
        report.total_sources = 3;
        report.initial_successes = 2;
        report.retried_successes = 1;
        report.output = "stdout".to_string();

        let payload = report.to_payload();
        assert_eq!(payload["successful_sources"], 3);
        assert_eq!(payload["initial_successes"], 2);
        assert_eq!(payload["output"], "stdout");
        assert_eq!(payload["run_id"], report.run_id.to_string());
    }

    #[test]
    fn test_begin_assigns_fresh_ids() {
        assert_ne!(RunReport::begin().run_id, RunReport::begin().run_id);
    }
}
