//! Subscriber setup and phase timing.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::errors::Phase;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs the global `tracing` subscriber, writing to stderr.
///
/// The level defaults to `info` (`debug` when `verbose`) and can be overridden
/// with `RUST_LOG`. Returns `false` if a subscriber was already installed.
pub fn init_tracing(format: LogFormat, verbose: bool) -> bool {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

/// Measures one phase of a run and logs its completion.
#[derive(Debug)]
pub struct PhaseTimer {
    phase: Phase,
    start: Instant,
}

impl PhaseTimer {
    /// Starts timing `phase`.
    #[must_use]
    pub fn start(phase: Phase) -> Self {
        info!(phase = %phase, "Phase started");
        Self {
            phase,
            start: Instant::now(),
        }
    }

    /// Returns the phase being timed.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Logs completion and returns the phase duration.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!(
            phase = %self.phase,
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "Phase complete"
        );
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        let _ = init_tracing(LogFormat::Json, false);
        assert!(!init_tracing(LogFormat::Pretty, true));
    }

    #[test]
    fn test_phase_timer_reports_phase() {
        let timer = PhaseTimer::start(Phase::ContentFetch);
        assert_eq!(timer.phase(), Phase::ContentFetch);
        assert!(timer.elapsed_ms() >= 0.0);
        let _ = timer.finish();
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
