//! Error types for digestflow.
//!
//! Per-source fetch failures are carried as [`FetchErrorKind`] values inside
//! [`SourceResult`](crate::fetch::SourceResult)s and never abort a run on their
//! own. Everything that does abort a run is a [`DigestError`], wrapped with the
//! [`Phase`] it came from before it reaches the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The three phases of a run, used to label fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Reading and validating the list of sources.
    UrlGeneration,
    /// Parallel fetch plus the retry pass.
    ContentFetch,
    /// Map/Reduce consolidation and writing the result.
    Consolidation,
}

impl Phase {
    /// Returns the human-readable phase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UrlGeneration => "URL generation",
            Self::ContentFetch => "content fetch",
            Self::Consolidation => "AI cleanup and output",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for digestflow operations.
#[derive(Debug, Error)]
pub enum DigestError {
    /// A single source could not be fetched or extracted.
    #[error("Fetch failed for '{source_id}': {reason}")]
    TransientFetch {
        /// The source identifier.
        source_id: String,
        /// The underlying failure.
        reason: String,
    },

    /// The source was fetched but no usable body was extracted.
    #[error("No body extracted from '{source_id}'")]
    EmptyContent {
        /// The source identifier.
        source_id: String,
    },

    /// Every source failed, including the retry pass.
    #[error("No usable content could be fetched from any of the {attempted} sources")]
    BatchExhausted {
        /// Number of sources that were attempted.
        attempted: usize,
    },

    /// A Map-phase segment failed.
    #[error("Segment {index} from '{source_id}' failed: {message}")]
    SegmentGeneration {
        /// 1-based segment number.
        index: usize,
        /// Source the segment came from.
        source_id: String,
        /// The underlying failure.
        message: String,
    },

    /// The single Reduce call failed.
    #[error("Reduce failed: {0}")]
    Reduce(String),

    /// A cancellation or deadline was observed.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The generation service returned an error.
    #[error("Generation error: {0}")]
    Generation(String),

    /// A prompt could not be rendered.
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// The source list was missing, unreadable or empty.
    #[error("Source list error: {0}")]
    SourceList(String),

    /// The final document could not be written.
    #[error("Output error: {0}")]
    Output(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A fatal error labelled with the phase that produced it.
    #[error("{phase} failed: {source}")]
    InPhase {
        /// The failing phase.
        phase: Phase,
        /// The root cause.
        #[source]
        source: Box<DigestError>,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DigestError {
    /// Wraps this error with the phase it occurred in.
    ///
    /// Already-wrapped errors keep their original phase.
    #[must_use]
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            wrapped @ Self::InPhase { .. } => wrapped,
            other => Self::InPhase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Returns the phase this error was wrapped with, if any.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::InPhase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Returns the innermost error, looking through phase wrapping.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::InPhase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the run stopped because of cancellation or a deadline.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self.root(), Self::Cancelled(_))
    }
}

/// Why a single source produced no usable content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Network or extraction failure reported by the fetch capability.
    Transport(String),
    /// The fetch succeeded but no body text was found.
    NoBody,
    /// Cancellation was observed before the fetch started.
    Cancelled(String),
}

impl FetchErrorKind {
    /// Lifts this kind into the error taxonomy for the given source.
    #[must_use]
    pub fn into_error(self, source_id: impl Into<String>) -> DigestError {
        let source_id = source_id.into();
        match self {
            Self::Transport(reason) => DigestError::TransientFetch { source_id, reason },
            Self::NoBody => DigestError::EmptyContent { source_id },
            Self::Cancelled(reason) => DigestError::Cancelled(reason),
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(reason) => write!(f, "transport failure: {reason}"),
            Self::NoBody => f.write_str("no body extracted"),
            Self::Cancelled(reason) => write!(f, "cancelled: {reason}"),
        }
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, DigestError>;
