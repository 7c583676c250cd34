//! Paragraph-aware text segmentation.
//!
//! Long source texts are cut into pieces of at most `max_chars` Unicode code
//! points before the Map phase. Cuts prefer the last paragraph break
//! (`"\n\n"`) in the back half of each window and fall back to a hard cut at
//! exactly `max_chars`. The pieces always concatenate back to the input.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fetch::SourceResult;

/// The paragraph separator cuts are aligned to.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Default maximum segment size in code points.
pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 400_000;

/// A bounded slice of one source's text, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// The segment text.
    pub text: String,
    /// Identifier of the source this text came from.
    pub source_id: String,
}

impl Segment {
    /// Creates a new segment.
    #[must_use]
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
        }
    }
}

/// Pieces of one text plus how many of the cuts were forced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation<'a> {
    /// Consecutive slices of the input, in order.
    pub pieces: Vec<&'a str>,
    /// Cuts made at `max_chars` because no acceptable separator existed.
    pub forced_cuts: usize,
}

/// Splits `text` into pieces of at most `max_chars` code points.
///
/// A `max_chars` of zero is treated as one.
#[must_use]
pub fn segment_text(text: &str, max_chars: usize) -> Vec<&str> {
    split_paragraph_aware(text, max_chars).pieces
}

/// Like [`segment_text`], also reporting the number of forced cuts.
#[must_use]
pub fn split_paragraph_aware(text: &str, max_chars: usize) -> Segmentation<'_> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut forced_cuts = 0;
    let mut rest = text;

    while !rest.is_empty() {
        // Byte offset of the first code point past the window.
        let Some((window_end, _)) = rest.char_indices().nth(max_chars) else {
            pieces.push(rest);
            break;
        };
        let window = &rest[..window_end];

        let cut = match window.rfind(PARAGRAPH_SEPARATOR) {
            Some(sep) if window[..sep].chars().count() > max_chars / 2 => {
                sep + PARAGRAPH_SEPARATOR.len()
            }
            _ => {
                warn!(
                    forced_chars = max_chars,
                    "No paragraph break in the back half of the window; cutting at the size limit"
                );
                forced_cuts += 1;
                window_end
            }
        };

        pieces.push(&rest[..cut]);
        rest = &rest[cut..];
    }

    Segmentation {
        pieces,
        forced_cuts,
    }
}

/// Segments produced from a batch of sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentedSources {
    /// All segments, grouped by source in input order.
    pub segments: Vec<Segment>,
    /// Total forced cuts across all sources.
    pub forced_cuts: usize,
}

/// Segments each source's content, keeping per-source order.
#[must_use]
pub fn segment_sources(results: &[SourceResult], max_chars: usize) -> SegmentedSources {
    let mut out = SegmentedSources::default();

    for result in results {
        let split = split_paragraph_aware(&result.content, max_chars);
        debug!(
            source = %result.source_id,
            segments = split.pieces.len(),
            forced_cuts = split.forced_cuts,
            "Segmented source"
        );
        out.forced_cuts += split.forced_cuts;
        out.segments.extend(
            split
                .pieces
                .into_iter()
                .map(|piece| Segment::new(piece, result.source_id.clone())),
        );
    }

    out
}
