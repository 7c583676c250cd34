//! Choosing and writing the final output.

use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{
    is_object_location, markdown_to_html, parse_object_location, BlobWriter, HTML_CONTENT_TYPE,
    MARKDOWN_CONTENT_TYPE,
};
use crate::errors::{DigestError, Result};

/// Lines shown when the document is previewed on stdout.
pub const PREVIEW_LINES: usize = 10;

/// Where the final document goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Print a preview to standard output.
    Stdout,
    /// An object in a storage bucket.
    Object {
        /// Bucket name.
        bucket: String,
        /// Object name.
        object: String,
    },
    /// A local file.
    File(String),
}

impl OutputTarget {
    /// Picks the target for a configured output path.
    ///
    /// # Errors
    ///
    /// Returns an output error for a malformed `gs://` location.
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        if path.is_empty() {
            Ok(Self::Stdout)
        } else if is_object_location(path) {
            let (bucket, object) = parse_object_location(path)?;
            Ok(Self::Object { bucket, object })
        } else {
            Ok(Self::File(path.to_string()))
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Object { bucket, object } => write!(f, "gs://{bucket}/{object}"),
            Self::File(path) => f.write_str(path),
        }
    }
}

/// Returns the first `lines` lines of `document`, followed by `...` when
/// anything was cut.
#[must_use]
pub fn preview(document: &str, lines: usize) -> String {
    let all: Vec<&str> = document.split('\n').collect();
    let mut out = all[..all.len().min(lines)].join("\n");
    if all.len() > lines {
        out.push_str("\n...");
    }
    out
}

/// Delivers the final document to its target.
///
/// Nothing is written until [`deliver`](Self::deliver) is called with a
/// finished document.
#[derive(Clone)]
pub struct OutputSink {
    writer: Arc<dyn BlobWriter>,
    preview_lines: usize,
}

impl OutputSink {
    /// Creates a sink writing files and objects through `writer`.
    #[must_use]
    pub fn new(writer: Arc<dyn BlobWriter>) -> Self {
        Self {
            writer,
            preview_lines: PREVIEW_LINES,
        }
    }

    /// Sets how many lines the stdout preview shows.
    #[must_use]
    pub fn with_preview_lines(mut self, lines: usize) -> Self {
        self.preview_lines = lines;
        self
    }

    /// Writes `document` to `target`.
    ///
    /// Object targets receive the document rendered as an HTML page; files
    /// keep the Markdown as generated.
    ///
    /// # Errors
    ///
    /// Returns an output error if the write fails.
    pub async fn deliver(&self, target: &OutputTarget, document: &str) -> Result<()> {
        match target {
            OutputTarget::Stdout => {
                let text = format!(
                    "\n--- Output preview ---\n{}\n----------------------\n",
                    preview(document, self.preview_lines)
                );
                let mut stdout = tokio::io::stdout();
                stdout
                    .write_all(text.as_bytes())
                    .await
                    .map_err(|e| DigestError::Output(format!("failed to write preview: {e}")))?;
                stdout
                    .flush()
                    .await
                    .map_err(|e| DigestError::Output(format!("failed to write preview: {e}")))?;
            }
            OutputTarget::Object { .. } => {
                let page = markdown_to_html(document);
                debug!(target = %target, bytes = page.len(), "Rendered Markdown as HTML");
                self.writer
                    .write(&target.to_string(), &page, HTML_CONTENT_TYPE)
                    .await?;
            }
            OutputTarget::File(path) => {
                self.writer
                    .write(path, document, MARKDOWN_CONTENT_TYPE)
                    .await?;
            }
        }
        info!(target = %target, chars = document.chars().count(), "Output written");
        Ok(())
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("preview_lines", &self.preview_lines)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_targets() {
        assert_eq!(OutputTarget::parse("").unwrap(), OutputTarget::Stdout);
        assert_eq!(
            OutputTarget::parse("gs://reports/daily.md").unwrap(),
            OutputTarget::Object {
                bucket: "reports".to_string(),
                object: "daily.md".to_string()
            }
        );
        assert_eq!(
            OutputTarget::parse("./output/out.md").unwrap(),
            OutputTarget::File("./output/out.md".to_string())
        );
        assert!(OutputTarget::parse("gs://bucket-only").is_err());
    }

    #[test]
    fn test_target_display_round_trips_location() {
        let target = OutputTarget::parse("gs://b/dir/o.md").unwrap();
        assert_eq!(target.to_string(), "gs://b/dir/o.md");
    }

    #[test]
    fn test_preview_truncates_with_ellipsis() {
        let doc = (1..=12).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let shown = preview(&doc, 10);
        assert!(shown.starts_with("line 1\n"));
        assert!(shown.ends_with("line 10\n..."));
    }

    #[test]
    fn test_preview_short_document_unchanged() {
        assert_eq!(preview("a\nb", 10), "a\nb");
    }

    #[tokio::test]
    async fn test_deliver_file_goes_through_writer() {
        let store = Arc::new(MemoryStore::new());
        let sink = OutputSink::new(store.clone());
        let target = OutputTarget::parse("out/final.md").unwrap();

        sink.deliver(&target, "# Final").await.unwrap();

        assert_eq!(store.get("out/final.md"), Some("# Final".to_string()));
        assert_eq!(
            store.content_type("out/final.md").as_deref(),
            Some(MARKDOWN_CONTENT_TYPE)
        );
    }

    #[tokio::test]
    async fn test_deliver_object_renders_html() {
        let store = Arc::new(MemoryStore::new());
        let sink = OutputSink::new(store.clone());
        let target = OutputTarget::parse("gs://reports/daily.html").unwrap();

        sink.deliver(&target, "# Final\n\nBody text.").await.unwrap();

        let page = store.get("gs://reports/daily.html").unwrap();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<h1>Final</h1>"));
        assert!(page.contains("<p>Body text.</p>"));
        assert_eq!(
            store.content_type("gs://reports/daily.html").as_deref(),
            Some(HTML_CONTENT_TYPE)
        );
    }
}
