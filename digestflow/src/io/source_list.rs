//! Parsing the newline-delimited list of sources.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

use super::BlobReader;
use crate::errors::{DigestError, Result};

/// Reads source identifiers, one per line.
///
/// Lines are trimmed; blank lines and lines starting with `#` are skipped.
///
/// # Errors
///
/// Returns a source-list error if the stream cannot be read.
pub async fn parse_source_list<R>(reader: R) -> Result<Vec<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sources = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| DigestError::SourceList(format!("failed to read source list: {e}")))?
    {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        sources.push(line.to_string());
    }
    Ok(sources)
}

/// Opens `location` through `reader` and parses it as a source list.
///
/// # Errors
///
/// Fails if the location cannot be opened or read, or lists no sources.
pub async fn read_source_list(reader: &dyn BlobReader, location: &str) -> Result<Vec<String>> {
    if location.trim().is_empty() {
        return Err(DigestError::SourceList(
            "no source list given".to_string(),
        ));
    }
    let stream = reader.open(location).await?;
    let sources = parse_source_list(stream).await?;
    if sources.is_empty() {
        return Err(DigestError::SourceList(format!(
            "{location} does not list any sources"
        )));
    }
    info!(location, count = sources.len(), "Loaded source list");
    Ok(sources)
}
