//! Local filesystem storage.

use async_trait::async_trait;
use std::path::Path;
use tokio::io::BufReader;
use tracing::debug;

use super::{BlobReader, BlobStream, BlobWriter};
use crate::errors::{DigestError, Result};

/// Reads and writes files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl LocalStore {
    /// Creates a new local store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BlobReader for LocalStore {
    async fn open(&self, location: &str) -> Result<BlobStream> {
        let file = tokio::fs::File::open(location)
            .await
            .map_err(|e| DigestError::SourceList(format!("failed to open {location}: {e}")))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[async_trait]
impl BlobWriter for LocalStore {
    async fn write(&self, location: &str, content: &str, _content_type: &str) -> Result<()> {
        let path = Path::new(location);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DigestError::Output(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| DigestError::Output(format!("failed to write {location}: {e}")))?;
        debug!(path = location, bytes = content.len(), "Wrote file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MARKDOWN_CONTENT_TYPE;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/deeper/out.md");
        let location = target.to_str().unwrap();

        LocalStore::new()
            .write(location, "# Title\n", MARKDOWN_CONTENT_TYPE)
            .await
            .unwrap();

        let written = std::fs::read_to_string(&target).unwrap();
        assert_eq!(written, "# Title\n");
    }

    #[tokio::test]
    async fn test_open_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "https://example.com\n").unwrap();

        let mut stream = LocalStore::new().open(path.to_str().unwrap()).await.unwrap();
        let mut text = String::new();
        stream.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "https://example.com\n");
    }

    #[tokio::test]
    async fn test_open_missing_file_is_source_list_error() {
        let err = LocalStore::new()
            .open("/definitely/not/here.txt")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DigestError::SourceList(_)));
    }
}
