//! Reading the source list and writing the final document.
//!
//! Locations are either local paths or `gs://bucket/object` references.
//! [`StorageRouter`] dispatches on that prefix so the rest of the crate only
//! sees the [`BlobReader`]/[`BlobWriter`] capabilities.

mod html;
mod local;
#[cfg(feature = "http")]
mod object;
mod output;
mod source_list;

pub use html::{markdown_to_html, HTML_CONTENT_TYPE, MARKDOWN_CONTENT_TYPE};
pub use local::LocalStore;
#[cfg(feature = "http")]
pub use object::{ObjectStore, ACCESS_TOKEN_ENV};
pub use output::{preview, OutputSink, OutputTarget, PREVIEW_LINES};
pub use source_list::{parse_source_list, read_source_list};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncBufRead;

use crate::errors::{DigestError, Result};

/// URI scheme for object-store locations.
pub const OBJECT_SCHEME: &str = "gs://";

/// A readable stream opened by a [`BlobReader`].
pub type BlobStream = Box<dyn AsyncBufRead + Send + Unpin>;

/// Opens a location for reading.
#[async_trait]
pub trait BlobReader: Send + Sync {
    /// Opens `location` as a buffered byte stream.
    async fn open(&self, location: &str) -> Result<BlobStream>;
}

/// Writes a document to a location.
#[async_trait]
pub trait BlobWriter: Send + Sync {
    /// Writes `content` to `location`, replacing anything already there.
    ///
    /// Stores that keep object metadata record `content_type` with it.
    async fn write(&self, location: &str, content: &str, content_type: &str) -> Result<()>;
}

/// Whether `location` refers to the object store.
#[must_use]
pub fn is_object_location(location: &str) -> bool {
    location.starts_with(OBJECT_SCHEME)
}

/// Splits `gs://bucket/object` into bucket and object names.
///
/// # Errors
///
/// Returns an output error for anything else, including an empty bucket or
/// object name.
pub fn parse_object_location(location: &str) -> Result<(String, String)> {
    let rest = location
        .strip_prefix(OBJECT_SCHEME)
        .ok_or_else(|| DigestError::Output(format!("not an object location: {location}")))?;
    match rest.split_once('/') {
        Some((bucket, object)) if !bucket.is_empty() && !object.is_empty() => {
            Ok((bucket.to_string(), object.to_string()))
        }
        _ => Err(DigestError::Output(format!(
            "invalid object location '{location}' (expected gs://bucket/object)"
        ))),
    }
}

/// Routes `gs://` locations to an object store and everything else to the
/// local filesystem.
#[derive(Clone)]
pub struct StorageRouter {
    local: Arc<LocalStore>,
    #[cfg(feature = "http")]
    objects: Option<Arc<ObjectStore>>,
}

impl StorageRouter {
    /// Creates a router that only knows the local filesystem.
    #[must_use]
    pub fn local() -> Self {
        Self {
            local: Arc::new(LocalStore::new()),
            #[cfg(feature = "http")]
            objects: None,
        }
    }

    /// Adds an object store for `gs://` locations.
    #[cfg(feature = "http")]
    #[must_use]
    pub fn with_object_store(mut self, store: ObjectStore) -> Self {
        self.objects = Some(Arc::new(store));
        self
    }

    #[cfg(feature = "http")]
    fn object_store(&self, location: &str) -> Result<&ObjectStore> {
        self.objects.as_deref().ok_or_else(|| {
            DigestError::Config(format!(
                "{location} refers to object storage, but no object store is configured"
            ))
        })
    }

    #[cfg(feature = "http")]
    async fn open_object(&self, location: &str) -> Result<BlobStream> {
        self.object_store(location)?.open(location).await
    }

    #[cfg(feature = "http")]
    async fn write_object(&self, location: &str, content: &str, content_type: &str) -> Result<()> {
        self.object_store(location)?
            .write(location, content, content_type)
            .await
    }

    #[cfg(not(feature = "http"))]
    async fn open_object(&self, location: &str) -> Result<BlobStream> {
        Err(unsupported(location))
    }

    #[cfg(not(feature = "http"))]
    async fn write_object(&self, location: &str, _content: &str, _content_type: &str) -> Result<()> {
        Err(unsupported(location))
    }
}

#[cfg(not(feature = "http"))]
fn unsupported(location: &str) -> DigestError {
    DigestError::Config(format!(
        "{location} refers to object storage, which needs the `http` feature"
    ))
}

impl Default for StorageRouter {
    fn default() -> Self {
        Self::local()
    }
}

impl std::fmt::Debug for StorageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("StorageRouter");
        s.field("local", &self.local);
        #[cfg(feature = "http")]
        s.field("objects", &self.objects.is_some());
        s.finish()
    }
}

#[async_trait]
impl BlobReader for StorageRouter {
    async fn open(&self, location: &str) -> Result<BlobStream> {
        if is_object_location(location) {
            return self.open_object(location).await;
        }
        self.local.open(location).await
    }
}

#[async_trait]
impl BlobWriter for StorageRouter {
    async fn write(&self, location: &str, content: &str, content_type: &str) -> Result<()> {
        if is_object_location(location) {
            return self.write_object(location, content, content_type).await;
        }
        self.local.write(location, content, content_type).await
    }
}
