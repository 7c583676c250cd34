//! Cloud Storage objects over the JSON API.

use async_trait::async_trait;
use std::io::Cursor;
use tracing::debug;

use super::{parse_object_location, BlobReader, BlobStream, BlobWriter};
use crate::errors::{DigestError, Result};

/// Environment variable holding an OAuth access token for storage requests.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Reads and writes `gs://bucket/object` locations.
#[derive(Clone)]
pub struct ObjectStore {
    http: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

impl ObjectStore {
    /// Creates a store for the public endpoint with no credentials.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
        }
    }

    /// Creates a store using the access token from `GOOGLE_OAUTH_ACCESS_TOKEN`,
    /// if set.
    #[must_use]
    pub fn from_env(http: reqwest::Client) -> Self {
        let token = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::new(http).with_access_token(token)
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn object_url(&self, bucket: &str, object: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| DigestError::Config(format!("invalid storage endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| DigestError::Config("storage endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn upload_url(&self, bucket: &str, object: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| DigestError::Config(format!("invalid storage endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| DigestError::Config("storage endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BlobReader for ObjectStore {
    async fn open(&self, location: &str) -> Result<BlobStream> {
        let (bucket, object) = parse_object_location(location)
            .map_err(|e| DigestError::SourceList(e.to_string()))?;
        let url = self.object_url(&bucket, &object)?;

        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| DigestError::SourceList(format!("failed to read {location}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::SourceList(format!(
                "failed to read {location}: status {status}"
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DigestError::SourceList(format!("failed to read {location}: {e}")))?;
        debug!(location, bytes = bytes.len(), "Read object");
        Ok(Box::new(Cursor::new(bytes.to_vec())))
    }
}

#[async_trait]
impl BlobWriter for ObjectStore {
    async fn write(&self, location: &str, content: &str, content_type: &str) -> Result<()> {
        let (bucket, object) = parse_object_location(location)?;
        let url = self.upload_url(&bucket, &object)?;

        let response = self
            .authorize(self.http.post(url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(content.to_string())
            .send()
            .await
            .map_err(|e| DigestError::Output(format!("failed to write {location}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DigestError::Output(format!(
                "failed to write {location}: status {status}: {body}"
            )));
        }
        debug!(location, bytes = content.len(), content_type, "Wrote object");
        Ok(())
    }
}
