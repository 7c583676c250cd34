//! HTTP fetcher that downloads pages and extracts their readable text.

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use super::{with_retry, Extraction, Fetcher, RetryPolicy};
use crate::cancellation::CancellationToken;
use crate::errors::{DigestError, Result};

static BLANK_RUNS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").ok());

static INLINE_SPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").ok());

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "pre", "blockquote", "h1", "h2",
    "h3", "h4", "h5", "h6", "tr", "table", "dd", "dt", "figcaption", "body",
];

/// Configuration for body-text extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// CSS selectors tried in order to locate the main content.
    #[serde(default = "default_content_selectors")]
    pub main_content_selectors: Vec<String>,
    /// CSS selectors whose content is dropped.
    #[serde(default = "default_remove_selectors")]
    pub remove_selectors: Vec<String>,
}

fn default_content_selectors() -> Vec<String> {
    [
        "article",
        "main",
        "[role=\"main\"]",
        "#content",
        ".content",
        ".post-content",
        ".article-content",
        ".entry-content",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_remove_selectors() -> Vec<String> {
    [
        "script", "style", "noscript", "iframe", "svg", "nav", "footer", "header", "aside",
        ".sidebar", ".cookie-banner", ".advertisement",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            main_content_selectors: default_content_selectors(),
            remove_selectors: default_remove_selectors(),
        }
    }
}

impl ExtractionConfig {
    /// Creates a new extraction configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a main content selector.
    #[must_use]
    pub fn with_content_selector(mut self, selector: impl Into<String>) -> Self {
        self.main_content_selectors.push(selector.into());
        self
    }

    /// Adds a selector to remove.
    #[must_use]
    pub fn with_remove_selector(mut self, selector: impl Into<String>) -> Self {
        self.remove_selectors.push(selector.into());
        self
    }

    /// Extracts readable text from an HTML document.
    ///
    /// The first main-content selector that matches wins; otherwise `<body>`
    /// is used. `body_found` is false only when neither yields any text.
    #[must_use]
    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);

        let removed: Vec<Selector> = self
            .remove_selectors
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect();

        for selector in &self.main_content_selectors {
            let Ok(sel) = Selector::parse(selector) else {
                debug!(selector, "Skipping invalid content selector");
                continue;
            };
            if let Some(root) = document.select(&sel).next() {
                let text = element_text(root, &removed);
                if !text.is_empty() {
                    return Extraction::found(text);
                }
            }
        }

        let body = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(|root| element_text(root, &removed))
            .unwrap_or_default();

        if body.is_empty() {
            Extraction::not_found()
        } else {
            Extraction::found(body)
        }
    }
}

/// Collects text below `root`, separating block elements with blank lines.
fn element_text(root: ElementRef<'_>, removed: &[Selector]) -> String {
    let mut out = String::new();
    let mut last_block = None;

    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let dropped = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| removed.iter().any(|sel| sel.matches(&el)));
        if dropped {
            continue;
        }
        let piece = replace_all(&INLINE_SPACE, text.trim(), " ");
        if piece.is_empty() {
            continue;
        }

        let block = node.ancestors().find(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| BLOCK_TAGS.contains(&e.name()))
        });

        if !out.is_empty() {
            out.push_str(if block == last_block { " " } else { "\n\n" });
        }
        out.push_str(&piece);
        last_block = block;
    }

    replace_all(&BLANK_RUNS, out.trim(), "\n\n")
}

fn replace_all(pattern: &Option<Regex>, text: &str, with: &str) -> String {
    match pattern {
        Some(re) => re.replace_all(text, with).into_owned(),
        None => text.to_string(),
    }
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpFetcherConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum response size in bytes.
    #[serde(default = "default_max_size")]
    pub max_response_size: usize,
    /// Transport retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Body extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

fn default_timeout() -> f64 {
    15.0
}

fn default_user_agent() -> String {
    concat!("digestflow/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            max_response_size: default_max_size(),
            retry: RetryPolicy::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl HttpFetcherConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the transport retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Gets timeout as Duration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a negative, non-finite or overflowing
    /// `timeout_seconds`.
    pub fn timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.timeout_seconds).map_err(|e| {
            DigestError::Config(format!("invalid timeout_seconds {}: {e}", self.timeout_seconds))
        })
    }
}

enum AttemptError {
    Status { status: u16, body: String },
    TooLarge(usize),
    Transport(reqwest::Error),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "status {status}, body: {body}"),
            Self::TooLarge(size) => write!(f, "response of {size} bytes exceeds limit"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

/// Downloads pages over HTTP and extracts their main text.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: HttpFetcherConfig,
    token: CancellationToken,
}

impl HttpFetcher {
    /// Creates a new HTTP fetcher.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the timeout is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout()?)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DigestError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            token: CancellationToken::new(),
        })
    }

    /// Makes retry back-off sleeps observe `token`.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Gets the configuration.
    #[must_use]
    pub fn config(&self) -> &HttpFetcherConfig {
        &self.config
    }

    async fn download(&self, url: &str) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(AttemptError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(AttemptError::Transport)?;
        if !status.is_success() {
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.len() > self.config.max_response_size {
            return Err(AttemptError::TooLarge(body.len()));
        }
        Ok(body)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source_id: &str) -> Result<Extraction> {
        let policy = &self.config.retry;
        let html = with_retry(
            policy,
            &self.token,
            source_id,
            |e: &AttemptError| match e {
                AttemptError::Status { status, .. } => policy.should_retry_status(*status),
                AttemptError::TooLarge(_) => false,
                AttemptError::Transport(err) => !err.is_builder() && !err.is_redirect(),
            },
            || self.download(source_id),
        )
        .await
        .map_err(|e| DigestError::TransientFetch {
            source_id: source_id.to_string(),
            reason: format!("request failed; last error: {e}"),
        })?;

        let extraction = self.config.extraction.extract(&html);
        debug!(
            source = source_id,
            chars = extraction.text.chars().count(),
            body_found = extraction.body_found,
            "Extracted page text"
        );
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_prefers_article() {
        let html = r#"
            <html><body>
              <nav>Home | About</nav>
              <article><h1>Title</h1><p>First paragraph.</p><p>Second <b>bold</b> one.</p></article>
              <footer>Copyright</footer>
            </body></html>"#;
        let extraction = ExtractionConfig::default().extract(html);
        assert!(extraction.body_found);
        assert_eq!(extraction.text, "Title\n\nFirst paragraph.\n\nSecond bold one.");
    }

    #[test]
    fn test_extract_drops_scripts_and_falls_back_to_body() {
        let html = "<html><body><script>var x = 1;</script><div>Plain body text</div></body></html>";
        let extraction = ExtractionConfig::default().extract(html);
        assert!(extraction.body_found);
        assert_eq!(extraction.text, "Plain body text");
    }

    #[test]
    fn test_extract_empty_page_has_no_body() {
        let extraction = ExtractionConfig::default().extract("<html><body>  </body></html>");
        assert!(!extraction.body_found);
        assert!(extraction.text.is_empty());
    }

    #[test]
    fn test_invalid_selector_is_skipped() {
        let config = ExtractionConfig {
            main_content_selectors: vec!["[[[".to_string(), "main".to_string()],
            remove_selectors: vec![],
        };
        let extraction = config.extract("<html><body><main>Main text</main></body></html>");
        assert_eq!(extraction.text, "Main text");
    }

    #[test]
    fn test_http_config_defaults() {
        let config = HttpFetcherConfig::default();
        assert_eq!(config.timeout().unwrap(), Duration::from_secs(15));
        assert_eq!(config.retry.max_retries, 2);
        assert!(config.user_agent.starts_with("digestflow/"));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let config: HttpFetcherConfig =
            serde_json::from_str(r#"{"timeout_seconds": -0.5}"#).unwrap();
        assert!(matches!(config.timeout(), Err(DigestError::Config(_))));
        assert!(matches!(HttpFetcher::new(config), Err(DigestError::Config(_))));
    }

    #[test]
    fn test_attempt_error_display_is_shortenable() {
        let err = AttemptError::Status {
            status: 503,
            body: "<!DOCTYPE html><p>down</p>".to_string(),
        };
        let reason = format!("request failed; last error: {err}");
        assert_eq!(
            crate::fetch::shorten_error_message(&reason),
            "last error: status 503"
        );
    }
}
