//! Deterministic collaborators for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::consolidate::GenerativeClient;
use crate::errors::{DigestError, Result};
use crate::fetch::{Extraction, Fetcher};
use crate::io::{BlobReader, BlobStream, BlobWriter};

/// One scripted answer from a [`ScriptedFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchReply {
    /// The page had a body with this text.
    Body(String),
    /// The page was fetched but no body was found.
    NoBody,
    /// The request failed with this reason.
    Fail(String),
}

/// A fetcher that answers from a per-source script.
///
/// Each call consumes the next reply for its source; the last reply repeats.
/// Sources without a script fail.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<FetchReply>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    /// Creates a fetcher with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the replies for `source`, in call order.
    #[must_use]
    pub fn with_replies(
        self,
        source: impl Into<String>,
        replies: impl IntoIterator<Item = FetchReply>,
    ) -> Self {
        self.scripts
            .lock()
            .insert(source.into(), replies.into_iter().collect());
        self
    }

    /// Scripts `source` to always return `body`.
    #[must_use]
    pub fn with_body(self, source: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_replies(source, [FetchReply::Body(body.into())])
    }

    /// Scripts `source` to always fail.
    #[must_use]
    pub fn with_failure(self, source: impl Into<String>, reason: impl Into<String>) -> Self {
        self.with_replies(source, [FetchReply::Fail(reason.into())])
    }

    /// Delays every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns how many times `source` was fetched.
    #[must_use]
    pub fn call_count(&self, source: &str) -> usize {
        self.calls.lock().get(source).copied().unwrap_or(0)
    }

    /// Returns the total number of fetches.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn next_reply(&self, source: &str) -> Option<FetchReply> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(source)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, source_id: &str) -> Result<Extraction> {
        *self.calls.lock().entry(source_id.to_string()).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(source_id) {
            Some(FetchReply::Body(text)) => Ok(Extraction::found(text)),
            Some(FetchReply::NoBody) => Ok(Extraction::not_found()),
            Some(FetchReply::Fail(reason)) => Err(DigestError::TransientFetch {
                source_id: source_id.to_string(),
                reason,
            }),
            None => Err(DigestError::TransientFetch {
                source_id: source_id.to_string(),
                reason: "no scripted reply".to_string(),
            }),
        }
    }
}

/// A generation client with canned Map and Reduce answers.
///
/// Calls made with the reduce model get the reduce response; every other
/// model gets the map response.
#[derive(Debug)]
pub struct ScriptedGenerator {
    map_response: String,
    reduce_model: String,
    reduce_response: String,
    fail_when_contains: Option<String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self {
            map_response: "intermediate summary".to_string(),
            reduce_model: "gemini-2.5-pro".to_string(),
            reduce_response: "<FINAL_START>\n# Consolidated report\n<FINAL_END>".to_string(),
            fail_when_contains: None,
            delay: None,
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }
}

impl ScriptedGenerator {
    /// Creates a generator with default answers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the answer to Map calls.
    #[must_use]
    pub fn with_map_response(mut self, response: impl Into<String>) -> Self {
        self.map_response = response.into();
        self
    }

    /// Sets which model is treated as the Reduce model.
    #[must_use]
    pub fn with_reduce_model(mut self, model: impl Into<String>) -> Self {
        self.reduce_model = model.into();
        self
    }

    /// Sets the raw answer to the Reduce call.
    #[must_use]
    pub fn with_reduce_response(mut self, response: impl Into<String>) -> Self {
        self.reduce_response = response.into();
        self
    }

    /// Fails every call whose prompt contains `needle`.
    #[must_use]
    pub fn failing_when_contains(mut self, needle: impl Into<String>) -> Self {
        self.fail_when_contains = Some(needle.into());
        self
    }

    /// Delays every answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the prompts sent with `model`, in call order.
    #[must_use]
    pub fn prompts_for(&self, model: &str) -> Vec<String> {
        self.prompts
            .lock()
            .iter()
            .filter(|(m, _)| m == model)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Returns how many calls used `model`.
    #[must_use]
    pub fn calls_for(&self, model: &str) -> usize {
        self.prompts.lock().iter().filter(|(m, _)| m == model).count()
    }

    /// Returns the total number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }

    /// Returns the highest number of calls that were in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeClient for ScriptedGenerator {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        self.prompts
            .lock()
            .push((model.to_string(), prompt.to_string()));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(needle) = &self.fail_when_contains {
            if prompt.contains(needle.as_str()) {
                return Err(DigestError::Generation(format!(
                    "scripted failure for prompt containing '{needle}'"
                )));
            }
        }

        if model == self.reduce_model {
            Ok(self.reduce_response.clone())
        } else {
            Ok(self.map_response.clone())
        }
    }
}

/// An in-memory blob store keyed by location.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, String>>,
    content_types: Mutex<HashMap<String, String>>,
    fail_writes: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file.
    #[must_use]
    pub fn with_file(self, location: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(location, content);
        self
    }

    /// Makes every write fail.
    #[must_use]
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Stores `content` at `location`.
    pub fn insert(&self, location: impl Into<String>, content: impl Into<String>) {
        self.files.lock().insert(location.into(), content.into());
    }

    /// Returns the content at `location`.
    #[must_use]
    pub fn get(&self, location: &str) -> Option<String> {
        self.files.lock().get(location).cloned()
    }

    /// Returns the content type of the last write to `location`.
    #[must_use]
    pub fn content_type(&self, location: &str) -> Option<String> {
        self.content_types.lock().get(location).cloned()
    }

    /// Returns the number of stored files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

#[async_trait]
impl BlobReader for MemoryStore {
    async fn open(&self, location: &str) -> Result<BlobStream> {
        let content = self
            .get(location)
            .ok_or_else(|| DigestError::SourceList(format!("{location}: not found")))?;
        Ok(Box::new(Cursor::new(content.into_bytes())))
    }
}

#[async_trait]
impl BlobWriter for MemoryStore {
    async fn write(&self, location: &str, content: &str, content_type: &str) -> Result<()> {
        if self.fail_writes {
            return Err(DigestError::Output(format!("{location}: write refused")));
        }
        self.insert(location, content);
        self.content_types
            .lock()
            .insert(location.to_string(), content_type.to_string());
        Ok(())
    }
}
