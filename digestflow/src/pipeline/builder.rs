//! Pipeline builder with validation.

use std::sync::Arc;

use super::{Pipeline, RunOptions};
use crate::consolidate::{GenerativeClient, PromptBuilder};
use crate::errors::{DigestError, Result};
use crate::fetch::Fetcher;
use crate::io::{BlobReader, BlobWriter, OutputTarget};

/// Assembles a [`Pipeline`] from options and collaborators.
pub struct PipelineBuilder {
    options: RunOptions,
    reader: Option<Arc<dyn BlobReader>>,
    writer: Option<Arc<dyn BlobWriter>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    generator: Option<Arc<dyn GenerativeClient>>,
    prompts: PromptBuilder,
}

impl PipelineBuilder {
    /// Creates a builder for `options`.
    #[must_use]
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            reader: None,
            writer: None,
            fetcher: None,
            generator: None,
            prompts: PromptBuilder::new(),
        }
    }

    /// Sets where the source list is read from.
    #[must_use]
    pub fn reader(mut self, reader: Arc<dyn BlobReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Sets where the final document is written.
    #[must_use]
    pub fn writer(mut self, writer: Arc<dyn BlobWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Uses one store for both reading and writing.
    #[must_use]
    pub fn storage<S>(self, store: Arc<S>) -> Self
    where
        S: BlobReader + BlobWriter + 'static,
    {
        let reader: Arc<dyn BlobReader> = store.clone();
        let writer: Arc<dyn BlobWriter> = store;
        self.reader(reader).writer(writer)
    }

    /// Sets the per-source fetch capability.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the generation capability.
    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn GenerativeClient>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replaces the prompt templates.
    #[must_use]
    pub fn prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    /// Validates the options and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Config`] for invalid options, an unusable output
    /// location, or a missing collaborator.
    pub fn build(self) -> Result<Pipeline> {
        self.options.validate()?;
        let target = OutputTarget::parse(&self.options.output)
            .map_err(|e| DigestError::Config(e.to_string()))?;

        Ok(Pipeline {
            reader: self.reader.ok_or_else(|| missing("source reader"))?,
            writer: self.writer.ok_or_else(|| missing("output writer"))?,
            fetcher: self.fetcher.ok_or_else(|| missing("fetcher"))?,
            generator: self.generator.ok_or_else(|| missing("generation client"))?,
            prompts: Arc::new(self.prompts),
            options: Arc::new(self.options),
            target,
        })
    }
}

fn missing(what: &str) -> DigestError {
    DigestError::Config(format!("pipeline has no {what}"))
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("options", &self.options)
            .field("has_reader", &self.reader.is_some())
            .field("has_writer", &self.writer.is_some())
            .field("has_fetcher", &self.fetcher.is_some())
            .field("has_generator", &self.generator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, ScriptedFetcher, ScriptedGenerator};

    fn complete(options: RunOptions) -> PipelineBuilder {
        PipelineBuilder::new(options)
            .storage(Arc::new(MemoryStore::new()))
            .fetcher(Arc::new(ScriptedFetcher::new()))
            .generator(Arc::new(ScriptedGenerator::new()))
    }

    #[test]
    fn test_build_with_all_collaborators() {
        let pipeline = complete(RunOptions::new("urls.txt")).build().unwrap();
        assert_eq!(pipeline.options().source_list, "urls.txt");
        assert_eq!(
            pipeline.target(),
            &OutputTarget::File("./output/output_reduce_final.md".to_string())
        );
    }

    #[test]
    fn test_build_rejects_missing_fetcher() {
        let err = PipelineBuilder::new(RunOptions::new("urls.txt"))
            .storage(Arc::new(MemoryStore::new()))
            .generator(Arc::new(ScriptedGenerator::new()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("fetcher"));
    }

    #[test]
    fn test_build_rejects_invalid_options() {
        assert!(complete(RunOptions::default()).build().is_err());
    }

    #[test]
    fn test_build_rejects_bad_object_output() {
        let err = complete(RunOptions::new("urls.txt").with_output("gs://bucket"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DigestError::Config(_)));
    }
}
