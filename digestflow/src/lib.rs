//! # Digestflow
//!
//! Fetches many document sources and consolidates them into one document.
//!
//! A run has three phases:
//!
//! - **Source list**: read newline-delimited source identifiers from a local
//!   path or a `gs://` object
//! - **Content fetch**: fetch every source in parallel under a concurrency
//!   limit, then retry failures once, sequentially, after a cool-down
//! - **Consolidation**: split the text into paragraph-aware segments,
//!   summarize each segment concurrently under a shared rate limit (Map),
//!   merge the summaries with one final call (Reduce) and write the result
//!
//! Every external dependency is a narrow trait ([`fetch::Fetcher`],
//! [`consolidate::GenerativeClient`], [`io::BlobReader`], [`io::BlobWriter`])
//! injected through [`pipeline::PipelineBuilder`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use digestflow::prelude::*;
//!
//! let options = RunOptions::new("urls.txt").with_output("gs://reports/daily.md");
//! let pipeline = PipelineBuilder::new(options.clone())
//!     .storage(Arc::new(StorageRouter::local()))
//!     .fetcher(Arc::new(HttpFetcher::new(options.http_fetcher_config())?))
//!     .generator(Arc::new(GeminiClient::new(options.gemini_config()?)?))
//!     .build()?;
//!
//! let report = pipeline.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod consolidate;
pub mod errors;
pub mod fetch;
pub mod io;
pub mod observability;
pub mod pipeline;
pub mod segment;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::consolidate::{
        extract_final_payload, Consolidator, GenerativeClient, MapConfig, MapExecutor,
        PromptBuilder, ReduceExecutor,
    };
    pub use crate::errors::{DigestError, FetchErrorKind, Phase, Result};
    pub use crate::fetch::{
        classify, FetchConfig, FetchOutcome, Fetcher, ResilientFetcher, SourceResult,
    };
    pub use crate::io::{BlobReader, BlobWriter, OutputSink, OutputTarget, StorageRouter};
    pub use crate::observability::{init_tracing, LogFormat, RunReport};
    pub use crate::pipeline::{Pipeline, PipelineBuilder, RunOptions};
    pub use crate::segment::{segment_text, Segment};

    #[cfg(feature = "http")]
    pub use crate::consolidate::{GeminiClient, GeminiConfig};
    #[cfg(feature = "http")]
    pub use crate::fetch::{HttpFetcher, HttpFetcherConfig};
    #[cfg(feature = "http")]
    pub use crate::io::ObjectStore;
}
