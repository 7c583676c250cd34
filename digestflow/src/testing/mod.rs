//! Testing utilities for digestflow runs.
//!
//! This module provides:
//! - Scripted fetch and generation collaborators
//! - An in-memory blob store
//! - Text and source-list fixtures

mod fixtures;
mod mocks;

pub use fixtures::{paragraph_text, source_ids, source_list_file};
pub use mocks::{FetchReply, MemoryStore, ScriptedFetcher, ScriptedGenerator};
