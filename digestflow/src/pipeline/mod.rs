//! The end-to-end run: source list, content fetch, then consolidation.

mod builder;
mod options;
mod runner;

pub use builder::PipelineBuilder;
pub use options::RunOptions;
pub use runner::Pipeline;
