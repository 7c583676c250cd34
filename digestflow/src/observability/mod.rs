//! Observability utilities.

mod logging;
mod wide_events;

pub use logging::{init_tracing, LogFormat, PhaseTimer};
pub use wide_events::RunReport;
