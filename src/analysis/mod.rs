//! Palace analysis.
//!
//! This module fans a chart out into one LLM analysis per palace and
//! collects the reports, abandoning the batch if the consumer disconnects.

pub mod orchestrator;
pub mod probe;

pub use orchestrator::{AnalysisError, AnalysisOrchestrator, EMPTY_REPLY};
pub use probe::{DisconnectProbe, InterruptProbe};
