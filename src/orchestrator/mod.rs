//! Run orchestration.
//!
//! Provides:
//! - The `Orchestrator` state machine
//! - Run and course results
//! - The persisted run summary

pub mod engine;
pub mod results;
pub mod summary;

pub use engine::{Orchestrator, OrchestratorState};
pub use results::{format_duration, CourseResult, DownloadResults, ErrorRecord};
pub use summary::{RunSummary, SUMMARY_FILE};
