//! Hierarchical progress tracking.
//!
//! Provides:
//! - Progress node state with monotone status transitions
//! - The thread-safe application/course/content-type/item tree
//! - Event callbacks for presentation layers

pub mod state;
pub mod tracker;

pub use state::{ProgressLevel, ProgressState, ProgressStatus};
pub use tracker::{
    ItemOutcome, OverallStatistics, ProgressCallback, ProgressEvent, ProgressEventKind,
    ProgressTracker,
};
