//! Output module for console output and progress.
//!
//! Provides:
//! - Colored console output
//! - Progress bars driven by tracker events
//! - Run summary reporting

pub mod console;
pub mod progress;
pub mod stats;

pub use console::{
    print_banner, print_config_summary, print_course_list, print_error, print_info,
    print_success, print_warning,
};
pub use progress::{attach_progress_bars, ProgressDisplay};
pub use stats::{print_course_result, print_run_summary};
