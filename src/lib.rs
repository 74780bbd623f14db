//! canvas-sync - synchronize Canvas LMS course content to a local folder tree
//!
//! This library downloads the content of Canvas courses into
//! `{year}/{semester}/{course}` folders, one subfolder per content type.
//!
//! # Features
//!
//! - Announcements, assignments, discussions, files, modules, quizzes,
//!   grades and people
//! - Hybrid module downloads: API structure plus cookie-session page
//!   scraping for files the API does not list
//! - Link-header pagination with retry, backoff and jitter
//! - Skip-existing downloads and collision-free file placement
//! - Hierarchical progress events and a JSON run summary
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use canvas_sync::{Config, DownloaderRegistry, Orchestrator, ProgressTracker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("config.toml"))?;
//!     let registry = DownloaderRegistry::with_defaults(&config.modules);
//!     let mut orchestrator =
//!         Orchestrator::new(config, &registry, Arc::new(ProgressTracker::new()));
//!     orchestrator.initialize_session().await?;
//!
//!     let results = orchestrator.download_courses(&["12345".to_string()]).await?;
//!     println!("{} items downloaded", results.downloaded_items);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod course;
pub mod download;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod scrape;

// Re-exports for convenience
pub use api::CanvasApi;
pub use config::{Config, ContentType};
pub use course::CourseInfo;
pub use download::{ContentDownloader, DownloadStats, DownloaderRegistry};
pub use error::{Error, Result};
pub use orchestrator::{DownloadResults, Orchestrator, OrchestratorState, RunSummary};
pub use progress::ProgressTracker;
