//! Per content type downloaders.
//!
//! This module provides:
//! - The `ContentDownloader` contract and its shared per-course loop
//! - One downloader per content type
//! - The hybrid API + scrape module resolver
//! - The registry the orchestrator builds downloaders from

pub mod announcements;
pub mod assignments;
pub mod common;
pub mod contract;
pub mod discussions;
pub mod files;
pub mod grades;
pub mod hybrid;
pub mod modules;
pub mod people;
pub mod quizzes;
pub mod registry;

pub use contract::{
    run_content_loop, ContentDownloader, ContentItem, ContentMetadataFile, DownloadInfo,
    DownloadSettings, DownloadStats, DownloaderContext, FileEntry, ItemDetails, ItemError,
    ItemMetadata,
};
pub use hybrid::HybridModulesDownloader;
pub use modules::ModulesDownloader;
pub use registry::{DownloaderFactory, DownloaderRegistry};
