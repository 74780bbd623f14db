//! File link discovery on rendered course pages.
//!
//! Markup heuristics sit behind [`LinkExtractor`] so a different strategy can
//! be plugged into the hybrid module downloader without touching it.

pub mod canvas;
pub mod resolve;

use serde::{Deserialize, Serialize};
use url::Url;

pub use canvas::CanvasMarkupExtractor;
pub use resolve::{file_id_from_url, filename_for_link, module_item_id_from_url, with_download_segment};

/// Which heuristic found a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    ModuleItem,
    Attachment,
    DirectLink,
}

/// A file-like link found on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedLink {
    /// Absolute URL, resolved against the page.
    pub url: Url,
    /// Visible link text with whitespace collapsed.
    pub text: String,
    /// `title`, `data-filename` or `aria-label` attribute when present.
    pub label: Option<String>,
    /// Size as printed next to the link, e.g. `1.2 MB`.
    pub size_hint: Option<String>,
    pub source: LinkSource,
}

/// Strategy for pulling file links out of a rendered page.
pub trait LinkExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Links in first-seen order, unique by absolute URL.
    fn extract(&self, html: &str, page_url: &Url) -> Vec<ScrapedLink>;
}
