//! Hybrid module retrieval: API structure plus scraped file links.
//!
//! Each module goes through four phases:
//!
//! 1. API: list items and write their JSON records.
//! 2. Scrape: fetch the rendered module page with the cookie session and
//!    pull file links out of it through the configured [`LinkExtractor`].
//! 3. Fetch: resolve every link to a download URL and a safe name, download
//!    it into `files/` and write a `<file>.metadata.json` sidecar.
//! 4. Summary: write `module_summary.txt`.
//!
//! The scrape phase only adds files. Any failure there becomes a warning and
//! the module keeps its API metadata.
//!
//! [`LinkExtractor`]: crate::scrape::LinkExtractor

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::types::{Module, ModuleItem};
use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::common::{fetch_file, write_json, write_text, FileOutcome, FileRequest, FileTally};
use crate::download::contract::{
    ContentDownloader, ContentItem, DownloadInfo, DownloadStats, DownloaderContext, ItemDetails,
    ItemMetadata,
};
use crate::download::modules::{
    module_details, module_dir, module_items, set_module_progress, write_module_structure,
    write_modules_index,
};
use crate::error::Result;
use crate::fs::file_type_label;
use crate::scrape::{
    file_id_from_url, filename_for_link, module_item_id_from_url, with_download_segment,
    ScrapedLink,
};

pub const EXTRACTION_METHOD: &str = "web_scraping";
pub const SUMMARY_FILE: &str = "module_summary.txt";

/// How the scrape phase went for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeStatus {
    Disabled,
    NoSession,
    /// The page loaded but no file links were found.
    NoLinks,
    Failed(String),
    Found(usize),
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeStatus::Disabled => f.write_str("disabled"),
            ScrapeStatus::NoSession => f.write_str("no cookie session"),
            ScrapeStatus::NoLinks => {
                f.write_str("found 0 files (possible authentication or markup change)")
            }
            ScrapeStatus::Failed(reason) => write!(f, "failed ({})", reason),
            ScrapeStatus::Found(_) => f.write_str("ok"),
        }
    }
}

/// Sidecar written next to every scraped file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSidecar {
    pub filename: String,
    pub original_url: String,
    pub file_type: String,
    pub size: u64,
    pub content_id: Option<String>,
    pub download_date: DateTime<Local>,
    pub module_name: String,
    pub item_title: String,
    pub extraction_method: String,
}

/// A scraped link resolved to something downloadable.
#[derive(Debug, Clone)]
struct ResolvedLink {
    url: String,
    name: String,
    size: Option<u64>,
    content_id: Option<String>,
    item_title: String,
}

#[derive(Debug, Default)]
struct ModuleReport {
    api_items: usize,
    api_file_items: usize,
    links_found: usize,
    files_failed: usize,
    tally: FileTally,
}

pub struct HybridModulesDownloader {
    ctx: DownloaderContext,
}

impl HybridModulesDownloader {
    pub fn new(ctx: DownloaderContext) -> Self {
        Self { ctx }
    }

    fn warn(&self, message: String) {
        tracing::warn!("{}", message);
        self.ctx.tracker.report_warning(&message);
    }

    async fn scrape_links(&self, course: &CourseInfo, module: &Module) -> (ScrapeStatus, Vec<ScrapedLink>) {
        let Some(extractor) = self.ctx.extractor.as_ref().filter(|_| self.ctx.settings.web_scraping)
        else {
            return (ScrapeStatus::Disabled, Vec::new());
        };
        if !self.ctx.api.has_web_session() {
            return (ScrapeStatus::NoSession, Vec::new());
        }

        let page_url = self.ctx.api.module_page_url(&course.id, &module.id);
        let page = match Url::parse(&page_url) {
            Ok(url) => url,
            Err(e) => {
                self.warn(format!("Module '{}': bad page URL {}: {}", module.name, page_url, e));
                return (ScrapeStatus::Failed(e.to_string()), Vec::new());
            }
        };

        let html = match self.ctx.api.get_page(page.as_str()).await {
            Ok(html) => html,
            Err(e) => {
                self.warn(format!("Module '{}': page scrape failed: {}", module.name, e));
                return (ScrapeStatus::Failed(e.to_string()), Vec::new());
            }
        };

        let links = extractor.extract(&html, &page);
        tracing::debug!(
            module = %module.name,
            extractor = extractor.name(),
            links = links.len(),
            "Scraped module page"
        );

        if links.is_empty() {
            self.warn(format!(
                "Module '{}': no file links found on the module page",
                module.name
            ));
            (ScrapeStatus::NoLinks, links)
        } else {
            (ScrapeStatus::Found(links.len()), links)
        }
    }

    async fn resolve_link(
        &self,
        course: &CourseInfo,
        items: &[ModuleItem],
        link: &ScrapedLink,
        index: usize,
    ) -> Result<Option<ResolvedLink>> {
        if let Some(item_id) = module_item_id_from_url(&link.url) {
            let Some(item) = items.iter().find(|item| item.id == item_id) else {
                tracing::debug!(url = %link.url, "Module item link not in API listing");
                return Ok(None);
            };
            let (true, Some(content_id)) = (item.item_type == "File", item.content_id.as_deref())
            else {
                return Ok(None);
            };

            let file = self.ctx.api.get_file(&course.id, content_id).await?;
            let url = file
                .url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| self.ctx.api.file_download_url(&course.id, &file.id));
            return Ok(Some(ResolvedLink {
                url,
                name: file.name().to_string(),
                size: file.size,
                content_id: Some(file.id.clone()),
                item_title: item.title.clone(),
            }));
        }

        Ok(Some(ResolvedLink {
            url: with_download_segment(&link.url).to_string(),
            name: filename_for_link(link, index),
            size: None,
            content_id: file_id_from_url(&link.url),
            item_title: if link.text.is_empty() {
                link.label.clone().unwrap_or_default()
            } else {
                link.text.clone()
            },
        }))
    }

    async fn fetch_links(
        &self,
        course: &CourseInfo,
        module: &Module,
        items: &[ModuleItem],
        links: &[ScrapedLink],
        files_dir: &Path,
        report: &mut ModuleReport,
    ) -> Result<()> {
        let mut seen = HashSet::new();

        for (index, link) in links.iter().enumerate() {
            let resolved = match self.resolve_link(course, items, link, index + 1).await {
                Ok(Some(resolved)) => resolved,
                Ok(None) => continue,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    report.files_failed += 1;
                    self.warn(format!("Module '{}': cannot resolve {}: {}", module.name, link.url, e));
                    continue;
                }
            };

            let key = resolved
                .content_id
                .clone()
                .unwrap_or_else(|| resolved.url.clone());
            if !seen.insert(key) {
                continue;
            }

            let outcome = fetch_file(
                &self.ctx,
                FileRequest {
                    url: &resolved.url,
                    dir: files_dir,
                    name: &resolved.name,
                    expected_size: resolved.size,
                    via_web: true,
                },
            )
            .await;

            match outcome {
                Ok(FileOutcome::Downloaded { path, bytes }) => {
                    report.tally.record(&FileOutcome::Downloaded {
                        path: path.clone(),
                        bytes,
                    });
                    let filename = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let sidecar = FileSidecar {
                        file_type: file_type_label(&filename),
                        filename: filename.clone(),
                        original_url: link.url.to_string(),
                        size: bytes,
                        content_id: resolved.content_id.clone(),
                        download_date: Local::now(),
                        module_name: module.name.clone(),
                        item_title: resolved.item_title.clone(),
                        extraction_method: EXTRACTION_METHOD.to_string(),
                    };
                    let sidecar_path = files_dir.join(format!("{}.metadata.json", filename));
                    write_json(&sidecar_path, &sidecar).await?;
                }
                Ok(skipped) => report.tally.record(&skipped),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    report.files_failed += 1;
                    self.warn(format!(
                        "Module '{}': download of {} failed: {}",
                        module.name, resolved.name, e
                    ));
                }
            }
        }
        Ok(())
    }

    async fn save_module(
        &self,
        course: &CourseInfo,
        module: &Module,
        content_dir: &Path,
        metadata: &mut ItemMetadata,
    ) -> Result<Option<DownloadInfo>> {
        let max_len = self.ctx.settings.max_filename_length;
        let dir = module_dir(content_dir, metadata.item_number, &module.name, max_len);
        let mut report = ModuleReport::default();

        // Phase 1
        let items = match module_items(&self.ctx, course, module).await {
            Ok(items) => items,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.warn(format!("Module '{}': item listing failed: {}", module.name, e));
                Vec::new()
            }
        };
        write_module_structure(&dir, module, &items, max_len).await?;
        report.api_items = items.len();
        report.api_file_items = items.iter().filter(|item| item.item_type == "File").count();

        // Phase 2
        let (status, links) = self.scrape_links(course, module).await;
        report.links_found = links.len();

        // Phase 3
        if !links.is_empty() {
            self.fetch_links(course, module, &items, &links, &dir.join("files"), &mut report)
                .await?;
        }

        // Phase 4
        write_text(&dir.join(SUMMARY_FILE), &module_summary(module, &status, &report)).await?;

        metadata.set_local_file(&dir);
        set_module_progress(metadata, &items, report.tally.downloaded);
        if let ItemDetails::Module(details) = &mut metadata.details {
            details.links_found = Some(report.links_found);
            details.scraping_status = Some(status.to_string());
        }

        tracing::info!(
            module = %module.name,
            items = report.api_items,
            links = report.links_found,
            files = report.tally.downloaded,
            scraping = %status,
            "Module processed"
        );

        Ok(Some(report.tally.info(dir)))
    }
}

fn module_summary(module: &Module, status: &ScrapeStatus, report: &ModuleReport) -> String {
    let mut text = String::new();
    text.push_str(&format!("Module: {}\n", module.name));
    text.push_str(&format!("Module ID: {}\n", module.id));
    if let Some(position) = module.position {
        text.push_str(&format!("Position: {}\n", position));
    }
    text.push_str(&format!("Generated: {}\n\n", Local::now().format("%Y-%m-%d %H:%M:%S")));

    text.push_str("API phase\n");
    text.push_str(&format!("  Items: {}\n", report.api_items));
    text.push_str(&format!("  File items: {}\n\n", report.api_file_items));

    text.push_str("Web scraping phase\n");
    text.push_str(&format!("  Status: {}\n", status));
    text.push_str(&format!("  Links found: {}\n\n", report.links_found));

    text.push_str("Download phase\n");
    text.push_str(&format!("  Files downloaded: {}\n", report.tally.downloaded));
    text.push_str(&format!("  Files skipped: {}\n", report.tally.skipped));
    text.push_str(&format!("  Files failed: {}\n", report.files_failed));
    text.push_str(&format!("  Bytes: {}\n", report.tally.bytes));
    text
}

#[async_trait]
impl ContentDownloader for HybridModulesDownloader {
    fn context(&self) -> &DownloaderContext {
        &self.ctx
    }

    fn content_type(&self) -> ContentType {
        ContentType::Modules
    }

    async fn fetch_content_list(&self, course: &CourseInfo) -> Result<Vec<ContentItem>> {
        let modules = self.ctx.api.list_modules(&course.id).await?;
        Ok(modules.into_iter().map(ContentItem::Module).collect())
    }

    fn extract_metadata(&self, item: &ContentItem) -> ItemMetadata {
        let details = match item {
            ContentItem::Module(module) => module_details(module),
            _ => Ok(ItemDetails::None),
        };
        ItemMetadata::build(self.content_type(), item, details)
    }

    async fn process_content_item(
        &self,
        course: &CourseInfo,
        item: &ContentItem,
        content_dir: &Path,
        metadata: &mut ItemMetadata,
    ) -> Result<Option<DownloadInfo>> {
        match item {
            ContentItem::Module(module) => {
                self.save_module(course, module, content_dir, metadata).await
            }
            _ => Ok(None),
        }
    }

    async fn finish_course(
        &self,
        course: &CourseInfo,
        content_dir: &Path,
        items: &[ItemMetadata],
        _stats: &mut DownloadStats,
    ) -> Result<()> {
        write_modules_index(course, content_dir, items).await
    }
}
