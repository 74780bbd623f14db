//! Course modules through the API only, plus helpers shared with the hybrid
//! module downloader.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::{Module, ModuleItem};
use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::common::{
    escape_html, fetch_file, parse_timestamp, write_json, write_text, FileOutcome, FileRequest,
    FileTally,
};
use crate::download::contract::{
    ContentDownloader, ContentItem, DownloadInfo, DownloadStats, DownloaderContext, ItemDetails,
    ItemMetadata,
};
use crate::error::{Error, Result};
use crate::fs::{ensure_dir, sanitize_filename};

pub(crate) const MODULES_INDEX_FILE: &str = "course_modules_index.html";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleDetails {
    pub position: Option<u32>,
    pub unlock_at: Option<DateTime<Utc>>,
    pub require_sequential_progress: bool,
    pub prerequisite_module_ids: Vec<String>,
    pub state: Option<String>,
    pub published: Option<bool>,
    pub item_count: usize,
    pub items: Vec<ModuleItem>,
    pub files_downloaded: u64,
    /// Links found by the scrape phase, hybrid only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links_found: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraping_status: Option<String>,
}

pub(crate) fn module_details(module: &Module) -> Result<ItemDetails> {
    let items = module.items.clone().unwrap_or_default();
    Ok(ItemDetails::Module(ModuleDetails {
        position: module.position,
        unlock_at: parse_timestamp("unlock_at", module.unlock_at.as_deref())?,
        require_sequential_progress: module.require_sequential_progress,
        prerequisite_module_ids: module.prerequisite_module_ids.clone(),
        state: module.state.clone(),
        published: module.published,
        item_count: module
            .items_count
            .map(|n| n as usize)
            .unwrap_or(items.len()),
        items,
        files_downloaded: 0,
        links_found: None,
        scraping_status: None,
    }))
}

/// Items of a module, inlined by the listing or fetched separately.
pub(crate) async fn module_items(
    ctx: &DownloaderContext,
    course: &CourseInfo,
    module: &Module,
) -> Result<Vec<ModuleItem>> {
    match &module.items {
        Some(items) => Ok(items.clone()),
        None => ctx.api.list_module_items(&course.id, &module.id).await,
    }
}

/// `module_NNN_<name>` folder for the module at `number`.
pub(crate) fn module_dir(content_dir: &Path, number: usize, name: &str, max_len: usize) -> PathBuf {
    content_dir.join(sanitize_filename(
        &format!("module_{:03}_{}", number, name),
        max_len,
    ))
}

/// Write `module_info.json` and one `items/<type>_<id>_<title>.json` per item.
pub(crate) async fn write_module_structure(
    dir: &Path,
    module: &Module,
    items: &[ModuleItem],
    max_len: usize,
) -> Result<()> {
    ensure_dir(dir).await?;
    write_json(&dir.join("module_info.json"), module).await?;

    let items_dir = dir.join("items");
    ensure_dir(&items_dir).await?;
    for item in items {
        let kind = if item.item_type.is_empty() {
            "item"
        } else {
            item.item_type.as_str()
        };
        let name = sanitize_filename(
            &format!("{}_{}_{}.json", kind.to_lowercase(), item.id, item.title),
            max_len,
        );
        write_json(&items_dir.join(name), item).await?;
    }
    Ok(())
}

pub(crate) fn set_module_progress(metadata: &mut ItemMetadata, items: &[ModuleItem], files: u64) {
    if let ItemDetails::Module(details) = &mut metadata.details {
        details.item_count = items.len();
        details.items = items.to_vec();
        details.files_downloaded = files;
    }
    metadata.files_downloaded = files;
}

/// Write `course_modules_index.html` next to the modules folder.
pub(crate) async fn write_modules_index(
    course: &CourseInfo,
    content_dir: &Path,
    items: &[ItemMetadata],
) -> Result<()> {
    let course_dir = content_dir
        .parent()
        .ok_or_else(|| Error::Download(format!("No course folder above {}", content_dir.display())))?;
    let folder = content_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<title>{} - Modules</title>\n</head>\n<body>\n<h1>{}</h1>\n<ol>\n",
        escape_html(&course.name),
        escape_html(&course.name)
    ));

    for item in items {
        let (count, files) = match &item.details {
            ItemDetails::Module(details) => (details.item_count, details.files_downloaded),
            _ => (0, item.files_downloaded),
        };
        let label = format!(
            "{} ({} items, {} files)",
            escape_html(&item.title),
            count,
            files
        );
        match item
            .local_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
        {
            Some(dir) => html.push_str(&format!(
                "<li><a href=\"{}/{}/\">{}</a></li>\n",
                urlencoding::encode(&folder),
                urlencoding::encode(&dir),
                label
            )),
            None => html.push_str(&format!("<li>{}</li>\n", label)),
        }
    }

    html.push_str("</ol>\n</body>\n</html>\n");
    write_text(&course_dir.join(MODULES_INDEX_FILE), &html).await
}

pub struct ModulesDownloader {
    ctx: DownloaderContext,
}

impl ModulesDownloader {
    pub fn new(ctx: DownloaderContext) -> Self {
        Self { ctx }
    }

    async fn download_file_item(
        &self,
        course: &CourseInfo,
        item: &ModuleItem,
        files_dir: &Path,
    ) -> Result<FileOutcome> {
        let content_id = item
            .content_id
            .as_deref()
            .ok_or_else(|| Error::Api(format!("File item {} has no content_id", item.id)))?;
        let file = self.ctx.api.get_file(&course.id, content_id).await?;
        let url = file
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.ctx.api.file_download_url(&course.id, &file.id));

        fetch_file(
            &self.ctx,
            FileRequest {
                url: &url,
                dir: files_dir,
                name: file.name(),
                expected_size: file.size,
                via_web: false,
            },
        )
        .await
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
        let items = module_items(&self.ctx, course, module).await?;
        write_module_structure(&dir, module, &items, max_len).await?;

        let files_dir = dir.join("files");
        let mut tally = FileTally::default();
        for item in items.iter().filter(|item| item.item_type == "File") {
            match self.download_file_item(course, item, &files_dir).await {
                Ok(outcome) => tally.record(&outcome),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let message = format!(
                        "Module '{}': file '{}' failed: {}",
                        module.name, item.title, e
                    );
                    tracing::warn!("{}", message);
                    self.ctx.tracker.report_warning(&message);
                }
            }
        }

        metadata.set_local_file(&dir);
        set_module_progress(metadata, &items, tally.downloaded);
        Ok(Some(tally.info(dir)))
    }
}

#[async_trait]
impl ContentDownloader for ModulesDownloader {
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
