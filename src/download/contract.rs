//! The downloader contract shared by every content type.
//!
//! Each content type implements [`ContentDownloader`]. The default
//! [`ContentDownloader::download_course_content`] runs [`run_content_loop`]:
//! list once, then process items one by one with per-item error isolation,
//! then write `{content_type}_metadata.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::{Assignment, DiscussionTopic, Enrollment, FileObject, Module, Quiz};
use crate::api::CanvasApi;
use crate::config::{Config, ContentType};
use crate::course::CourseInfo;
use crate::download::assignments::AssignmentDetails;
use crate::download::common::write_json;
use crate::download::discussions::TopicDetails;
use crate::download::files::FileDetails;
use crate::download::grades::GradeDetails;
use crate::download::modules::ModuleDetails;
use crate::download::people::PersonDetails;
use crate::download::quizzes::QuizDetails;
use crate::error::{Error, Result};
use crate::fs::{content_type_dir, ensure_dir, metadata_file_path};
use crate::progress::{ItemOutcome, ProgressLevel, ProgressTracker};
use crate::scrape::LinkExtractor;

/// Download settings copied into every downloader.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Downloads root; course folders are created below it.
    pub root: PathBuf,
    pub skip_existing: bool,
    pub max_file_size_bytes: u64,
    pub max_filename_length: usize,
    /// Lowercase extensions with leading dot.
    pub blocked_extensions: Vec<String>,
    pub web_scraping: bool,
}

impl DownloadSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.download_directory(),
            skip_existing: config.download.skip_existing,
            max_file_size_bytes: config.max_file_size_bytes(),
            max_filename_length: config.download.max_filename_length,
            blocked_extensions: config
                .download
                .blocked_extensions
                .iter()
                .map(|ext| {
                    let ext = ext.trim().to_lowercase();
                    if ext.starts_with('.') {
                        ext
                    } else {
                        format!(".{}", ext)
                    }
                })
                .collect(),
            web_scraping: config.modules.web_scraping,
        }
    }

    /// Whether `filename` has a blocked extension.
    pub fn is_blocked(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.blocked_extensions.iter().any(|ext| lower.ends_with(ext))
    }
}

/// Everything a downloader needs, passed by value at construction.
#[derive(Clone)]
pub struct DownloaderContext {
    pub api: Arc<CanvasApi>,
    pub tracker: Arc<ProgressTracker>,
    pub settings: DownloadSettings,
    pub extractor: Option<Arc<dyn LinkExtractor>>,
}

/// A course file together with the folder it sits in.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub file: FileObject,
    /// Folder path relative to the course files root, empty for the root.
    pub folder: String,
}

/// One upstream item, wrapping the typed API record.
#[derive(Debug, Clone)]
pub enum ContentItem {
    Announcement(DiscussionTopic),
    Assignment(Assignment),
    Discussion(DiscussionTopic),
    File(FileEntry),
    Module(Module),
    Grade(Assignment),
    Person(Enrollment),
    Quiz(Quiz),
}

impl ContentItem {
    pub fn id(&self) -> &str {
        match self {
            ContentItem::Announcement(topic) | ContentItem::Discussion(topic) => &topic.id,
            ContentItem::Assignment(assignment) | ContentItem::Grade(assignment) => &assignment.id,
            ContentItem::File(entry) => &entry.file.id,
            ContentItem::Module(module) => &module.id,
            ContentItem::Person(enrollment) => &enrollment.id,
            ContentItem::Quiz(quiz) => &quiz.id,
        }
    }

    pub fn title(&self) -> String {
        let title = match self {
            ContentItem::Announcement(topic) | ContentItem::Discussion(topic) => topic.title.clone(),
            ContentItem::Assignment(assignment) | ContentItem::Grade(assignment) => {
                assignment.name.clone()
            }
            ContentItem::File(entry) => entry.file.name().to_string(),
            ContentItem::Module(module) => module.name.clone(),
            ContentItem::Person(enrollment) => enrollment
                .user
                .as_ref()
                .map(|user| user.name.clone())
                .unwrap_or_default(),
            ContentItem::Quiz(quiz) => quiz.title.clone(),
        };
        if title.trim().is_empty() {
            format!("untitled_{}", self.id())
        } else {
            title
        }
    }
}

/// Type-specific metadata fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemDetails {
    #[default]
    None,
    Topic(TopicDetails),
    Assignment(AssignmentDetails),
    File(FileDetails),
    Module(ModuleDetails),
    Grade(GradeDetails),
    Person(PersonDetails),
    Quiz(QuizDetails),
}

/// Metadata record written for every item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub item_number: usize,
    pub id: String,
    pub title: String,
    pub content_type: ContentType,
    pub downloaded: bool,
    pub local_filename: Option<String>,
    pub local_path: Option<PathBuf>,
    pub files_downloaded: u64,
    /// Set when some fields could not be extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
    /// Set when processing the item failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: ItemDetails,
}

impl ItemMetadata {
    /// Build a record from extracted details.
    ///
    /// A failed extraction keeps the identity fields and records the reason
    /// instead of failing the item.
    pub fn build(content_type: ContentType, item: &ContentItem, details: Result<ItemDetails>) -> Self {
        let (details, extraction_error) = match details {
            Ok(details) => (details, None),
            Err(e) => {
                tracing::debug!(item_id = item.id(), error = %e, "Partial metadata extraction");
                (ItemDetails::None, Some(e.to_string()))
            }
        };

        Self {
            item_number: 0,
            id: item.id().to_string(),
            title: item.title(),
            content_type,
            downloaded: false,
            local_filename: None,
            local_path: None,
            files_downloaded: 0,
            extraction_error,
            error: None,
            details,
        }
    }

    /// Record where the main file of the item was written.
    pub fn set_local_file(&mut self, path: &Path) {
        self.downloaded = true;
        self.local_filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        self.local_path = Some(path.to_path_buf());
    }
}

/// Result of processing one item that wrote something to disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadInfo {
    /// Main file or folder written for the item.
    pub path: PathBuf,
    /// Bytes fetched over the network.
    pub bytes: u64,
    /// Files fetched over the network.
    pub files: u64,
    /// Every file of the item already existed.
    pub skipped: bool,
}

/// An item that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub item_id: String,
    pub title: String,
    pub error_type: String,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

impl ItemError {
    pub fn new(item: &ContentItem, error: &Error) -> Self {
        Self {
            item_id: item.id().to_string(),
            title: item.title(),
            error_type: error.kind().to_string(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Counters for one content type in one course.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadStats {
    pub total_items: u64,
    /// Items processed successfully, including metadata-only items.
    pub downloaded_items: u64,
    /// Items whose files all existed already.
    pub skipped_items: u64,
    pub failed_items: u64,
    pub files_downloaded: u64,
    pub total_size_bytes: u64,
    #[serde(default)]
    pub errors: Vec<ItemError>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Layout of `{content_type}_metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentMetadataFile {
    pub content_type: ContentType,
    pub course_id: String,
    pub course_name: String,
    pub download_date: DateTime<Local>,
    pub total_items: u64,
    pub stats: DownloadStats,
    pub items: Vec<ItemMetadata>,
}

/// A downloader for one content type.
#[async_trait]
pub trait ContentDownloader: Send + Sync {
    fn context(&self) -> &DownloaderContext;

    fn content_type(&self) -> ContentType;

    /// Stable key for configuration toggles and progress nodes.
    fn content_type_name(&self) -> &'static str {
        self.content_type().as_str()
    }

    /// List the items of this type in a course. One upstream listing.
    async fn fetch_content_list(&self, course: &CourseInfo) -> Result<Vec<ContentItem>>;

    /// Extract metadata for an item. Never fails.
    fn extract_metadata(&self, item: &ContentItem) -> ItemMetadata;

    /// Perform the side effects for one item.
    ///
    /// `Ok(None)` means metadata only, nothing written besides the aggregate.
    async fn process_content_item(
        &self,
        course: &CourseInfo,
        item: &ContentItem,
        content_dir: &Path,
        metadata: &mut ItemMetadata,
    ) -> Result<Option<DownloadInfo>>;

    /// Runs after every item, before the aggregate metadata is written.
    async fn finish_course(
        &self,
        _course: &CourseInfo,
        _content_dir: &Path,
        _items: &[ItemMetadata],
        _stats: &mut DownloadStats,
    ) -> Result<()> {
        Ok(())
    }

    /// Download this content type for one course.
    async fn download_course_content(&self, course: &CourseInfo) -> Result<DownloadStats> {
        run_content_loop(self, course).await
    }
}

/// The shared per-course loop behind [`ContentDownloader::download_course_content`].
pub async fn run_content_loop<D>(downloader: &D, course: &CourseInfo) -> Result<DownloadStats>
where
    D: ContentDownloader + ?Sized,
{
    let ctx = downloader.context();
    let content_type = downloader.content_type();
    let name = downloader.content_type_name();

    let content_dir = content_type_dir(&ctx.settings.root, course, content_type);
    ensure_dir(&content_dir).await?;

    tracing::info!(course_id = %course.id, content_type = name, "Fetching content list");
    let items = downloader.fetch_content_list(course).await?;

    let mut stats = DownloadStats {
        total_items: items.len() as u64,
        ..Default::default()
    };
    ctx.tracker
        .set_content_total(&course.id, name, items.len() as u64);

    if items.is_empty() {
        tracing::info!(course_id = %course.id, content_type = name, "No items found");
    }

    let mut items_metadata = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let number = index + 1;
        let title = item.title();
        ctx.tracker
            .update_item_progress(&course.id, name, index as u64, Some(&title));

        let mut metadata = downloader.extract_metadata(item);
        metadata.item_number = number;

        match downloader
            .process_content_item(course, item, &content_dir, &mut metadata)
            .await
        {
            Ok(Some(info)) => {
                stats.files_downloaded += info.files;
                stats.total_size_bytes += info.bytes;
                metadata.files_downloaded = metadata.files_downloaded.max(info.files);
                if info.skipped {
                    stats.skipped_items += 1;
                    ctx.tracker
                        .record_item_outcome(&course.id, name, ItemOutcome::Skipped);
                } else {
                    stats.downloaded_items += 1;
                    ctx.tracker
                        .record_item_outcome(&course.id, name, ItemOutcome::Success);
                }
            }
            Ok(None) => {
                stats.downloaded_items += 1;
                ctx.tracker
                    .record_item_outcome(&course.id, name, ItemOutcome::Success);
            }
            Err(e) => {
                tracing::warn!(
                    course_id = %course.id,
                    content_type = name,
                    item_id = item.id(),
                    error = %e,
                    "Failed to process item"
                );
                stats.failed_items += 1;
                metadata.error = Some(e.to_string());
                stats.errors.push(ItemError::new(item, &e));
                ctx.tracker.report_error(
                    ProgressLevel::Item,
                    &format!("{} '{}': {}", name, title, e),
                );
                ctx.tracker
                    .record_item_outcome(&course.id, name, ItemOutcome::Failed);
            }
        }

        ctx.tracker
            .update_item_progress(&course.id, name, number as u64, None);
        items_metadata.push(metadata);
    }

    if let Err(e) = downloader
        .finish_course(course, &content_dir, &items_metadata, &mut stats)
        .await
    {
        tracing::warn!(course_id = %course.id, content_type = name, error = %e, "Finalization failed");
        stats.warnings.push(format!("{}: {}", name, e));
    }

    let document = ContentMetadataFile {
        content_type,
        course_id: course.id.clone(),
        course_name: course.name.clone(),
        download_date: Local::now(),
        total_items: stats.total_items,
        stats: stats.clone(),
        items: items_metadata,
    };
    let metadata_path = metadata_file_path(&content_dir, content_type);
    write_json(&metadata_path, &document).await?;

    tracing::info!(
        course_id = %course.id,
        content_type = name,
        total = stats.total_items,
        downloaded = stats.downloaded_items,
        skipped = stats.skipped_items,
        failed = stats.failed_items,
        files = stats.files_downloaded,
        "Content type finished"
    );

    Ok(stats)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::api::SessionCredentials;
    use crate::fetch::RetryPolicy;
    use std::time::Duration;

    pub fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            timeout: Duration::from_secs(5),
            transfer_timeout: Duration::from_secs(5),
            jitter: false,
        }
    }

    pub fn settings(root: &Path) -> DownloadSettings {
        DownloadSettings {
            root: root.to_path_buf(),
            skip_existing: true,
            max_file_size_bytes: 1024 * 1024,
            max_filename_length: 150,
            blocked_extensions: vec![".exe".into()],
            web_scraping: true,
        }
    }

    pub fn api(base_url: &str) -> CanvasApi {
        CanvasApi::new(
            &SessionCredentials {
                api_base_url: base_url.to_string(),
                api_token: "test-token-1234".into(),
            },
            policy(),
            "canvas-sync-test",
        )
        .unwrap()
    }

    pub fn context(api: CanvasApi, root: &Path) -> DownloaderContext {
        DownloaderContext {
            api: Arc::new(api),
            tracker: Arc::new(ProgressTracker::new()),
            settings: settings(root),
            extractor: None,
        }
    }

    pub fn course(id: &str) -> CourseInfo {
        CourseInfo::from_course(&crate::api::types::Course {
            id: id.to_string(),
            name: "Algebra (MAT101) - A - 2024 - 1".into(),
            course_code: Some("MAT101".into()),
            workflow_state: None,
            start_at: None,
            term: None,
        })
    }
}
