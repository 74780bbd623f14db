//! Course files, preserving the Canvas folder structure.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::Folder;
use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::common::{fetch_file, parse_timestamp, FileOutcome, FileRequest};
use crate::download::contract::{
    ContentDownloader, ContentItem, DownloadInfo, DownloaderContext, FileEntry, ItemDetails,
    ItemMetadata,
};
use crate::error::Result;
use crate::fs::{file_type_label, sanitize_path_component};

/// Name Canvas gives the root folder of every course.
const ROOT_FOLDER: &str = "course files";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileDetails {
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub file_type: String,
    pub folder: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub locked: bool,
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

/// Relative folder path for a Canvas `full_name`, without the course root.
pub fn relative_folder(full_name: &str) -> String {
    let mut parts = full_name.split('/').map(str::trim).filter(|p| !p.is_empty());
    let first = parts.next();

    let rest: Vec<&str> = match first {
        Some(root) if root.eq_ignore_ascii_case(ROOT_FOLDER) => parts.collect(),
        Some(other) => std::iter::once(other).chain(parts).collect(),
        None => Vec::new(),
    };

    rest.into_iter()
        .map(sanitize_path_component)
        .collect::<Vec<_>>()
        .join("/")
}

fn folder_map(folders: &[Folder]) -> HashMap<String, String> {
    folders
        .iter()
        .map(|folder| (folder.id.clone(), relative_folder(&folder.full_name)))
        .collect()
}

pub struct FilesDownloader {
    ctx: DownloaderContext,
}

impl FilesDownloader {
    pub fn new(ctx: DownloaderContext) -> Self {
        Self { ctx }
    }

    fn skipped(metadata: &mut ItemMetadata, path: PathBuf, reason: String) -> Option<DownloadInfo> {
        tracing::debug!(file = %metadata.title, reason = %reason, "Skipping file");
        if let ItemDetails::File(details) = &mut metadata.details {
            details.skip_reason = Some(reason);
        }
        Some(DownloadInfo {
            path,
            bytes: 0,
            files: 0,
            skipped: true,
        })
    }
}

#[async_trait]
impl ContentDownloader for FilesDownloader {
    fn context(&self) -> &DownloaderContext {
        &self.ctx
    }

    fn content_type(&self) -> ContentType {
        ContentType::Files
    }

    async fn fetch_content_list(&self, course: &CourseInfo) -> Result<Vec<ContentItem>> {
        let folders = match self.ctx.api.list_folders(&course.id).await {
            Ok(folders) => folder_map(&folders),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(course_id = %course.id, error = %e, "Folder listing failed, using a flat layout");
                self.ctx
                    .tracker
                    .report_warning(&format!("Course {}: folder listing failed: {}", course.id, e));
                HashMap::new()
            }
        };

        let files = self.ctx.api.list_files(&course.id).await?;
        Ok(files
            .into_iter()
            .map(|file| {
                let folder = file
                    .folder_id
                    .as_ref()
                    .and_then(|id| folders.get(id).cloned())
                    .unwrap_or_default();
                ContentItem::File(FileEntry { file, folder })
            })
            .collect())
    }

    fn extract_metadata(&self, item: &ContentItem) -> ItemMetadata {
        let details = match item {
            ContentItem::File(entry) => {
                let file = &entry.file;
                parse_timestamp("created_at", file.created_at.as_deref()).and_then(|created_at| {
                    Ok(ItemDetails::File(FileDetails {
                        size: file.size,
                        content_type: file.content_type.clone(),
                        file_type: file_type_label(file.name()),
                        folder: entry.folder.clone(),
                        created_at,
                        updated_at: parse_timestamp("updated_at", file.updated_at.as_deref())?,
                        locked: file.locked || file.locked_for_user,
                        hidden: file.hidden,
                        skip_reason: None,
                    }))
                })
            }
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
        let ContentItem::File(entry) = item else {
            return Ok(None);
        };
        let file = &entry.file;

        let dir = if entry.folder.is_empty() {
            content_dir.to_path_buf()
        } else {
            content_dir.join(&entry.folder)
        };

        if file.locked || file.locked_for_user {
            return Ok(Self::skipped(metadata, dir, "locked".into()));
        }
        if file.hidden {
            return Ok(Self::skipped(metadata, dir, "hidden".into()));
        }

        let url = file
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.ctx.api.file_download_url(&course.id, &file.id));

        let outcome = fetch_file(
            &self.ctx,
            FileRequest {
                url: &url,
                dir: &dir,
                name: file.name(),
                expected_size: file.size,
                via_web: false,
            },
        )
        .await?;

        match outcome {
            FileOutcome::Downloaded { path, bytes } => {
                metadata.set_local_file(&path);
                metadata.files_downloaded = 1;
                Ok(Some(DownloadInfo {
                    path,
                    bytes,
                    files: 1,
                    skipped: false,
                }))
            }
            FileOutcome::Skipped { path, reason } => {
                if path.exists() {
                    metadata.set_local_file(&path);
                }
                Ok(Self::skipped(metadata, path, reason.to_string()))
            }
        }
    }
}
