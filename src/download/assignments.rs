//! Assignments: description pages plus the files they embed.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::types::Assignment;
use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::common::{
    fetch_file, html_document, item_filename, parse_timestamp, write_text, FileRequest, FileTally,
};
use crate::download::contract::{
    ContentDownloader, ContentItem, DownloadInfo, DownloaderContext, ItemDetails, ItemMetadata,
};
use crate::error::Result;

fn embedded_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/files/(\d+)").expect("static regex"))
}

/// File ids referenced from an HTML description, in ascending order.
pub fn embedded_file_ids(html: &str) -> Vec<String> {
    embedded_file_re()
        .captures_iter(html)
        .map(|caps| caps[1].to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentDetails {
    pub due_at: Option<DateTime<Utc>>,
    pub unlock_at: Option<DateTime<Utc>>,
    pub lock_at: Option<DateTime<Utc>>,
    pub points_possible: Option<f64>,
    pub grading_type: Option<String>,
    pub submission_types: Vec<String>,
    pub published: bool,
    pub submission_state: Option<String>,
    pub embedded_files: usize,
    #[serde(default)]
    pub embedded_files_failed: usize,
    pub html_url: Option<String>,
}

fn assignment_details(assignment: &Assignment) -> Result<ItemDetails> {
    Ok(ItemDetails::Assignment(AssignmentDetails {
        due_at: parse_timestamp("due_at", assignment.due_at.as_deref())?,
        unlock_at: parse_timestamp("unlock_at", assignment.unlock_at.as_deref())?,
        lock_at: parse_timestamp("lock_at", assignment.lock_at.as_deref())?,
        points_possible: assignment.points_possible,
        grading_type: assignment.grading_type.clone(),
        submission_types: assignment.submission_types.clone(),
        published: assignment.published,
        submission_state: assignment
            .submission
            .as_ref()
            .and_then(|s| s.workflow_state.clone()),
        embedded_files: assignment
            .description
            .as_deref()
            .map(|d| embedded_file_ids(d).len())
            .unwrap_or(0),
        embedded_files_failed: 0,
        html_url: assignment.html_url.clone(),
    }))
}

pub struct AssignmentsDownloader {
    ctx: DownloaderContext,
}

impl AssignmentsDownloader {
    pub fn new(ctx: DownloaderContext) -> Self {
        Self { ctx }
    }

    async fn save_assignment(
        &self,
        course: &CourseInfo,
        assignment: &Assignment,
        content_dir: &Path,
        metadata: &mut ItemMetadata,
    ) -> Result<Option<DownloadInfo>> {
        let settings = &self.ctx.settings;
        let filename = item_filename(
            metadata.item_number,
            &assignment.name,
            ".html",
            settings.max_filename_length,
        );
        let path = content_dir.join(&filename);

        let mut fields = Vec::new();
        if let Some(due) = &assignment.due_at {
            fields.push(("Due", due.clone()));
        }
        if let Some(points) = assignment.points_possible {
            fields.push(("Points", points.to_string()));
        }
        if !assignment.submission_types.is_empty() {
            fields.push(("Submission", assignment.submission_types.join(", ")));
        }
        if let Some(url) = &assignment.html_url {
            fields.push(("Canvas URL", url.clone()));
        }

        let description = assignment.description.as_deref().unwrap_or_default();
        write_text(&path, &html_document(&assignment.name, &fields, description)).await?;
        metadata.set_local_file(&path);

        let mut tally = FileTally::default();
        let mut failed = 0;
        let files_dir = content_dir.join("files");

        for file_id in embedded_file_ids(description) {
            let file = match self.ctx.api.get_file(&course.id, &file_id).await {
                Ok(file) => file,
                Err(e) => {
                    failed += 1;
                    let message = format!(
                        "Assignment '{}': embedded file {} unavailable: {}",
                        assignment.name, file_id, e
                    );
                    tracing::warn!("{}", message);
                    self.ctx.tracker.report_warning(&message);
                    continue;
                }
            };

            let url = file
                .url
                .clone()
                .unwrap_or_else(|| self.ctx.api.file_download_url(&course.id, &file.id));
            let name = format!("{:03}_{}", metadata.item_number, file.name());
            let outcome = fetch_file(
                &self.ctx,
                FileRequest {
                    url: &url,
                    dir: &files_dir,
                    name: &name,
                    expected_size: file.size,
                    via_web: false,
                },
            )
            .await;

            match outcome {
                Ok(outcome) => tally.record(&outcome),
                Err(e) => {
                    failed += 1;
                    let message = format!(
                        "Assignment '{}': failed to download {}: {}",
                        assignment.name,
                        file.name(),
                        e
                    );
                    tracing::warn!("{}", message);
                    self.ctx.tracker.report_warning(&message);
                }
            }
        }

        metadata.files_downloaded = tally.downloaded;
        if let ItemDetails::Assignment(details) = &mut metadata.details {
            details.embedded_files_failed = failed;
        }

        Ok(Some(tally.info(path)))
    }
}

#[async_trait]
impl ContentDownloader for AssignmentsDownloader {
    fn context(&self) -> &DownloaderContext {
        &self.ctx
    }

    fn content_type(&self) -> ContentType {
        ContentType::Assignments
    }

    async fn fetch_content_list(&self, course: &CourseInfo) -> Result<Vec<ContentItem>> {
        let assignments = self.ctx.api.list_assignments(&course.id).await?;
        Ok(assignments.into_iter().map(ContentItem::Assignment).collect())
    }

    fn extract_metadata(&self, item: &ContentItem) -> ItemMetadata {
        let details = match item {
            ContentItem::Assignment(assignment) => assignment_details(assignment),
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
            ContentItem::Assignment(assignment) => {
                self.save_assignment(course, assignment, content_dir, metadata)
                    .await
            }
            _ => Ok(None),
        }
    }
}
