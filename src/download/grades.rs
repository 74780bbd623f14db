//! Grades, recorded as metadata only.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::Assignment;
use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::common::parse_timestamp;
use crate::download::contract::{
    ContentDownloader, ContentItem, DownloadInfo, DownloadStats, DownloaderContext, ItemDetails,
    ItemMetadata,
};
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradeDetails {
    pub points_possible: Option<f64>,
    pub score: Option<f64>,
    pub grade: Option<String>,
    pub percentage: Option<f64>,
    pub submission_state: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
    pub late: bool,
    pub missing: bool,
    pub due_at: Option<DateTime<Utc>>,
}

fn grade_details(assignment: &Assignment) -> Result<ItemDetails> {
    let submission = assignment.submission.clone().unwrap_or_default();
    let percentage = match (submission.score, assignment.points_possible) {
        (Some(score), Some(points)) if points > 0.0 => Some(score / points * 100.0),
        _ => None,
    };

    Ok(ItemDetails::Grade(GradeDetails {
        points_possible: assignment.points_possible,
        score: submission.score,
        grade: submission.grade.clone(),
        percentage,
        submission_state: submission.workflow_state.clone(),
        submitted_at: parse_timestamp("submitted_at", submission.submitted_at.as_deref())?,
        graded_at: parse_timestamp("graded_at", submission.graded_at.as_deref())?,
        late: submission.late,
        missing: submission.missing,
        due_at: parse_timestamp("due_at", assignment.due_at.as_deref())?,
    }))
}

pub struct GradesDownloader {
    ctx: DownloaderContext,
}

impl GradesDownloader {
    pub fn new(ctx: DownloaderContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ContentDownloader for GradesDownloader {
    fn context(&self) -> &DownloaderContext {
        &self.ctx
    }

    fn content_type(&self) -> ContentType {
        ContentType::Grades
    }

    async fn fetch_content_list(&self, course: &CourseInfo) -> Result<Vec<ContentItem>> {
        let assignments = self.ctx.api.list_assignments(&course.id).await?;
        Ok(assignments.into_iter().map(ContentItem::Grade).collect())
    }

    fn extract_metadata(&self, item: &ContentItem) -> ItemMetadata {
        let details = match item {
            ContentItem::Grade(assignment) => grade_details(assignment),
            _ => Ok(ItemDetails::None),
        };
        ItemMetadata::build(self.content_type(), item, details)
    }

    async fn process_content_item(
        &self,
        _course: &CourseInfo,
        _item: &ContentItem,
        _content_dir: &Path,
        _metadata: &mut ItemMetadata,
    ) -> Result<Option<DownloadInfo>> {
        Ok(None)
    }

    async fn finish_course(
        &self,
        course: &CourseInfo,
        _content_dir: &Path,
        items: &[ItemMetadata],
        _stats: &mut DownloadStats,
    ) -> Result<()> {
        let graded = items
            .iter()
            .filter(|item| matches!(&item.details, ItemDetails::Grade(g) if g.score.is_some()))
            .count();
        tracing::info!(course_id = %course.id, graded, total = items.len(), "Grades recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::contract::test_support::{api, context, course};
    use crate::download::contract::ContentMetadataFile;
    use crate::fs::{content_type_dir, metadata_file_path};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_grades_are_metadata_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/assignments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "Lab 1", "points_possible": 10.0,
                 "submission": {"score": 8.5, "grade": "8.5", "workflow_state": "graded"}},
                {"id": 2, "name": "Lab 2", "points_possible": 10.0,
                 "submission": {"workflow_state": "unsubmitted", "missing": true}}
            ])))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let downloader = GradesDownloader::new(context(api(&server.uri()), dir.path()));
        let course = course("C1");

        let stats = downloader.download_course_content(&course).await.unwrap();
        assert_eq!(stats.downloaded_items, 2);
        assert_eq!(stats.files_downloaded, 0);

        let content_dir = content_type_dir(dir.path(), &course, ContentType::Grades);
        let written: ContentMetadataFile = serde_json::from_str(
            &std::fs::read_to_string(metadata_file_path(&content_dir, ContentType::Grades))
                .unwrap(),
        )
        .unwrap();
        let ItemDetails::Grade(first) = &written.items[0].details else {
            panic!("expected grade details");
        };
        assert_eq!(first.score, Some(8.5));
        assert_eq!(first.percentage, Some(85.0));
        let ItemDetails::Grade(second) = &written.items[1].details else {
            panic!("expected grade details");
        };
        assert!(second.missing);
        assert_eq!(second.percentage, None);
    }
}
