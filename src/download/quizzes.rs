//! Quizzes: description page plus settings.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::Quiz;
use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::common::{html_document, item_filename, parse_timestamp, write_text};
use crate::download::contract::{
    ContentDownloader, ContentItem, DownloadInfo, DownloaderContext, ItemDetails, ItemMetadata,
};
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizDetails {
    pub quiz_type: Option<String>,
    pub points_possible: Option<f64>,
    /// Minutes.
    pub time_limit: Option<u32>,
    pub allowed_attempts: Option<i32>,
    pub question_count: Option<u32>,
    pub due_at: Option<DateTime<Utc>>,
    pub unlock_at: Option<DateTime<Utc>>,
    pub lock_at: Option<DateTime<Utc>>,
    pub published: Option<bool>,
    pub html_url: Option<String>,
}

fn quiz_details(quiz: &Quiz) -> Result<ItemDetails> {
    Ok(ItemDetails::Quiz(QuizDetails {
        quiz_type: quiz.quiz_type.clone(),
        points_possible: quiz.points_possible,
        time_limit: quiz.time_limit,
        allowed_attempts: quiz.allowed_attempts,
        question_count: quiz.question_count,
        due_at: parse_timestamp("due_at", quiz.due_at.as_deref())?,
        unlock_at: parse_timestamp("unlock_at", quiz.unlock_at.as_deref())?,
        lock_at: parse_timestamp("lock_at", quiz.lock_at.as_deref())?,
        published: quiz.published,
        html_url: quiz.html_url.clone(),
    }))
}

pub struct QuizzesDownloader {
    ctx: DownloaderContext,
}

impl QuizzesDownloader {
    pub fn new(ctx: DownloaderContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ContentDownloader for QuizzesDownloader {
    fn context(&self) -> &DownloaderContext {
        &self.ctx
    }

    fn content_type(&self) -> ContentType {
        ContentType::Quizzes
    }

    async fn fetch_content_list(&self, course: &CourseInfo) -> Result<Vec<ContentItem>> {
        let quizzes = self.ctx.api.list_quizzes(&course.id).await?;
        Ok(quizzes.into_iter().map(ContentItem::Quiz).collect())
    }

    fn extract_metadata(&self, item: &ContentItem) -> ItemMetadata {
        let details = match item {
            ContentItem::Quiz(quiz) => quiz_details(quiz),
            _ => Ok(ItemDetails::None),
        };
        ItemMetadata::build(self.content_type(), item, details)
    }

    async fn process_content_item(
        &self,
        _course: &CourseInfo,
        item: &ContentItem,
        content_dir: &Path,
        metadata: &mut ItemMetadata,
    ) -> Result<Option<DownloadInfo>> {
        let ContentItem::Quiz(quiz) = item else {
            return Ok(None);
        };

        let mut fields = Vec::new();
        if let Some(kind) = &quiz.quiz_type {
            fields.push(("Type", kind.clone()));
        }
        if let Some(points) = quiz.points_possible {
            fields.push(("Points", points.to_string()));
        }
        if let Some(minutes) = quiz.time_limit {
            fields.push(("Time limit", format!("{} minutes", minutes)));
        }
        if let Some(attempts) = quiz.allowed_attempts {
            let label = if attempts < 0 {
                "unlimited".to_string()
            } else {
                attempts.to_string()
            };
            fields.push(("Attempts", label));
        }
        if let Some(due) = &quiz.due_at {
            fields.push(("Due", due.clone()));
        }

        let path = content_dir.join(item_filename(
            metadata.item_number,
            &quiz.title,
            ".html",
            self.ctx.settings.max_filename_length,
        ));
        let body = quiz.description.as_deref().unwrap_or_default();
        write_text(&path, &html_document(&quiz.title, &fields, body)).await?;
        metadata.set_local_file(&path);

        Ok(Some(DownloadInfo {
            path,
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::contract::test_support::{api, context, course};
    use crate::fs::content_type_dir;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_quiz_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/quizzes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 4, "title": "Midterm", "description": "<p>Chapters 1-4</p>",
                 "quiz_type": "assignment", "time_limit": 90, "allowed_attempts": -1}
            ])))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let downloader = QuizzesDownloader::new(context(api(&server.uri()), dir.path()));
        let course = course("C1");

        let stats = downloader.download_course_content(&course).await.unwrap();
        assert_eq!(stats.downloaded_items, 1);

        let html = std::fs::read_to_string(
            content_type_dir(dir.path(), &course, ContentType::Quizzes).join("001_Midterm.html"),
        )
        .unwrap();
        assert!(html.contains("<p>Chapters 1-4</p>"));
        assert!(html.contains("90 minutes"));
        assert!(html.contains("unlimited"));
    }
}
