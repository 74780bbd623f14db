//! Course announcements.

use std::path::Path;

use async_trait::async_trait;

use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::contract::{
    ContentDownloader, ContentItem, DownloadInfo, DownloaderContext, ItemDetails, ItemMetadata,
};
use crate::download::discussions::{save_topic, topic_details};
use crate::error::Result;

pub struct AnnouncementsDownloader {
    ctx: DownloaderContext,
}

impl AnnouncementsDownloader {
    pub fn new(ctx: DownloaderContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ContentDownloader for AnnouncementsDownloader {
    fn context(&self) -> &DownloaderContext {
        &self.ctx
    }

    fn content_type(&self) -> ContentType {
        ContentType::Announcements
    }

    async fn fetch_content_list(&self, course: &CourseInfo) -> Result<Vec<ContentItem>> {
        let topics = self.ctx.api.list_announcements(&course.id).await?;
        Ok(topics.into_iter().map(ContentItem::Announcement).collect())
    }

    fn extract_metadata(&self, item: &ContentItem) -> ItemMetadata {
        let details = match item {
            ContentItem::Announcement(topic) => topic_details(topic),
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
        match item {
            ContentItem::Announcement(topic) => {
                save_topic(&self.ctx, topic, content_dir, metadata).await
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::contract::test_support::{api, context, course};
    use crate::fs::content_type_dir;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_announcements_written_as_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/discussion_topics"))
            .and(query_param("only_announcements", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "title": "Welcome!", "message": "<p>Hello class</p>", "user_name": "TA"},
                {"id": 2, "title": "Exam moved", "message": null}
            ])))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let downloader = AnnouncementsDownloader::new(context(api(&server.uri()), dir.path()));
        let course = course("C1");

        let stats = downloader.download_course_content(&course).await.unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.downloaded_items, 2);
        assert_eq!(stats.files_downloaded, 0);

        let content_dir = content_type_dir(dir.path(), &course, ContentType::Announcements);
        assert!(content_dir.join("001_Welcome!.html").exists());
        assert!(content_dir.join("002_Exam moved.html").exists());
    }
}
