//! Discussion topics, and the topic handling shared with announcements.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::DiscussionTopic;
use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::common::{
    fetch_file, html_document, item_filename, parse_timestamp, write_text, FileRequest, FileTally,
};
use crate::download::contract::{
    ContentDownloader, ContentItem, DownloadInfo, DownloaderContext, ItemDetails, ItemMetadata,
};
use crate::error::Result;

/// Metadata fields of a discussion topic or announcement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicDetails {
    pub author: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub last_reply_at: Option<DateTime<Utc>>,
    pub discussion_type: Option<String>,
    pub reply_count: u32,
    pub locked: bool,
    pub pinned: bool,
    pub message_length: usize,
    pub attachment_count: usize,
    pub attachments: Vec<String>,
    pub html_url: Option<String>,
}

pub(crate) fn topic_details(topic: &DiscussionTopic) -> Result<ItemDetails> {
    let posted = topic.posted_at.as_deref().or(topic.delayed_post_at.as_deref());

    Ok(ItemDetails::Topic(TopicDetails {
        author: topic.author_name(),
        posted_at: parse_timestamp("posted_at", posted)?,
        last_reply_at: parse_timestamp("last_reply_at", topic.last_reply_at.as_deref())?,
        discussion_type: topic.discussion_type.clone(),
        reply_count: topic.discussion_subentry_count,
        locked: topic.locked,
        pinned: topic.pinned,
        message_length: topic.message.as_deref().map(str::len).unwrap_or(0),
        attachment_count: topic.attachments.len(),
        attachments: topic.attachments.iter().map(|a| a.name()).collect(),
        html_url: topic.html_url.clone(),
    }))
}

/// Write `NNN_<title>.html` and download attachments into `attachments/`.
pub(crate) async fn save_topic(
    ctx: &DownloaderContext,
    topic: &DiscussionTopic,
    content_dir: &Path,
    metadata: &mut ItemMetadata,
) -> Result<Option<DownloadInfo>> {
    let filename = item_filename(
        metadata.item_number,
        &topic.title,
        ".html",
        ctx.settings.max_filename_length,
    );
    let path = content_dir.join(&filename);

    let mut fields = Vec::new();
    if let Some(author) = topic.author_name() {
        fields.push(("Author", author));
    }
    if let Some(posted) = topic.posted_at.as_deref().or(topic.delayed_post_at.as_deref()) {
        fields.push(("Posted", posted.to_string()));
    }
    if topic.discussion_subentry_count > 0 {
        fields.push(("Replies", topic.discussion_subentry_count.to_string()));
    }
    if let Some(url) = &topic.html_url {
        fields.push(("Canvas URL", url.clone()));
    }

    let body = topic.message.as_deref().unwrap_or_default();
    write_text(&path, &html_document(&topic.title, &fields, body)).await?;
    metadata.set_local_file(&path);

    let mut tally = FileTally::default();
    let attachments_dir = content_dir.join("attachments");
    for attachment in &topic.attachments {
        let Some(url) = attachment.url.as_deref() else {
            tracing::debug!(attachment_id = %attachment.id, "Attachment without URL");
            continue;
        };
        let name = format!("{:03}_{}", metadata.item_number, attachment.name());
        let outcome = fetch_file(
            ctx,
            FileRequest {
                url,
                dir: &attachments_dir,
                name: &name,
                expected_size: attachment.size,
                via_web: false,
            },
        )
        .await?;
        tally.record(&outcome);
    }
    metadata.files_downloaded = tally.downloaded;

    Ok(Some(tally.info(path)))
}

/// Regular discussion topics, excluding announcements.
pub struct DiscussionsDownloader {
    ctx: DownloaderContext,
}

impl DiscussionsDownloader {
    pub fn new(ctx: DownloaderContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ContentDownloader for DiscussionsDownloader {
    fn context(&self) -> &DownloaderContext {
        &self.ctx
    }

    fn content_type(&self) -> ContentType {
        ContentType::Discussions
    }

    async fn fetch_content_list(&self, course: &CourseInfo) -> Result<Vec<ContentItem>> {
        let topics = self.ctx.api.list_discussion_topics(&course.id).await?;
        Ok(topics
            .into_iter()
            .filter(|topic| topic.discussion_type.as_deref() != Some("announcement"))
            .map(ContentItem::Discussion)
            .collect())
    }

    fn extract_metadata(&self, item: &ContentItem) -> ItemMetadata {
        let details = match item {
            ContentItem::Discussion(topic) => topic_details(topic),
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
            ContentItem::Discussion(topic) => save_topic(&self.ctx, topic, content_dir, metadata).await,
            _ => Ok(None),
        }
    }
}
