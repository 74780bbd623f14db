//! Course enrollments, recorded as metadata only.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::types::Enrollment;
use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::contract::{
    ContentDownloader, ContentItem, DownloadInfo, DownloaderContext, ItemDetails, ItemMetadata,
};
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonDetails {
    pub user_id: Option<String>,
    pub name: String,
    pub sortable_name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub enrollment_type: String,
    pub section_id: Option<String>,
    pub enrollment_state: Option<String>,
}

/// `StudentEnrollment` -> `Student`.
fn role_label(enrollment: &Enrollment) -> String {
    let raw = enrollment
        .role
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(&enrollment.enrollment_type);
    match raw.strip_suffix("Enrollment") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => raw.to_string(),
    }
}

fn person_details(enrollment: &Enrollment) -> Result<ItemDetails> {
    let user = enrollment.user.as_ref();
    Ok(ItemDetails::Person(PersonDetails {
        user_id: enrollment
            .user_id
            .clone()
            .or_else(|| user.map(|u| u.id.clone())),
        name: user.map(|u| u.name.clone()).unwrap_or_default(),
        sortable_name: user.and_then(|u| u.sortable_name.clone()),
        email: user.and_then(|u| u.email.clone()),
        role: role_label(enrollment),
        enrollment_type: enrollment.enrollment_type.clone(),
        section_id: enrollment.course_section_id.clone(),
        enrollment_state: enrollment.enrollment_state.clone(),
    }))
}

pub struct PeopleDownloader {
    ctx: DownloaderContext,
}

impl PeopleDownloader {
    pub fn new(ctx: DownloaderContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ContentDownloader for PeopleDownloader {
    fn context(&self) -> &DownloaderContext {
        &self.ctx
    }

    fn content_type(&self) -> ContentType {
        ContentType::People
    }

    async fn fetch_content_list(&self, course: &CourseInfo) -> Result<Vec<ContentItem>> {
        let enrollments = self.ctx.api.list_enrollments(&course.id).await?;
        Ok(enrollments.into_iter().map(ContentItem::Person).collect())
    }

    fn extract_metadata(&self, item: &ContentItem) -> ItemMetadata {
        let details = match item {
            ContentItem::Person(enrollment) => person_details(enrollment),
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
}
