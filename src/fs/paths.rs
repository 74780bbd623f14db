//! Path and directory management.

use std::path::{Path, PathBuf};

use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::error::Result;

/// `{root}/{year}/{semester}/{course folder}`.
pub fn course_root(root: &Path, course: &CourseInfo) -> PathBuf {
    root.join(&course.folder_path)
}

/// `{root}/{year}/{semester}/{course folder}/{content_type}`.
pub fn content_type_dir(root: &Path, course: &CourseInfo, content_type: ContentType) -> PathBuf {
    course_root(root, course).join(content_type.as_str())
}

/// Aggregate metadata file for one course/content-type pair.
pub fn metadata_file_path(content_dir: &Path, content_type: ContentType) -> PathBuf {
    content_dir.join(format!("{}_metadata.json", content_type.as_str()))
}

/// Ensure a directory exists, creating it if necessary.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}
