//! Run-level results.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::ContentType;
use crate::course::CourseInfo;
use crate::download::DownloadStats;
use crate::error::Error;

/// A course or content-type failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    pub error_type: String,
    pub error_message: String,
    pub timestamp: DateTime<Local>,
}

impl ErrorRecord {
    pub fn new(course_id: Option<&str>, content_type: Option<ContentType>, error: &Error) -> Self {
        Self {
            course_id: course_id.map(str::to_string),
            content_type,
            error_type: error.kind().to_string(),
            error_message: error.to_string(),
            timestamp: Local::now(),
        }
    }
}

/// Results for one course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseResult {
    pub course_id: String,
    pub course_name: String,
    pub folder_path: PathBuf,
    pub content_results: BTreeMap<ContentType, DownloadStats>,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    /// No content type failed.
    pub success: bool,
    pub total_items: u64,
    pub errors: Vec<ErrorRecord>,
    pub warnings: Vec<String>,
}

impl CourseResult {
    pub fn new(course: &CourseInfo) -> Self {
        Self {
            course_id: course.id.clone(),
            course_name: course.name.clone(),
            folder_path: course.folder_path.clone(),
            content_results: BTreeMap::new(),
            start_time: Local::now(),
            end_time: None,
            success: false,
            total_items: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn record_content(&mut self, content_type: ContentType, stats: DownloadStats) {
        self.total_items += stats.total_items;
        self.warnings.extend(stats.warnings.iter().cloned());
        self.content_results.insert(content_type, stats);
    }

    pub fn record_content_error(&mut self, content_type: ContentType, error: &Error) {
        self.errors
            .push(ErrorRecord::new(Some(&self.course_id), Some(content_type), error));
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Local::now());
        self.success = self.errors.is_empty();
    }
}

/// Aggregate record of one synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResults {
    pub total_courses: u64,
    pub processed_courses: u64,
    pub successful_courses: u64,
    pub failed_courses: u64,

    pub total_content_items: u64,
    pub downloaded_items: u64,
    pub skipped_items: u64,
    pub failed_items: u64,

    pub total_files_downloaded: u64,
    pub total_bytes_downloaded: u64,

    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    #[serde(default)]
    pub cancelled: bool,

    pub course_results: BTreeMap<String, CourseResult>,
    pub errors: Vec<ErrorRecord>,
    pub warnings: Vec<String>,
    pub download_paths: Vec<PathBuf>,
    pub metadata_files: Vec<PathBuf>,
}

impl DownloadResults {
    pub fn new(total_courses: usize) -> Self {
        Self {
            total_courses: total_courses as u64,
            processed_courses: 0,
            successful_courses: 0,
            failed_courses: 0,
            total_content_items: 0,
            downloaded_items: 0,
            skipped_items: 0,
            failed_items: 0,
            total_files_downloaded: 0,
            total_bytes_downloaded: 0,
            start_time: Local::now(),
            end_time: None,
            cancelled: false,
            course_results: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            download_paths: Vec::new(),
            metadata_files: Vec::new(),
        }
    }

    /// Merge a course that ran to the end, possibly with content-type errors.
    pub fn record_course(&mut self, result: CourseResult, course_dir: PathBuf) {
        for stats in result.content_results.values() {
            self.total_content_items += stats.total_items;
            self.downloaded_items += stats.downloaded_items;
            self.skipped_items += stats.skipped_items;
            self.failed_items += stats.failed_items;
            self.total_files_downloaded += stats.files_downloaded;
            self.total_bytes_downloaded += stats.total_size_bytes;
        }
        self.errors.extend(result.errors.iter().cloned());
        self.warnings.extend(result.warnings.iter().cloned());
        self.download_paths.push(course_dir);

        self.successful_courses += 1;
        self.processed_courses += 1;
        self.course_results.insert(result.course_id.clone(), result);
    }

    /// Record a course that could not be processed.
    pub fn record_course_failure(&mut self, course_id: &str, error: &Error) {
        self.errors.push(ErrorRecord::new(Some(course_id), None, error));
        self.failed_courses += 1;
        self.processed_courses += 1;
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Local::now());
    }

    pub fn duration(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Local::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }

    /// Successful share of processed courses, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.processed_courses == 0 {
            return 0.0;
        }
        self.successful_courses as f64 / self.processed_courses as f64 * 100.0
    }

    /// Bytes per second over the whole run.
    pub fn average_speed(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_bytes_downloaded as f64 / secs
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration())
    }

    pub fn has_failures(&self) -> bool {
        self.failed_courses > 0
    }
}

/// `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::contract::test_support::course;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn test_course_counters_stay_consistent() {
        let mut results = DownloadResults::new(3);

        let mut ok = CourseResult::new(&course("C1"));
        ok.record_content(
            ContentType::Files,
            DownloadStats {
                total_items: 4,
                downloaded_items: 3,
                failed_items: 1,
                files_downloaded: 3,
                total_size_bytes: 300,
                ..Default::default()
            },
        );
        ok.record_content_error(ContentType::Quizzes, &Error::Api("boom".into()));
        ok.finish();
        assert!(!ok.success);
        results.record_course(ok, PathBuf::from("/tmp/C1"));

        results.record_course_failure("C2", &Error::NotFound("courses/C2".into()));

        assert_eq!(results.processed_courses, 2);
        assert_eq!(
            results.successful_courses + results.failed_courses,
            results.processed_courses
        );
        assert!(results.processed_courses <= results.total_courses);
        assert_eq!(results.total_content_items, 4);
        assert_eq!(results.total_bytes_downloaded, 300);
        assert_eq!(results.errors.len(), 2);
        assert_eq!(results.success_rate(), 50.0);
        assert!(results.has_failures());
    }
}
