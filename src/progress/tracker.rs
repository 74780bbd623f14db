//! Hierarchical progress tracker.
//!
//! Nodes form a tree: application, then one node per course, then one per
//! (course, content type). A single item node and a single download node
//! track the work currently in flight.
//!
//! Every mutation holds the tracker's mutex for the whole state transition.
//! Observers subscribe per event name and are called after the lock is
//! released, so a callback may read from the tracker again.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::progress::state::{ProgressLevel, ProgressState, ProgressStatus};

/// Event names observers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressEventKind {
    Application,
    Course,
    ContentType,
    Item,
    Download,
    Warning,
    Error,
}

impl ProgressEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressEventKind::Application => "application",
            ProgressEventKind::Course => "course",
            ProgressEventKind::ContentType => "content_type",
            ProgressEventKind::Item => "item",
            ProgressEventKind::Download => "download",
            ProgressEventKind::Warning => "warning",
            ProgressEventKind::Error => "error",
        }
    }

    fn for_level(level: ProgressLevel) -> Self {
        match level {
            ProgressLevel::Application => ProgressEventKind::Application,
            ProgressLevel::Course => ProgressEventKind::Course,
            ProgressLevel::ContentType => ProgressEventKind::ContentType,
            ProgressLevel::Item => ProgressEventKind::Item,
            ProgressLevel::Download => ProgressEventKind::Download,
        }
    }
}

impl fmt::Display for ProgressEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot handed to observers.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub kind: ProgressEventKind,
    /// Course id, `course_id:content_type`, or empty for the application node.
    pub key: String,
    pub state: ProgressState,
    pub message: Option<String>,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Outcome of processing one item, for per-node counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Skipped,
    Failed,
}

/// Aggregate view of the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct OverallStatistics {
    pub total_courses: u64,
    pub completed_courses: u64,
    pub percentage: f64,
    pub items_succeeded: u64,
    pub items_skipped: u64,
    pub items_failed: u64,
    pub files_downloaded: u64,
    pub bytes_downloaded: u64,
    pub errors: u64,
    pub warnings: u64,
    pub elapsed_seconds: f64,
}

type ContentKey = (String, String);

struct Inner {
    application: ProgressState,
    courses: HashMap<String, ProgressState>,
    content_types: HashMap<ContentKey, ProgressState>,
    current_course: Option<String>,
    current_content: Option<ContentKey>,
    item: Option<ProgressState>,
    download: Option<ProgressState>,
    files_downloaded: u64,
    warnings: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            application: ProgressState::new(ProgressLevel::Application, "canvas-sync"),
            courses: HashMap::new(),
            content_types: HashMap::new(),
            current_course: None,
            current_content: None,
            item: None,
            download: None,
            files_downloaded: 0,
            warnings: 0,
        }
    }

    fn application_event(&self, message: Option<String>) -> ProgressEvent {
        ProgressEvent {
            kind: ProgressEventKind::Application,
            key: String::new(),
            state: self.application.clone(),
            message,
        }
    }

    fn course_event(&self, course_id: &str) -> Option<ProgressEvent> {
        self.courses.get(course_id).map(|state| ProgressEvent {
            kind: ProgressEventKind::Course,
            key: course_id.to_string(),
            state: state.clone(),
            message: None,
        })
    }

    fn content_event(&self, key: &ContentKey) -> Option<ProgressEvent> {
        self.content_types.get(key).map(|state| ProgressEvent {
            kind: ProgressEventKind::ContentType,
            key: format!("{}:{}", key.0, key.1),
            state: state.clone(),
            message: None,
        })
    }
}

/// Thread-safe progress tree shared by the orchestrator and downloaders.
pub struct ProgressTracker {
    inner: Mutex<Inner>,
    callbacks: Mutex<HashMap<ProgressEventKind, Vec<ProgressCallback>>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer for one event name.
    pub fn subscribe<F>(&self, kind: ProgressEventKind, callback: F)
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(callback));
    }

    fn emit(&self, events: Vec<ProgressEvent>) {
        if events.is_empty() {
            return;
        }
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for event in &events {
            if let Some(list) = callbacks.get(&event.kind) {
                for callback in list {
                    callback(event);
                }
            }
        }
    }

    /// Set the number of courses in this run and start the application node.
    pub fn set_total_courses(&self, total: u64) {
        let events = {
            let mut inner = self.lock();
            inner.application.total = total;
            inner.application.transition(ProgressStatus::Active);
            vec![inner.application_event(None)]
        };
        self.emit(events);
    }

    /// Begin a course.
    pub fn start_course(&self, course_id: &str, name: &str) {
        let events = {
            let mut inner = self.lock();
            let state = ProgressState::started(ProgressLevel::Course, name, 0);
            inner.courses.insert(course_id.to_string(), state);
            inner.current_course = Some(course_id.to_string());
            inner.current_content = None;
            inner.course_event(course_id).into_iter().collect()
        };
        self.emit(events);
    }

    pub fn set_total_content_types(&self, course_id: &str, total: u64) {
        let events = {
            let mut inner = self.lock();
            if let Some(state) = inner.courses.get_mut(course_id) {
                state.total = total;
            }
            inner.course_event(course_id).into_iter().collect()
        };
        self.emit(events);
    }

    /// Begin a content type within a course.
    pub fn start_content_type(&self, course_id: &str, content_type: &str, total_items: u64) {
        let events = {
            let mut inner = self.lock();
            let key = (course_id.to_string(), content_type.to_string());
            let state = ProgressState::started(ProgressLevel::ContentType, content_type, total_items);
            inner.content_types.insert(key.clone(), state);
            inner.current_content = Some(key.clone());
            inner.item = None;
            inner.content_event(&key).into_iter().collect()
        };
        self.emit(events);
    }

    /// Set the item total once the listing is known.
    ///
    /// `current` is left alone and the total never drops below it.
    pub fn set_content_total(&self, course_id: &str, content_type: &str, total_items: u64) {
        let events = {
            let mut inner = self.lock();
            let key = (course_id.to_string(), content_type.to_string());
            if let Some(state) = inner.content_types.get_mut(&key) {
                state.total = total_items.max(state.current);
            }
            inner.content_event(&key).into_iter().collect()
        };
        self.emit(events);
    }

    /// Record that `current` items of a content type have been handled.
    ///
    /// Never moves the counter backwards, so the percentage is non-decreasing.
    pub fn update_item_progress(
        &self,
        course_id: &str,
        content_type: &str,
        current: u64,
        item_name: Option<&str>,
    ) {
        let events = {
            let mut inner = self.lock();
            let key = (course_id.to_string(), content_type.to_string());
            let mut events = Vec::new();

            if let Some(name) = item_name {
                if let Some(mut previous) = inner.item.take() {
                    previous.transition(ProgressStatus::Completed);
                }
                let item = ProgressState::started(ProgressLevel::Item, name, 1);
                events.push(ProgressEvent {
                    kind: ProgressEventKind::Item,
                    key: format!("{}:{}", key.0, key.1),
                    state: item.clone(),
                    message: None,
                });
                inner.item = Some(item);
            }

            if let Some(state) = inner.content_types.get_mut(&key) {
                state.advance_to(current);
            }
            events.extend(inner.content_event(&key));
            events
        };
        self.emit(events);
    }

    /// Count the outcome of one item against its content type.
    pub fn record_item_outcome(&self, course_id: &str, content_type: &str, outcome: ItemOutcome) {
        let mut inner = self.lock();
        let key = (course_id.to_string(), content_type.to_string());
        if let Some(state) = inner.content_types.get_mut(&key) {
            match outcome {
                ItemOutcome::Success => state.success_count += 1,
                ItemOutcome::Skipped => state.skip_count += 1,
                ItemOutcome::Failed => state.error_count += 1,
            }
        }
        if let Some(item) = inner.item.as_mut() {
            let next = if outcome == ItemOutcome::Failed {
                ProgressStatus::Error
            } else {
                ProgressStatus::Completed
            };
            item.increment();
            item.transition(next);
        }
    }

    /// Finish a content type and advance its course by one.
    pub fn complete_content_type(&self, course_id: &str, content_type: &str) {
        let events = {
            let mut inner = self.lock();
            let key = (course_id.to_string(), content_type.to_string());
            if let Some(state) = inner.content_types.get_mut(&key) {
                if state.status == ProgressStatus::Active {
                    state.current = state.current.max(state.total);
                }
                state.transition(ProgressStatus::Completed);
            }
            if let Some(course) = inner.courses.get_mut(course_id) {
                course.increment();
            }
            if inner.current_content.as_ref() == Some(&key) {
                inner.current_content = None;
            }
            inner.item = None;

            let mut events: Vec<_> = inner.content_event(&key).into_iter().collect();
            events.extend(inner.course_event(course_id));
            events
        };
        self.emit(events);
    }

    /// Finish a course and advance the application by one.
    pub fn complete_course(&self, course_id: &str) {
        let events = {
            let mut inner = self.lock();
            if let Some(course) = inner.courses.get_mut(course_id) {
                course.transition(ProgressStatus::Completed);
            }
            inner.application.increment();
            if inner.application.total > 0 && inner.application.current >= inner.application.total
            {
                inner.application.transition(ProgressStatus::Completed);
            }
            if inner.current_course.as_deref() == Some(course_id) {
                inner.current_course = None;
            }

            let mut events: Vec<_> = inner.course_event(course_id).into_iter().collect();
            events.push(inner.application_event(None));
            events
        };
        self.emit(events);
    }

    /// Mark the current node at `level` as failed.
    ///
    /// Item and download errors count against the enclosing content type
    /// without failing it.
    pub fn report_error(&self, level: ProgressLevel, message: &str) {
        let events = {
            let mut inner = self.lock();
            let current_course = inner.current_course.clone();
            let current_content = inner.current_content.clone();

            let snapshot = match level {
                ProgressLevel::Application => {
                    inner.application.error_count += 1;
                    inner.application.transition(ProgressStatus::Error);
                    Some((String::new(), inner.application.clone()))
                }
                ProgressLevel::Course => current_course.and_then(|id| {
                    inner.courses.get_mut(&id).map(|state| {
                        state.error_count += 1;
                        state.transition(ProgressStatus::Error);
                        (id.clone(), state.clone())
                    })
                }),
                ProgressLevel::ContentType => current_content.and_then(|key| {
                    inner.content_types.get_mut(&key).map(|state| {
                        state.error_count += 1;
                        state.transition(ProgressStatus::Error);
                        (format!("{}:{}", key.0, key.1), state.clone())
                    })
                }),
                ProgressLevel::Item | ProgressLevel::Download => {
                    let node = if level == ProgressLevel::Item {
                        inner.item.as_mut()
                    } else {
                        inner.download.as_mut()
                    };
                    let node_snapshot = node.map(|state| {
                        state.error_count += 1;
                        state.transition(ProgressStatus::Error);
                        state.clone()
                    });
                    current_content.map(|key| {
                        let key_str = format!("{}:{}", key.0, key.1);
                        let parent = inner.content_types.get(&key).cloned();
                        let state = node_snapshot
                            .or(parent)
                            .unwrap_or_else(|| ProgressState::new(level, message));
                        (key_str, state)
                    })
                }
            };

            snapshot
                .map(|(key, state)| ProgressEvent {
                    kind: ProgressEventKind::Error,
                    key,
                    state,
                    message: Some(message.to_string()),
                })
                .into_iter()
                .collect::<Vec<_>>()
        };
        self.emit(events);
    }

    /// Attach a warning to the deepest active node.
    pub fn report_warning(&self, message: &str) {
        let events = {
            let mut inner = self.lock();
            inner.warnings += 1;

            let content_key = inner.current_content.clone();
            let course_key = inner.current_course.clone();

            let (key, state) = if let Some(state) = content_key
                .as_ref()
                .and_then(|key| inner.content_types.get_mut(key))
            {
                state.warnings.push(message.to_string());
                let key = content_key
                    .as_ref()
                    .map(|k| format!("{}:{}", k.0, k.1))
                    .unwrap_or_default();
                (key, state.clone())
            } else if let Some(state) = course_key
                .as_ref()
                .and_then(|key| inner.courses.get_mut(key))
            {
                state.warnings.push(message.to_string());
                (course_key.clone().unwrap_or_default(), state.clone())
            } else {
                inner.application.warnings.push(message.to_string());
                (String::new(), inner.application.clone())
            };

            vec![ProgressEvent {
                kind: ProgressEventKind::Warning,
                key,
                state,
                message: Some(message.to_string()),
            }]
        };
        self.emit(events);
    }

    /// Begin a file transfer.
    pub fn start_download(&self, name: &str, total_bytes: Option<u64>) {
        let events = {
            let mut inner = self.lock();
            let mut state = ProgressState::started(ProgressLevel::Download, name, 0);
            state.total_bytes = total_bytes.unwrap_or(0);
            let event = ProgressEvent {
                kind: ProgressEventKind::Download,
                key: name.to_string(),
                state: state.clone(),
                message: None,
            };
            inner.download = Some(state);
            vec![event]
        };
        self.emit(events);
    }

    /// Add transferred bytes to the download node and every ancestor.
    pub fn update_download_progress(&self, bytes: u64) {
        let events = {
            let mut inner = self.lock();
            inner.application.bytes_downloaded += bytes;

            if let Some(id) = inner.current_course.clone() {
                if let Some(course) = inner.courses.get_mut(&id) {
                    course.bytes_downloaded += bytes;
                }
            }
            if let Some(key) = inner.current_content.clone() {
                if let Some(state) = inner.content_types.get_mut(&key) {
                    state.bytes_downloaded += bytes;
                }
            }

            match inner.download.as_mut() {
                Some(download) => {
                    download.bytes_downloaded += bytes;
                    vec![ProgressEvent {
                        kind: ProgressEventKind::Download,
                        key: download.name.clone(),
                        state: download.clone(),
                        message: None,
                    }]
                }
                None => Vec::new(),
            }
        };
        self.emit(events);
    }

    /// Finish the current file transfer.
    pub fn finish_download(&self, success: bool) {
        let events = {
            let mut inner = self.lock();
            let Some(mut download) = inner.download.take() else {
                return;
            };
            if success {
                inner.files_downloaded += 1;
                download.transition(ProgressStatus::Completed);
            } else {
                download.transition(ProgressStatus::Error);
            }
            vec![ProgressEvent {
                kind: ProgressEventKind::Download,
                key: download.name.clone(),
                state: download,
                message: None,
            }]
        };
        self.emit(events);
    }

    pub fn application_state(&self) -> ProgressState {
        self.lock().application.clone()
    }

    pub fn course_state(&self, course_id: &str) -> Option<ProgressState> {
        self.lock().courses.get(course_id).cloned()
    }

    pub fn content_type_state(&self, course_id: &str, content_type: &str) -> Option<ProgressState> {
        self.lock()
            .content_types
            .get(&(course_id.to_string(), content_type.to_string()))
            .cloned()
    }

    pub fn overall_statistics(&self) -> OverallStatistics {
        let inner = self.lock();
        let (succeeded, skipped, failed) = inner.content_types.values().fold(
            (0, 0, 0),
            |(s, k, f), state| {
                (
                    s + state.success_count,
                    k + state.skip_count,
                    f + state.error_count,
                )
            },
        );
        let errors = inner.application.error_count
            + inner.courses.values().map(|c| c.error_count).sum::<u64>()
            + failed;

        OverallStatistics {
            total_courses: inner.application.total,
            completed_courses: inner.application.current,
            percentage: inner.application.percentage(),
            items_succeeded: succeeded,
            items_skipped: skipped,
            items_failed: failed,
            files_downloaded: inner.files_downloaded,
            bytes_downloaded: inner.application.bytes_downloaded,
            errors,
            warnings: inner.warnings,
            elapsed_seconds: inner.application.elapsed().as_secs_f64(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().application.elapsed()
    }

    /// Drop all nodes. Subscriptions are kept.
    pub fn reset(&self) {
        *self.lock() = Inner::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_percentage_monotone_within_content_type() {
        let tracker = ProgressTracker::new();
        tracker.set_total_courses(1);
        tracker.start_course("C1", "Course 1");
        tracker.start_content_type("C1", "files", 0);
        tracker.set_content_total("C1", "files", 5);

        let mut last = 0.0;
        for current in [1, 2, 2, 1, 4, 5, 7] {
            tracker.update_item_progress("C1", "files", current, None);
            let pct = tracker.content_type_state("C1", "files").unwrap().percentage();
            assert!(pct >= last, "{} dropped below {}", pct, last);
            last = pct;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_late_total_never_moves_current_back() {
        let tracker = ProgressTracker::new();
        tracker.start_course("C1", "Course 1");
        tracker.start_content_type("C1", "files", 4);
        tracker.update_item_progress("C1", "files", 3, None);

        tracker.set_content_total("C1", "files", 2);
        let state = tracker.content_type_state("C1", "files").unwrap();
        assert_eq!(state.current, 3);
        assert_eq!(state.total, 3);
        assert_eq!(state.percentage(), 100.0);

        tracker.set_content_total("C1", "files", 6);
        let state = tracker.content_type_state("C1", "files").unwrap();
        assert_eq!(state.current, 3);
        assert_eq!(state.total, 6);
    }

    #[test]
    fn test_completion_propagates_one_level() {
        let tracker = ProgressTracker::new();
        tracker.set_total_courses(2);
        tracker.start_course("C1", "Course 1");
        tracker.set_total_content_types("C1", 2);

        tracker.start_content_type("C1", "files", 3);
        tracker.complete_content_type("C1", "files");

        let course = tracker.course_state("C1").unwrap();
        assert_eq!(course.current, 1);
        assert_eq!(tracker.application_state().current, 0);

        tracker.start_content_type("C1", "modules", 0);
        tracker.complete_content_type("C1", "modules");
        tracker.complete_course("C1");

        let course = tracker.course_state("C1").unwrap();
        assert_eq!(course.current, 2);
        assert_eq!(course.status, ProgressStatus::Completed);

        let app = tracker.application_state();
        assert_eq!(app.current, 1);
        assert_eq!(app.status, ProgressStatus::Active);

        tracker.start_course("C2", "Course 2");
        tracker.complete_course("C2");
        assert_eq!(tracker.application_state().status, ProgressStatus::Completed);
    }

    #[test]
    fn test_failed_content_type_stays_error_but_counts_for_course() {
        let tracker = ProgressTracker::new();
        tracker.set_total_courses(1);
        tracker.start_course("C1", "Course 1");
        tracker.start_content_type("C1", "assignments", 0);
        tracker.report_error(ProgressLevel::ContentType, "listing failed");
        tracker.complete_content_type("C1", "assignments");

        let state = tracker.content_type_state("C1", "assignments").unwrap();
        assert_eq!(state.status, ProgressStatus::Error);
        assert_eq!(state.error_count, 1);
        assert_eq!(tracker.course_state("C1").unwrap().current, 1);
    }

    #[test]
    fn test_item_errors_count_against_content_type() {
        let tracker = ProgressTracker::new();
        tracker.start_course("C1", "Course 1");
        tracker.start_content_type("C1", "files", 2);
        tracker.update_item_progress("C1", "files", 0, Some("a.pdf"));
        tracker.record_item_outcome("C1", "files", ItemOutcome::Failed);
        tracker.update_item_progress("C1", "files", 1, Some("b.pdf"));
        tracker.record_item_outcome("C1", "files", ItemOutcome::Success);

        let state = tracker.content_type_state("C1", "files").unwrap();
        assert_eq!(state.error_count, 1);
        assert_eq!(state.success_count, 1);
        assert_eq!(state.status, ProgressStatus::Active);

        let stats = tracker.overall_statistics();
        assert_eq!(stats.items_failed, 1);
        assert_eq!(stats.items_succeeded, 1);
    }

    #[test]
    fn test_callbacks_per_event_name() {
        let tracker = Arc::new(ProgressTracker::new());
        let courses = Arc::new(AtomicUsize::new(0));
        let warnings = Arc::new(AtomicUsize::new(0));

        let c = courses.clone();
        tracker.subscribe(ProgressEventKind::Course, move |event| {
            assert_eq!(event.kind, ProgressEventKind::Course);
            c.fetch_add(1, Ordering::SeqCst);
        });

        let w = warnings.clone();
        let observer = tracker.clone();
        tracker.subscribe(ProgressEventKind::Warning, move |event| {
            // Re-entrant read must not deadlock.
            let _ = observer.application_state();
            assert_eq!(event.message.as_deref(), Some("zero files"));
            w.fetch_add(1, Ordering::SeqCst);
        });

        tracker.start_course("C1", "Course 1");
        tracker.report_warning("zero files");
        tracker.complete_course("C1");

        assert_eq!(courses.load(Ordering::SeqCst), 2);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
        assert_eq!(
            tracker.course_state("C1").unwrap().warnings,
            vec!["zero files".to_string()]
        );
    }

    #[test]
    fn test_download_bytes_roll_up() {
        let tracker = ProgressTracker::new();
        tracker.start_course("C1", "Course 1");
        tracker.start_content_type("C1", "files", 1);
        tracker.start_download("a.pdf", Some(10));
        tracker.update_download_progress(4);
        tracker.update_download_progress(6);
        tracker.finish_download(true);

        assert_eq!(tracker.application_state().bytes_downloaded, 10);
        assert_eq!(tracker.course_state("C1").unwrap().bytes_downloaded, 10);
        assert_eq!(
            tracker.content_type_state("C1", "files").unwrap().bytes_downloaded,
            10
        );
        assert_eq!(tracker.overall_statistics().files_downloaded, 1);
    }
}
