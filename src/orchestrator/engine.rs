//! The top-level synchronization driver.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::api::{CanvasApi, SessionCredentials, User};
use crate::config::{validate_course_ids, Config, ContentType};
use crate::course::{sort_courses, CourseInfo};
use crate::download::{DownloadSettings, DownloaderContext, DownloaderRegistry};
use crate::error::{Error, Result};
use crate::fetch::RetryPolicy;
use crate::fs::course_root;
use crate::orchestrator::results::{CourseResult, DownloadResults};
use crate::orchestrator::summary::RunSummary;
use crate::progress::{ProgressLevel, ProgressTracker};
use crate::scrape::{CanvasMarkupExtractor, LinkExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    SessionInitializing,
    Ready,
    Downloading,
    Stopping,
    Completed,
    PartiallyFailed,
}

/// Drives a run: session, course listing, then courses one at a time and
/// content types one at a time within each course.
pub struct Orchestrator<'a> {
    config: Config,
    registry: &'a DownloaderRegistry,
    tracker: Arc<ProgressTracker>,
    extractor: Option<Arc<dyn LinkExtractor>>,
    api: Option<Arc<CanvasApi>>,
    user: Option<User>,
    state: Mutex<OrchestratorState>,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: Config, registry: &'a DownloaderRegistry, tracker: Arc<ProgressTracker>) -> Self {
        Self {
            config,
            registry,
            tracker,
            extractor: Some(Arc::new(CanvasMarkupExtractor::new())),
            api: None,
            user: None,
            state: Mutex::new(OrchestratorState::Idle),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the page link extractor used by the hybrid module downloader.
    pub fn with_extractor(mut self, extractor: Option<Arc<dyn LinkExtractor>>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(OrchestratorState::Idle)
    }

    fn set_state(&self, next: OrchestratorState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::debug!(from = ?*state, to = ?next, "Orchestrator state");
            *state = next;
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Token that stops the run between courses and content types.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a cooperative stop. In-flight requests finish first.
    pub fn stop(&self) {
        tracing::info!("Stop requested");
        self.cancel.cancel();
        if self.state() == OrchestratorState::Downloading {
            self.set_state(OrchestratorState::Stopping);
        }
    }

    fn api(&self) -> Result<&Arc<CanvasApi>> {
        self.api.as_ref().ok_or(Error::SessionNotInitialized)
    }

    /// Build the API clients and verify the token.
    pub async fn initialize_session(&mut self) -> Result<User> {
        self.set_state(OrchestratorState::SessionInitializing);

        match self.connect().await {
            Ok((api, user)) => {
                tracing::info!(user = %user.name, "Canvas session initialized");
                self.api = Some(Arc::new(api));
                self.user = Some(user.clone());
                self.set_state(OrchestratorState::Ready);
                Ok(user)
            }
            Err(e) => {
                self.set_state(OrchestratorState::Idle);
                Err(e)
            }
        }
    }

    fn build_api(&self) -> Result<CanvasApi> {
        let credentials = SessionCredentials {
            api_base_url: self.config.account.api_base_url.clone(),
            api_token: self.config.account.api_token.clone(),
        };
        let policy = RetryPolicy::from_config(&self.config.download);
        Ok(CanvasApi::new(&credentials, policy, &self.config.download.user_agent)?
            .with_tracker(self.tracker.clone()))
    }

    async fn connect(&self) -> Result<(CanvasApi, User)> {
        let api = match &self.config.account.cookies_path {
            Some(path) => match self.build_api()?.with_cookies(path) {
                Ok(api) => api,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Cookie session unavailable, page scraping disabled");
                    self.tracker
                        .report_warning(&format!("Cookie session unavailable: {}", e));
                    self.build_api()?
                }
            },
            None => self.build_api()?,
        };

        let user = api.current_user().await?;
        Ok((api, user))
    }

    /// Active courses, parsed and sorted by year, semester and subject.
    pub async fn available_courses(&self) -> Result<Vec<CourseInfo>> {
        let courses = self.api()?.list_courses().await?;
        let mut infos: Vec<CourseInfo> = courses.iter().map(CourseInfo::from_course).collect();
        sort_courses(&mut infos);
        Ok(infos)
    }

    /// Content types to run, in processing order.
    pub fn enabled_content_types(&self) -> Vec<ContentType> {
        ContentType::ALL
            .into_iter()
            .filter(|ct| self.config.content_types.is_enabled(*ct) && self.registry.contains(*ct))
            .collect()
    }

    fn downloader_context(&self, api: &Arc<CanvasApi>) -> DownloaderContext {
        DownloaderContext {
            api: api.clone(),
            tracker: self.tracker.clone(),
            settings: DownloadSettings::from_config(&self.config),
            extractor: self.extractor.clone(),
        }
    }

    /// Download every enabled content type of each course, in order.
    ///
    /// Course failures are recorded and the run continues. Only fatal
    /// session errors are returned, after the summary has been written.
    pub async fn download_courses(&self, course_ids: &[String]) -> Result<DownloadResults> {
        let api = self.api()?.clone();
        let state = self.state();
        if matches!(
            state,
            OrchestratorState::Downloading | OrchestratorState::Stopping
        ) {
            return Err(Error::Api(format!("Cannot start a download while {:?}", state)));
        }
        validate_course_ids(course_ids)?;

        self.set_state(OrchestratorState::Downloading);
        let ctx = self.downloader_context(&api);
        let content_types = self.enabled_content_types();
        let mut results = DownloadResults::new(course_ids.len());
        self.tracker.set_total_courses(course_ids.len() as u64);

        tracing::info!(
            courses = course_ids.len(),
            content_types = ?content_types,
            "Starting download"
        );

        let mut fatal = None;
        for course_id in course_ids {
            if self.cancel.is_cancelled() {
                tracing::info!("Download stopped by user request");
                self.set_state(OrchestratorState::Stopping);
                results.cancelled = true;
                break;
            }

            match self.download_course(course_id, &ctx, &content_types).await {
                Ok((result, course_dir)) => results.record_course(result, course_dir),
                Err(e) => {
                    let e = self.recheck_session(&ctx.api, e).await;
                    tracing::error!(course_id = %course_id, error = %e, "Course failed");
                    self.tracker.report_error(
                        ProgressLevel::Course,
                        &format!("Course {}: {}", course_id, e),
                    );
                    results.record_course_failure(course_id, &e);
                    if e.is_fatal() {
                        fatal = Some(e);
                        break;
                    }
                }
            }
        }
        if self.cancel.is_cancelled() {
            results.cancelled = true;
        }

        results.finish();
        self.save_summary(&mut results).await;

        self.set_state(if results.has_failures() {
            OrchestratorState::PartiallyFailed
        } else {
            OrchestratorState::Completed
        });

        tracing::info!(
            successful = results.successful_courses,
            failed = results.failed_courses,
            duration = %results.formatted_duration(),
            "Download finished"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    async fn download_course(
        &self,
        course_id: &str,
        ctx: &DownloaderContext,
        content_types: &[ContentType],
    ) -> Result<(CourseResult, PathBuf)> {
        let course = CourseInfo::from_course(&ctx.api.get_course(course_id).await?);
        tracing::info!(
            course_id,
            course = %course.name,
            folder = %course.folder_path.display(),
            "Starting course"
        );

        self.tracker.start_course(course_id, &course.name);
        self.tracker
            .set_total_content_types(course_id, content_types.len() as u64);

        let mut result = CourseResult::new(&course);
        for &content_type in content_types {
            if self.cancel.is_cancelled() {
                tracing::info!(course_id, "Stopping before {}", content_type);
                self.set_state(OrchestratorState::Stopping);
                break;
            }
            let Some(downloader) = self.registry.create(content_type, ctx) else {
                continue;
            };

            self.tracker
                .start_content_type(course_id, content_type.as_str(), 0);
            match downloader.download_course_content(&course).await {
                Ok(stats) => result.record_content(content_type, stats),
                Err(e) => {
                    let e = self.recheck_session(&ctx.api, e).await;
                    if e.is_fatal() {
                        return Err(e);
                    }
                    tracing::warn!(course_id, content_type = %content_type, error = %e, "Content type failed");
                    self.tracker.report_error(
                        ProgressLevel::ContentType,
                        &format!("{} in course {}: {}", content_type, course_id, e),
                    );
                    result.record_content_error(content_type, &e);
                }
            }
            self.tracker
                .complete_content_type(course_id, content_type.as_str());
        }

        result.finish();
        self.tracker.complete_course(course_id);
        Ok((result, course_root(&ctx.settings.root, &course)))
    }

    /// A 401/403 on one resource only aborts the run if the token itself
    /// is no longer accepted.
    async fn recheck_session(&self, api: &CanvasApi, error: Error) -> Error {
        if !matches!(error, Error::Forbidden(_)) {
            return error;
        }
        match api.current_user().await {
            Err(session_error) if session_error.is_fatal() => {
                tracing::error!(error = %session_error, "Session no longer valid");
                session_error
            }
            _ => error,
        }
    }

    async fn save_summary(&self, results: &mut DownloadResults) {
        let root = self.config.download_directory();
        let path = RunSummary::path_in(&root);
        results.metadata_files.push(path.clone());

        let summary = RunSummary::new(
            &self.config,
            self.user.as_ref().map(|u| u.name.clone()),
            results,
        );
        if let Err(e) = summary.save(&path).await {
            tracing::error!(path = %path.display(), error = %e, "Failed to save download summary");
            results.metadata_files.retain(|p| p != &path);
            results
                .warnings
                .push(format!("Failed to save download summary: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModulesConfig;
    use crate::progress::{ProgressEventKind, ProgressStatus};
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, root: &Path) -> Config {
        let mut config = Config::default();
        config.account.api_base_url = server.uri();
        config.account.api_token = "test-token-1234".into();
        config.download.directory = Some(root.to_path_buf());
        config.download.max_retries = 1;
        config.download.retry_base_delay_ms = 1;
        config.download.retry_max_delay_ms = 2;
        for content_type in ContentType::ALL {
            config.content_types.set_enabled(content_type, false);
        }
        config
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v1/users/self"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1, "name": "Sam"})),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": "C1", "name": "Algebra (MAT101) - A - 2024 - 1"}),
            ))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_content_type_failure_is_isolated() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/discussion_topics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "title": "One"},
                {"id": 2, "title": "Two"},
                {"id": 3, "title": "Three"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/quizzes"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = config(&server, dir.path());
        config.content_types.set_enabled(ContentType::Announcements, true);
        config.content_types.set_enabled(ContentType::Quizzes, true);

        let registry = DownloaderRegistry::with_defaults(&ModulesConfig::default());
        let mut orchestrator =
            Orchestrator::new(config, &registry, Arc::new(ProgressTracker::new()));
        orchestrator.initialize_session().await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Ready);

        let results = orchestrator
            .download_courses(&["C1".to_string()])
            .await
            .unwrap();

        assert_eq!(results.total_courses, 1);
        assert_eq!(results.processed_courses, 1);
        assert_eq!(
            results.successful_courses + results.failed_courses,
            results.processed_courses
        );

        let course = &results.course_results["C1"];
        assert_eq!(course.errors.len(), 1);
        assert_eq!(course.errors[0].content_type, Some(ContentType::Quizzes));
        assert_eq!(
            course.content_results[&ContentType::Announcements].downloaded_items,
            3
        );
        assert!(!course.content_results.contains_key(&ContentType::Quizzes));
        assert_eq!(orchestrator.state(), OrchestratorState::Completed);
        assert!(RunSummary::path_in(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_failed_course_does_not_stop_run() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/quizzes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = config(&server, dir.path());
        config.content_types.set_enabled(ContentType::Quizzes, true);

        let registry = DownloaderRegistry::with_defaults(&ModulesConfig::default());
        let mut orchestrator =
            Orchestrator::new(config, &registry, Arc::new(ProgressTracker::new()));
        orchestrator.initialize_session().await.unwrap();

        let ids = vec!["C2".to_string(), "C1".to_string()];
        let results = orchestrator.download_courses(&ids).await.unwrap();

        assert_eq!(results.total_courses, 2);
        assert_eq!(results.processed_courses, 2);
        assert_eq!(results.failed_courses, 1);
        assert_eq!(results.successful_courses, 1);
        assert_eq!(results.errors[0].course_id.as_deref(), Some("C2"));
        assert_eq!(orchestrator.state(), OrchestratorState::PartiallyFailed);

        let summary = RunSummary::load(&RunSummary::path_in(dir.path())).await.unwrap();
        assert_eq!(summary.results.failed_courses, 1);
        assert_eq!(summary.session_info.user_name.as_deref(), Some("Sam"));
    }

    #[tokio::test]
    async fn test_stop_before_first_course() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        let dir = TempDir::new().unwrap();
        let registry = DownloaderRegistry::with_defaults(&ModulesConfig::default());
        let mut orchestrator = Orchestrator::new(
            config(&server, dir.path()),
            &registry,
            Arc::new(ProgressTracker::new()),
        );
        orchestrator.initialize_session().await.unwrap();
        orchestrator.stop();

        let results = orchestrator
            .download_courses(&["C1".to_string()])
            .await
            .unwrap();
        assert!(results.cancelled);
        assert_eq!(results.total_courses, 1);
        assert_eq!(results.processed_courses, 0);
    }

    #[tokio::test]
    async fn test_auth_failure_leaves_orchestrator_idle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/self"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid access token"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let registry = DownloaderRegistry::new();
        let mut orchestrator = Orchestrator::new(
            config(&server, dir.path()),
            &registry,
            Arc::new(ProgressTracker::new()),
        );

        let err = orchestrator.initialize_session().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert!(matches!(
            orchestrator.download_courses(&["C1".to_string()]).await,
            Err(Error::SessionNotInitialized)
        ));
    }

    async fn mount_course(server: &MockServer, id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/courses/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": id, "name": format!("Physics (PHY{}) - A - 2024 - 2", id)}),
            ))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_unauthorized_listing_is_a_content_type_error() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        mount_course(&server, "C2").await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/quizzes"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"status":"unauthorized"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C2/quizzes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = config(&server, dir.path());
        config.content_types.set_enabled(ContentType::Quizzes, true);

        let registry = DownloaderRegistry::with_defaults(&ModulesConfig::default());
        let mut orchestrator =
            Orchestrator::new(config, &registry, Arc::new(ProgressTracker::new()));
        orchestrator.initialize_session().await.unwrap();

        let ids = vec!["C1".to_string(), "C2".to_string()];
        let results = orchestrator.download_courses(&ids).await.unwrap();

        assert_eq!(results.processed_courses, 2);
        assert_eq!(results.successful_courses, 2);
        let c1 = &results.course_results["C1"];
        assert_eq!(c1.errors.len(), 1);
        assert_eq!(c1.errors[0].content_type, Some(ContentType::Quizzes));
        assert_eq!(c1.errors[0].error_type, "forbidden");
        assert!(results.course_results["C2"].success);
        assert_eq!(orchestrator.state(), OrchestratorState::Completed);
    }

    #[tokio::test]
    async fn test_revoked_token_mid_run_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/self"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1, "name": "Sam"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/self"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid access token"))
            .mount(&server)
            .await;
        mount_course(&server, "C1").await;
        mount_course(&server, "C2").await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/quizzes"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid access token"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C2/quizzes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = config(&server, dir.path());
        config.content_types.set_enabled(ContentType::Quizzes, true);

        let registry = DownloaderRegistry::with_defaults(&ModulesConfig::default());
        let mut orchestrator =
            Orchestrator::new(config, &registry, Arc::new(ProgressTracker::new()));
        orchestrator.initialize_session().await.unwrap();

        let ids = vec!["C1".to_string(), "C2".to_string()];
        let err = orchestrator.download_courses(&ids).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));

        let summary = RunSummary::load(&RunSummary::path_in(dir.path())).await.unwrap();
        assert_eq!(summary.results.processed_courses, 1);
        assert_eq!(summary.results.failed_courses, 1);
    }

    fn cancel_after_announcements(tracker: &ProgressTracker, token: CancellationToken) {
        tracker.subscribe(ProgressEventKind::ContentType, move |event| {
            if event.state.name == "announcements"
                && event.state.status == ProgressStatus::Completed
            {
                token.cancel();
            }
        });
    }

    async fn mount_cancellable_course(server: &MockServer) {
        mount_session(server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/discussion_topics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/C1/quizzes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(0)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_cancel_between_content_types_enters_stopping() {
        let server = MockServer::start().await;
        mount_cancellable_course(&server).await;

        let dir = TempDir::new().unwrap();
        let mut config = config(&server, dir.path());
        config.content_types.set_enabled(ContentType::Announcements, true);
        config.content_types.set_enabled(ContentType::Quizzes, true);

        let registry = DownloaderRegistry::with_defaults(&ModulesConfig::default());
        let tracker = Arc::new(ProgressTracker::new());
        let mut orchestrator = Orchestrator::new(config, &registry, tracker.clone());
        orchestrator.initialize_session().await.unwrap();
        cancel_after_announcements(&tracker, orchestrator.cancellation_token());

        let ctx = orchestrator.downloader_context(orchestrator.api().unwrap());
        let (result, _) = orchestrator
            .download_course(
                "C1",
                &ctx,
                &[ContentType::Announcements, ContentType::Quizzes],
            )
            .await
            .unwrap();

        assert_eq!(orchestrator.state(), OrchestratorState::Stopping);
        assert!(result.content_results.contains_key(&ContentType::Announcements));
        assert!(!result.content_results.contains_key(&ContentType::Quizzes));
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_summary_once() {
        let server = MockServer::start().await;
        mount_cancellable_course(&server).await;

        let dir = TempDir::new().unwrap();
        let mut config = config(&server, dir.path());
        config.content_types.set_enabled(ContentType::Announcements, true);
        config.content_types.set_enabled(ContentType::Quizzes, true);

        let registry = DownloaderRegistry::with_defaults(&ModulesConfig::default());
        let tracker = Arc::new(ProgressTracker::new());
        let mut orchestrator = Orchestrator::new(config, &registry, tracker.clone());
        orchestrator.initialize_session().await.unwrap();
        cancel_after_announcements(&tracker, orchestrator.cancellation_token());

        let ids = vec!["C1".to_string(), "C2".to_string()];
        let results = orchestrator.download_courses(&ids).await.unwrap();

        assert!(results.cancelled);
        assert_eq!(results.total_courses, 2);
        assert_eq!(results.processed_courses, 1);
        assert_eq!(results.metadata_files, vec![RunSummary::path_in(dir.path())]);

        let summary = RunSummary::load(&RunSummary::path_in(dir.path())).await.unwrap();
        assert!(summary.session_info.cancelled);
        assert_eq!(summary.results.processed_courses, 1);
    }
}
