//! Canvas REST API client.

use std::path::Path;
use std::sync::Arc;

use reqwest::{header, Client};
use url::Url;

use crate::api::cookies::load_netscape_cookies;
use crate::api::types::*;
use crate::config::validate_base_url;
use crate::error::{Error, Result};
use crate::fetch::{RetryFetcher, RetryPolicy};
use crate::progress::ProgressTracker;

/// Resolved session credentials handed over by the session manager.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub api_base_url: String,
    pub api_token: String,
}

/// Canvas API client.
///
/// API calls carry the bearer token. When a cookie file is supplied a second
/// client fetches rendered pages with the browser session instead.
pub struct CanvasApi {
    base_url: Url,
    api: RetryFetcher,
    web: Option<RetryFetcher>,
    policy: RetryPolicy,
    user_agent: String,
    tracker: Option<Arc<ProgressTracker>>,
}

impl CanvasApi {
    /// Create a new API client.
    pub fn new(credentials: &SessionCredentials, policy: RetryPolicy, user_agent: &str) -> Result<Self> {
        let base_url = validate_base_url(&credentials.api_base_url)?;

        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", credentials.api_token))
            .map_err(|_| Error::Authentication("API token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            api: RetryFetcher::new(client, policy.clone()),
            web: None,
            policy,
            user_agent: user_agent.to_string(),
            tracker: None,
        })
    }

    /// Enable page fetches with the browser cookies in `cookie_path`.
    pub fn with_cookies(mut self, cookie_path: &Path) -> Result<Self> {
        let jar = load_netscape_cookies(cookie_path)?;
        let client = Client::builder()
            .user_agent(&self.user_agent)
            .cookie_provider(jar)
            .build()
            .map_err(|e| Error::Api(format!("Failed to create web client: {}", e)))?;

        let mut web = RetryFetcher::new(client, self.policy.clone());
        if let Some(tracker) = &self.tracker {
            web = web.with_tracker(tracker.clone());
        }
        self.web = Some(web);
        Ok(self)
    }

    /// Report transfer bytes of both clients to `tracker`.
    pub fn with_tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.api = self.api.with_tracker(tracker.clone());
        self.web = self.web.map(|web| web.with_tracker(tracker.clone()));
        self.tracker = Some(tracker);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether a cookie-authenticated page client is available.
    pub fn has_web_session(&self) -> bool {
        self.web.is_some()
    }

    pub fn fetcher(&self) -> &RetryFetcher {
        &self.api
    }

    fn root(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.root(), path.trim_start_matches('/'))
    }

    /// Rendered module page, used by the scrape phase.
    pub fn module_page_url(&self, course_id: &str, module_id: &str) -> String {
        format!("{}/courses/{}/modules/{}", self.root(), course_id, module_id)
    }

    /// Direct download URL for a file id.
    pub fn file_download_url(&self, course_id: &str, file_id: &str) -> String {
        format!(
            "{}/courses/{}/files/{}/download",
            self.root(),
            course_id,
            file_id
        )
    }

    /// Get the user owning the token (validates the session).
    ///
    /// A 401/403 here means the token itself is rejected.
    pub async fn current_user(&self) -> Result<User> {
        match self.api.get_json(&self.api_url("users/self")).await {
            Err(Error::Forbidden(message)) => Err(Error::Authentication(message)),
            other => other,
        }
    }

    /// List active courses of the current user.
    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        self.api
            .get_paginated(&self.api_url("courses?enrollment_state=active&include[]=term"))
            .await
    }

    pub async fn get_course(&self, course_id: &str) -> Result<Course> {
        self.api
            .get_json(&self.api_url(&format!("courses/{}?include[]=term", course_id)))
            .await
    }

    pub async fn list_announcements(&self, course_id: &str) -> Result<Vec<DiscussionTopic>> {
        self.api
            .get_paginated(&self.api_url(&format!(
                "courses/{}/discussion_topics?only_announcements=true",
                course_id
            )))
            .await
    }

    /// Discussion topics. Canvas includes announcements here only on request.
    pub async fn list_discussion_topics(&self, course_id: &str) -> Result<Vec<DiscussionTopic>> {
        self.api
            .get_paginated(&self.api_url(&format!("courses/{}/discussion_topics", course_id)))
            .await
    }

    pub async fn list_assignments(&self, course_id: &str) -> Result<Vec<Assignment>> {
        self.api
            .get_paginated(&self.api_url(&format!(
                "courses/{}/assignments?include[]=submission",
                course_id
            )))
            .await
    }

    pub async fn list_files(&self, course_id: &str) -> Result<Vec<FileObject>> {
        self.api
            .get_paginated(&self.api_url(&format!("courses/{}/files", course_id)))
            .await
    }

    pub async fn list_folders(&self, course_id: &str) -> Result<Vec<Folder>> {
        self.api
            .get_paginated(&self.api_url(&format!("courses/{}/folders", course_id)))
            .await
    }

    pub async fn get_file(&self, course_id: &str, file_id: &str) -> Result<FileObject> {
        self.api
            .get_json(&self.api_url(&format!("courses/{}/files/{}", course_id, file_id)))
            .await
    }

    /// Modules with their items inlined where Canvas allows it.
    pub async fn list_modules(&self, course_id: &str) -> Result<Vec<Module>> {
        self.api
            .get_paginated(&self.api_url(&format!(
                "courses/{}/modules?include[]=items&include[]=content_details",
                course_id
            )))
            .await
    }

    pub async fn list_module_items(&self, course_id: &str, module_id: &str) -> Result<Vec<ModuleItem>> {
        self.api
            .get_paginated(&self.api_url(&format!(
                "courses/{}/modules/{}/items?include[]=content_details",
                course_id, module_id
            )))
            .await
    }

    pub async fn list_quizzes(&self, course_id: &str) -> Result<Vec<Quiz>> {
        self.api
            .get_paginated(&self.api_url(&format!("courses/{}/quizzes", course_id)))
            .await
    }

    pub async fn list_enrollments(&self, course_id: &str) -> Result<Vec<Enrollment>> {
        self.api
            .get_paginated(&self.api_url(&format!(
                "courses/{}/enrollments?include[]=avatar_url\
                 &type[]=StudentEnrollment&type[]=TeacherEnrollment&type[]=TaEnrollment\
                 &type[]=ObserverEnrollment&type[]=DesignerEnrollment&state[]=active",
                course_id
            )))
            .await
    }

    /// Fetch a rendered page with the cookie session.
    pub async fn get_page(&self, url: &str) -> Result<String> {
        let web = self.web.as_ref().ok_or(Error::SessionNotInitialized)?;
        web.get_text(url).await
    }

    /// Download a file with the bearer token.
    pub async fn download_file(&self, url: &str, dest: &Path) -> Result<u64> {
        self.api.download_file(url, dest).await
    }

    /// Download a file discovered on a rendered page.
    ///
    /// Uses the cookie session when present, the bearer client otherwise.
    pub async fn download_web_file(&self, url: &str, dest: &Path) -> Result<u64> {
        match &self.web {
            Some(web) => web.download_file(url, dest).await,
            None => self.api.download_file(url, dest).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            timeout: Duration::from_secs(5),
            transfer_timeout: Duration::from_secs(5),
            jitter: false,
        }
    }

    fn api_for(server: &MockServer) -> CanvasApi {
        CanvasApi::new(
            &SessionCredentials {
                api_base_url: server.uri(),
                api_token: "test-token-1234".into(),
            },
            policy(),
            "canvas-sync-test",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_current_user_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/self"))
            .and(header("Authorization", "Bearer test-token-1234"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7, "name": "Ada"})),
            )
            .mount(&server)
            .await;

        let user = api_for(&server).current_user().await.unwrap();
        assert_eq!(user.id, "7");
        assert_eq!(user.name, "Ada");
    }

    #[tokio::test]
    async fn test_rejected_token_is_an_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/self"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid access token"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/42/quizzes"))
            .respond_with(ResponseTemplate::new(401).set_body_string("user not authorized"))
            .mount(&server)
            .await;

        let api = api_for(&server);
        let err = api.current_user().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(err.is_fatal());

        let err = api.list_quizzes("42").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_list_announcements_uses_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/courses/42/discussion_topics"))
            .and(query_param("only_announcements", "true"))
            .and(query_param("per_page", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "title": "Welcome"}
            ])))
            .mount(&server)
            .await;

        let topics = api_for(&server).list_announcements("42").await.unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].title, "Welcome");
    }

    #[tokio::test]
    async fn test_get_page_requires_cookie_session() {
        let server = MockServer::start().await;
        let api = api_for(&server);
        assert!(!api.has_web_session());

        let result = api.get_page(&api.module_page_url("1", "2")).await;
        assert!(matches!(result, Err(Error::SessionNotInitialized)));
    }

    #[tokio::test]
    async fn test_get_page_with_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/courses/1/modules/2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "127.0.0.1\tFALSE\t/\tFALSE\t0\tcanvas_session\tabc").unwrap();

        let api = api_for(&server).with_cookies(file.path()).unwrap();
        assert!(api.has_web_session());

        let html = api.get_page(&api.module_page_url("1", "2")).await.unwrap();
        assert_eq!(html, "<html>ok</html>");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = CanvasApi::new(
            &SessionCredentials {
                api_base_url: "ftp://school.edu".into(),
                api_token: "test-token-1234".into(),
            },
            policy(),
            "ua",
        );
        assert!(matches!(result, Err(Error::InvalidBaseUrl(_))));
    }
}
