//! HTTP fetcher with retries, pagination and streamed file downloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{Error, Result};
use crate::fetch::retry::{with_retry, RetryPolicy, RetryStats};
use crate::progress::ProgressTracker;

/// Page size requested from paginated endpoints.
pub const PER_PAGE: u32 = 100;

/// Upper bound on pages followed for one listing.
const MAX_PAGES: usize = 500;

/// Wraps a `reqwest::Client` so every GET goes through the retry policy.
pub struct RetryFetcher {
    client: Client,
    policy: RetryPolicy,
    stats: RetryStats,
    tracker: Option<Arc<ProgressTracker>>,
}

impl RetryFetcher {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            stats: RetryStats::default(),
            tracker: None,
        }
    }

    /// Report file transfer bytes to a progress tracker.
    pub fn with_tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &RetryStats {
        &self.stats
    }

    /// One GET attempt with status classification.
    async fn send_get(&self, url: &str) -> Result<Response> {
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        tracing::debug!("Response status: {}", status);

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(60);
            return Err(Error::RateLimited(retry_after));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Access denied response: {}", truncate(&body, 300));
            return Err(Error::Forbidden(format!(
                "HTTP {} for {}: {}",
                status.as_u16(),
                url,
                if body.is_empty() {
                    "not authorized"
                } else {
                    truncate(&body, 300)
                }
            )));
        }

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.to_string()));
        }

        Err(Error::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<(T, Option<String>)> {
        let response = self.send_get(url).await?;
        let next = next_page_url(response.headers());
        let text = response.text().await?;

        let value = serde_json::from_str(&text).map_err(|e| {
            Error::Api(format!(
                "Failed to parse response from {}: {} - Response: {}",
                url,
                e,
                truncate(&text, 200)
            ))
        })?;

        Ok((value, next))
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let (value, _) = with_retry(&self.policy, &self.stats, || self.get_json_once(url)).await?;
        Ok(value)
    }

    /// GET every page of a listing by following `Link: rel="next"`.
    pub async fn get_paginated<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let mut next = Some(with_per_page(url)?);
        let mut items = Vec::new();
        let mut pages = 0;

        while let Some(page_url) = next.take() {
            let (page, next_url): (Vec<T>, Option<String>) =
                with_retry(&self.policy, &self.stats, || self.get_json_once(&page_url)).await?;

            items.extend(page);
            pages += 1;

            if pages >= MAX_PAGES {
                tracing::warn!(url, pages, "Stopping pagination at page limit");
                break;
            }
            next = next_url;
        }

        Ok(items)
    }

    /// GET a page body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        with_retry(&self.policy, &self.stats, || async {
            let response = self.send_get(url).await?;
            Ok(response.text().await?)
        })
        .await
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// Data goes to `<dest>.part` first and is renamed on success. A failed
    /// attempt removes the partial file.
    pub async fn download_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let policy = self.policy.for_transfer();
        with_retry(&policy, &self.stats, || self.download_once(url, dest)).await
    }

    async fn download_once(&self, url: &str, dest: &Path) -> Result<u64> {
        let part = part_path(dest);
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(tracker) = &self.tracker {
            tracker.start_download(&name, None);
        }

        let result = self.stream_to(url, &part).await;

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&part, dest).await?;
                if let Some(tracker) = &self.tracker {
                    tracker.finish_download(true);
                }
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                if let Some(tracker) = &self.tracker {
                    tracker.finish_download(false);
                }
                Err(e)
            }
        }
    }

    async fn stream_to(&self, url: &str, part: &Path) -> Result<u64> {
        let response = tokio::time::timeout(self.policy.timeout, self.send_get(url))
            .await
            .map_err(|_| Error::Timeout(self.policy.timeout))??;

        let mut file = File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        loop {
            let next = tokio::time::timeout(self.policy.timeout, stream.next())
                .await
                .map_err(|_| Error::Timeout(self.policy.timeout))?;

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(tracker) = &self.tracker {
                tracker.update_download_progress(chunk.len() as u64);
            }
        }

        file.flush().await?;
        Ok(downloaded)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Add `per_page` to a listing URL unless already present.
pub fn with_per_page(url: &str) -> Result<String> {
    let mut parsed = Url::parse(url)?;
    if !parsed.query_pairs().any(|(k, _)| k == "per_page") {
        parsed
            .query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string());
    }
    Ok(parsed.to_string())
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_page_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let mut parts = link.split(';');
            let target = parts.next()?.trim();
            let is_next = parts.any(|p| {
                let p = p.trim();
                p == "rel=\"next\"" || p == "rel=next"
            });
            if is_next {
                Some(
                    target
                        .trim_start_matches('<')
                        .trim_end_matches('>')
                        .to_string(),
                )
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde::Deserialize;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Row {
        id: u32,
    }

    fn fetcher() -> RetryFetcher {
        RetryFetcher::new(
            Client::new(),
            RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                timeout: Duration::from_secs(5),
                transfer_timeout: Duration::from_secs(5),
                jitter: false,
            },
        )
    }

    #[test]
    fn test_next_page_url() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://x.edu/api/v1/courses?page=1>; rel=\"current\", \
                 <https://x.edu/api/v1/courses?page=2>; rel=\"next\", \
                 <https://x.edu/api/v1/courses?page=5>; rel=\"last\"",
            ),
        );
        assert_eq!(
            next_page_url(&headers).as_deref(),
            Some("https://x.edu/api/v1/courses?page=2")
        );
        assert_eq!(next_page_url(&HeaderMap::new()), None);
    }

    #[test]
    fn test_with_per_page() {
        assert_eq!(
            with_per_page("https://x.edu/api/v1/courses?include[]=term").unwrap(),
            "https://x.edu/api/v1/courses?include[]=term&per_page=100"
        );
        assert_eq!(
            with_per_page("https://x.edu/a?per_page=10").unwrap(),
            "https://x.edu/a?per_page=10"
        );
    }

    #[tokio::test]
    async fn test_get_paginated_follows_link_header() {
        let server = MockServer::start().await;
        let page2 = format!("{}/rows?page=2&per_page=100", server.uri());

        Mock::given(method("GET"))
            .and(path("/rows"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 3}])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rows"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", format!("<{}>; rel=\"next\"", page2).as_str())
                    .set_body_json(serde_json::json!([{"id": 1}, {"id": 2}])),
            )
            .mount(&server)
            .await;

        let rows: Vec<Row> = fetcher()
            .get_paginated(&format!("{}/rows", server.uri()))
            .await
            .unwrap();
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/self"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid access token"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let result: Result<serde_json::Value> = fetcher
            .get_json(&format!("{}/api/v1/users/self", server.uri()))
            .await;

        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(!err.is_fatal());
        assert_eq!(fetcher.stats().retries(), 0);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 9})))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let row: Row = fetcher
            .get_json(&format!("{}/flaky", server.uri()))
            .await
            .unwrap();
        assert_eq!(row.id, 9);
        assert_eq!(fetcher.stats().retries(), 2);
    }

    #[tokio::test]
    async fn test_download_file_streams_and_renames() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/1/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello canvas".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("notes.txt");
        let tracker = Arc::new(ProgressTracker::new());
        let fetcher = fetcher().with_tracker(tracker.clone());

        let bytes = fetcher
            .download_file(&format!("{}/files/1/download", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 12);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello canvas");
        assert!(!part_path(&dest).exists());
        assert_eq!(tracker.overall_statistics().files_downloaded, 1);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing.pdf");
        let result = fetcher()
            .download_file(&format!("{}/missing", server.uri()), &dest)
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }
}
