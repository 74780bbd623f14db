//! Helpers shared by the downloader variants.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::download::contract::{DownloadInfo, DownloaderContext};
use crate::error::{Error, Result};
use crate::fs::{ensure_dir, is_existing_download, resolve_unique_path, sanitize_filename};

/// Write `value` as pretty JSON.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub async fn write_text(path: &Path, text: &str) -> Result<()> {
    tokio::fs::write(path, text).await?;
    Ok(())
}

/// Parse an optional Canvas ISO 8601 timestamp.
pub fn parse_timestamp(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| Error::Api(format!("Invalid {} '{}': {}", field, raw, e))),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// A standalone HTML page: title, a field table, then the Canvas body as-is.
pub fn html_document(title: &str, fields: &[(&str, String)], body: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n</head>\n<body>\n", escape_html(title)));
    html.push_str(&format!("<h1>{}</h1>\n", escape_html(title)));

    if !fields.is_empty() {
        html.push_str("<table>\n");
        for (label, value) in fields {
            html.push_str(&format!(
                "<tr><th>{}</th><td>{}</td></tr>\n",
                escape_html(label),
                escape_html(value)
            ));
        }
        html.push_str("</table>\n<hr>\n");
    }

    html.push_str(body);
    html.push_str("\n</body>\n</html>\n");
    html
}

/// `NNN_<title><ext>`, sanitized.
pub fn item_filename(number: usize, title: &str, ext: &str, max_len: usize) -> String {
    sanitize_filename(&format!("{:03}_{}{}", number, title, ext), max_len)
}

/// Why a file was not fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Exists,
    TooLarge(u64),
    Blocked,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Exists => f.write_str("already downloaded"),
            SkipReason::TooLarge(size) => write!(f, "too large ({} bytes)", size),
            SkipReason::Blocked => f.write_str("blocked extension"),
        }
    }
}

/// Outcome of one file fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    Skipped { path: PathBuf, reason: SkipReason },
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Downloaded { path, .. } | FileOutcome::Skipped { path, .. } => path,
        }
    }
}

/// A file to place under a content folder.
#[derive(Debug, Clone)]
pub struct FileRequest<'a> {
    pub url: &'a str,
    pub dir: &'a Path,
    pub name: &'a str,
    pub expected_size: Option<u64>,
    /// Fetch with the browser cookie session instead of the token.
    pub via_web: bool,
}

/// Place one remote file under `request.dir`.
///
/// The name is sanitized. Blocked and over-size files are skipped. With
/// `skip_existing`, a file already present with the expected size is skipped.
/// Otherwise a free name is chosen so nothing is overwritten.
pub async fn fetch_file(ctx: &DownloaderContext, request: FileRequest<'_>) -> Result<FileOutcome> {
    let settings = &ctx.settings;
    let name = sanitize_filename(request.name, settings.max_filename_length);
    let target = request.dir.join(&name);

    if settings.is_blocked(&name) {
        tracing::debug!(file = %name, "Skipping blocked file type");
        return Ok(FileOutcome::Skipped {
            path: target,
            reason: SkipReason::Blocked,
        });
    }

    if let Some(size) = request.expected_size {
        if size > settings.max_file_size_bytes {
            tracing::info!(file = %name, size, "Skipping file over size limit");
            return Ok(FileOutcome::Skipped {
                path: target,
                reason: SkipReason::TooLarge(size),
            });
        }
    }

    ensure_dir(request.dir).await?;

    if settings.skip_existing && is_existing_download(&target, request.expected_size) {
        tracing::debug!(path = %target.display(), "File already exists, skipping");
        return Ok(FileOutcome::Skipped {
            path: target,
            reason: SkipReason::Exists,
        });
    }

    let path = resolve_unique_path(request.dir, &name);
    tracing::debug!(url = request.url, path = %path.display(), "Downloading file");

    let bytes = if request.via_web {
        ctx.api.download_web_file(request.url, &path).await?
    } else {
        ctx.api.download_file(request.url, &path).await?
    };

    Ok(FileOutcome::Downloaded { path, bytes })
}

/// Running totals for the files of one item.
#[derive(Debug, Default)]
pub struct FileTally {
    pub downloaded: u64,
    pub skipped: u64,
    pub bytes: u64,
}

impl FileTally {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Downloaded { bytes, .. } => {
                self.downloaded += 1;
                self.bytes += bytes;
            }
            FileOutcome::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Info for an item whose main artifact is `path`.
    pub fn info(&self, path: PathBuf) -> DownloadInfo {
        DownloadInfo {
            path,
            bytes: self.bytes,
            files: self.downloaded,
            skipped: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::contract::test_support::{api, context};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("due_at", None).unwrap(), None);
        assert_eq!(parse_timestamp("due_at", Some("")).unwrap(), None);
        let parsed = parse_timestamp("due_at", Some("2024-03-01T23:59:00Z"))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T23:59:00+00:00");
        assert!(matches!(
            parse_timestamp("due_at", Some("next friday")),
            Err(Error::Api(_))
        ));
    }

    #[test]
    fn test_html_document_escapes_fields() {
        let html = html_document("A <b> & C", &[("Author", "O'Neil".into())], "<p>body</p>");
        assert!(html.contains("<h1>A &lt;b&gt; &amp; C</h1>"));
        assert!(html.contains("<td>O&#39;Neil</td>"));
        assert!(html.contains("<p>body</p>"));
    }

    #[test]
    fn test_item_filename() {
        assert_eq!(item_filename(7, "Week 1: Intro", ".html", 150), "007_Week 1- Intro.html");
    }

    #[tokio::test]
    async fn test_fetch_file_downloads_then_skips_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/5/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"12345".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = context(api(&server.uri()), dir.path());
        let url = format!("{}/files/5/download", server.uri());
        let request = FileRequest {
            url: &url,
            dir: &dir.path().join("attachments"),
            name: "notes:v1.pdf",
            expected_size: Some(5),
            via_web: false,
        };

        let first = fetch_file(&ctx, request.clone()).await.unwrap();
        assert_eq!(
            first,
            FileOutcome::Downloaded {
                path: dir.path().join("attachments").join("notes-v1.pdf"),
                bytes: 5
            }
        );

        let second = fetch_file(&ctx, request).await.unwrap();
        assert!(matches!(
            second,
            FileOutcome::Skipped {
                reason: SkipReason::Exists,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fetch_file_never_overwrites_different_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"old content").unwrap();
        let ctx = context(api(&server.uri()), dir.path());
        let url = format!("{}/f", server.uri());

        let outcome = fetch_file(
            &ctx,
            FileRequest {
                url: &url,
                dir: dir.path(),
                name: "a.txt",
                expected_size: Some(3),
                via_web: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.path(), dir.path().join("a_001.txt"));
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"old content");
    }

    #[tokio::test]
    async fn test_fetch_file_filters() {
        let dir = TempDir::new().unwrap();
        let ctx = context(api("http://127.0.0.1:9"), dir.path());

        let blocked = fetch_file(
            &ctx,
            FileRequest {
                url: "http://127.0.0.1:9/x",
                dir: dir.path(),
                name: "setup.exe",
                expected_size: None,
                via_web: false,
            },
        )
        .await
        .unwrap();
        assert!(matches!(blocked, FileOutcome::Skipped { reason: SkipReason::Blocked, .. }));

        let huge = fetch_file(
            &ctx,
            FileRequest {
                url: "http://127.0.0.1:9/x",
                dir: dir.path(),
                name: "video.mp4",
                expected_size: Some(u64::MAX),
                via_web: false,
            },
        )
        .await
        .unwrap();
        assert!(matches!(huge, FileOutcome::Skipped { reason: SkipReason::TooLarge(_), .. }));
    }
}
