//! Turning scraped links into download URLs and file names.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::fs::naming::{
    extension_from_url, is_known_extension, sanitize_filename, DEFAULT_MAX_FILENAME_LENGTH,
};
use crate::scrape::ScrapedLink;

fn module_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/courses/[^/]+/modules/items/(\d+)").expect("static regex"))
}

fn file_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/files/(\d+)").expect("static regex"))
}

fn filename_in_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^/\\:*?"<>|]+\.([A-Za-z0-9]{1,5}))\b"#).expect("static regex")
    })
}

/// A file name embedded in free text, e.g. `Lecture 1.pdf`.
///
/// Size hints such as `(2.4 MB)` are not file names: the extension must start
/// with a letter or be a known one like `7z`.
fn filename_in_text(text: &str) -> Option<String> {
    filename_in_text_re()
        .captures_iter(text)
        .find(|caps| {
            let ext = &caps[2];
            ext.starts_with(|c: char| c.is_ascii_alphabetic()) || is_known_extension(ext)
        })
        .map(|caps| caps[1].trim().to_string())
}

/// Module item id of a `/courses/<c>/modules/items/<id>` link.
pub fn module_item_id_from_url(url: &Url) -> Option<String> {
    module_item_re()
        .captures(url.path())
        .map(|caps| caps[1].to_string())
}

/// File id of a `/files/<id>` link, or of its `content_id` query parameter.
pub fn file_id_from_url(url: &Url) -> Option<String> {
    if let Some(caps) = file_id_re().captures(url.path()) {
        return Some(caps[1].to_string());
    }
    url.query_pairs()
        .find(|(key, _)| key == "content_id")
        .map(|(_, value)| value.into_owned())
}

/// Point a `/files/<id>` preview link at its `/download` endpoint.
pub fn with_download_segment(url: &Url) -> Url {
    let path = url.path().trim_end_matches('/');
    let ends_with_file_id = file_id_re()
        .find_iter(path)
        .last()
        .map(|m| m.end() == path.len())
        .unwrap_or(false);
    if !ends_with_file_id {
        return url.clone();
    }

    let mut resolved = url.clone();
    resolved.set_path(&format!("{}/download", path));
    resolved
}

fn decoded(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Pick a safe local name for a scraped link.
///
/// Tries the last URL path segment when it carries an extension, then the
/// `filename`/`name`/`file`/`attachment` query parameters, then a file name
/// inside the label or the link text, then the link text itself, then
/// `file_<index>`.
pub fn filename_for_link(link: &ScrapedLink, index: usize) -> String {
    let from_path = link
        .url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(decoded)
        .filter(|name| name.len() > 1 && name.contains('.') && !name.starts_with('.'));

    let from_query = || {
        ["filename", "name", "file", "attachment"].iter().find_map(|key| {
            link.url
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .filter(|v| v.contains('.'))
        })
    };

    let from_text = || {
        [link.label.as_deref(), Some(link.text.as_str())]
            .into_iter()
            .flatten()
            .find_map(filename_in_text)
    };

    let name = from_path
        .or_else(from_query)
        .or_else(from_text)
        .or_else(|| {
            let text = link.text.trim();
            if text.is_empty() {
                None
            } else {
                let ext = extension_from_url(link.url.as_str())
                    .map(|ext| format!(".{}", ext))
                    .unwrap_or_default();
                Some(format!("{}{}", text, ext))
            }
        })
        .unwrap_or_else(|| format!("file_{}", index));

    sanitize_filename(&name, DEFAULT_MAX_FILENAME_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::LinkSource;

    fn link(url: &str, text: &str, label: Option<&str>) -> ScrapedLink {
        ScrapedLink {
            url: Url::parse(url).unwrap(),
            text: text.to_string(),
            label: label.map(str::to_string),
            size_hint: None,
            source: LinkSource::DirectLink,
        }
    }

    #[test]
    fn test_ids_from_urls() {
        let item = Url::parse("https://x.edu/courses/9/modules/items/501").unwrap();
        assert_eq!(module_item_id_from_url(&item).as_deref(), Some("501"));
        assert_eq!(file_id_from_url(&item), None);

        let file = Url::parse("https://x.edu/courses/9/files/77/download?wrap=1").unwrap();
        assert_eq!(file_id_from_url(&file).as_deref(), Some("77"));
        assert_eq!(module_item_id_from_url(&file), None);

        let query = Url::parse("https://x.edu/preview?content_id=31").unwrap();
        assert_eq!(file_id_from_url(&query).as_deref(), Some("31"));
    }

    #[test]
    fn test_with_download_segment() {
        let preview = Url::parse("https://x.edu/courses/9/files/77?verifier=abc").unwrap();
        assert_eq!(
            with_download_segment(&preview).as_str(),
            "https://x.edu/courses/9/files/77/download?verifier=abc"
        );

        let already = Url::parse("https://x.edu/courses/9/files/77/download").unwrap();
        assert_eq!(with_download_segment(&already), already);

        let other = Url::parse("https://cdn.x.edu/handout.pdf").unwrap();
        assert_eq!(with_download_segment(&other), other);
    }

    #[test]
    fn test_filename_preference_order() {
        assert_eq!(
            filename_for_link(&link("https://cdn.x.edu/Week%201%20Notes.pdf", "Notes", None), 1),
            "Week 1 Notes.pdf"
        );
        assert_eq!(
            filename_for_link(
                &link("https://x.edu/files/77/download?filename=slides.pptx", "Slides", None),
                1
            ),
            "slides.pptx"
        );
        assert_eq!(
            filename_for_link(
                &link("https://x.edu/courses/9/files/77", "Lecture 1 (2 MB)", Some("Lecture 1.pdf")),
                1
            ),
            "Lecture 1.pdf"
        );
        assert_eq!(
            filename_for_link(
                &link(
                    "https://x.edu/courses/9/files/77/download?wrap=1",
                    "Lecture 1 (2.4 MB)",
                    Some("Lecture 1.pdf")
                ),
                1
            ),
            "Lecture 1.pdf"
        );
        assert_eq!(
            filename_for_link(
                &link("https://x.edu/courses/9/files/78", "Archive (1.5 GB)", Some("lab data.7z")),
                1
            ),
            "lab data.7z"
        );
        assert_eq!(
            filename_for_link(&link("https://x.edu/courses/9/files/77", "Reading list", None), 1),
            "Reading list"
        );
        assert_eq!(
            filename_for_link(&link("https://x.edu/courses/9/files/77", "  ", None), 4),
            "file_4"
        );
    }
}
