//! Filename sanitization and collision-safe path resolution.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Local;
use regex::Regex;
use url::Url;

/// Lower bound for the configured filename length.
pub const MIN_FILENAME_LENGTH: usize = 16;

/// Default filename length used when no limit is configured.
pub const DEFAULT_MAX_FILENAME_LENGTH: usize = 150;

/// Extensions longer than this are not treated as extensions when truncating.
const MAX_EXTENSION_LEN: usize = 10;

/// Numeric suffix attempts before falling back to a timestamp.
const MAX_NUMERIC_SUFFIX: u32 = 999;

/// Replacement for names that sanitize to nothing.
const EMPTY_NAME: &str = "unnamed_file";

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Extensions accepted when inferring a file type from a URL.
const KNOWN_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "odt", "ods", "odp", "rtf", "txt", "csv",
    "md", "html", "htm", "zip", "rar", "7z", "tar", "gz", "jpg", "jpeg", "png", "gif", "svg",
    "webp", "bmp", "mp3", "wav", "m4a", "mp4", "mov", "avi", "mkv", "webm", "py", "java", "c",
    "cpp", "h", "js", "ts", "json", "xml", "ipynb", "r", "m", "sql", "tex", "epub",
];

fn dot_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.{2,}").expect("static regex"))
}

/// Make a name safe to use as a single path component.
///
/// Total and idempotent: `sanitize_filename(&sanitize_filename(x, n), n) == sanitize_filename(x, n)`.
/// The result is never empty, never contains a path separator or a `..` run,
/// and is at most `max_len` bytes (clamped to [`MIN_FILENAME_LENGTH`]).
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let max_len = max_len.max(MIN_FILENAME_LENGTH);

    let mapped: String = name
        .chars()
        .filter_map(|c| match c {
            '<' | '>' | '?' | '*' | '\0' | '\r' => None,
            ':' | '/' | '\\' | '|' => Some('-'),
            '"' => Some('\''),
            c if c.is_control() => Some(' '),
            c => Some(c),
        })
        .collect();

    let collapsed = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c| c == ' ' || c == '.');

    let mut sanitized = if trimmed.is_empty() {
        EMPTY_NAME.to_string()
    } else {
        dot_run_re().replace_all(trimmed, "_").into_owned()
    };

    if is_reserved(&sanitized) {
        sanitized.insert(0, '_');
    }

    let mut truncated = truncate_preserving_extension(&sanitized, max_len);

    // Truncation can expose a reserved stem; swap its last char so the length holds.
    if is_reserved(&truncated) {
        let stem_len = truncated.find('.').unwrap_or(truncated.len());
        if let Some((idx, _)) = truncated[..stem_len].char_indices().last() {
            truncated.replace_range(idx..stem_len, "_");
        }
    }

    truncated
}

/// Sanitize a folder name. Same rules as [`sanitize_filename`] with the default length.
pub fn sanitize_path_component(name: &str) -> String {
    sanitize_filename(name, DEFAULT_MAX_FILENAME_LENGTH)
}

fn is_reserved(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn truncate_preserving_extension(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }

    if let Some((stem, ext)) = name.rsplit_once('.') {
        if !stem.is_empty() && !ext.is_empty() && ext.len() <= MAX_EXTENSION_LEN {
            let budget = max_len - ext.len() - 1;
            let stem = truncate_at_char_boundary(stem, budget).trim_end_matches([' ', '.']);
            if !stem.is_empty() {
                return format!("{}.{}", stem, ext);
            }
        }
    }

    truncate_at_char_boundary(name, max_len)
        .trim_end_matches([' ', '.'])
        .to_string()
}

/// Split a filename into stem and extension (without the dot).
fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    }
}

fn with_suffix(stem: &str, ext: Option<&str>, suffix: &str) -> String {
    match ext {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", stem, suffix),
    }
}

/// Resolve a path in `dir` for `filename` that does not exist yet.
///
/// Tries the name itself, then `_001` through `_999`, then a timestamp suffix.
/// Deterministic for a fixed set of existing files up to the timestamp fallback.
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = split_extension(filename);

    for counter in 1..=MAX_NUMERIC_SUFFIX {
        let candidate = dir.join(with_suffix(stem, ext, &format!("{:03}", counter)));
        if !candidate.exists() {
            return candidate;
        }
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();
    let candidate = dir.join(with_suffix(stem, ext, &timestamp));
    if !candidate.exists() {
        return candidate;
    }

    dir.join(with_suffix(stem, ext, &uuid::Uuid::new_v4().simple().to_string()))
}

/// Whether an existing file at `path` already holds the expected content.
///
/// Without an expected size, existence alone counts.
pub fn is_existing_download(path: &Path, expected_size: Option<u64>) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => expected_size.map_or(true, |size| meta.len() == size),
        _ => false,
    }
}

/// Infer a known file extension from a URL's path.
pub fn extension_from_url(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    };

    let last = path.rsplit('/').next()?;
    let (_, ext) = split_extension(last);
    let ext = ext?.to_lowercase();

    is_known_extension(&ext).then_some(ext)
}

/// Whether `ext` (without the dot, any case) is a common document or media extension.
pub fn is_known_extension(ext: &str) -> bool {
    KNOWN_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Human-readable file type label for sidecar metadata.
pub fn file_type_label(filename: &str) -> String {
    let ext = split_extension(filename)
        .1
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let label = match ext.as_str() {
        "pdf" => "PDF Document",
        "doc" | "docx" => "Word Document",
        "ppt" | "pptx" => "PowerPoint Presentation",
        "xls" | "xlsx" => "Excel Spreadsheet",
        "txt" => "Text File",
        "zip" | "rar" | "7z" => "Archive",
        _ => "",
    };

    if !label.is_empty() {
        return label.to_string();
    }

    mime_guess::from_path(filename)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename_replacements() {
        assert_eq!(sanitize_filename("normal.txt", 150), "normal.txt");
        assert_eq!(sanitize_filename("Week 1: Intro.pdf", 150), "Week 1- Intro.pdf");
        assert_eq!(sanitize_filename("a/b\\c|d.txt", 150), "a-b-c-d.txt");
        assert_eq!(sanitize_filename("what?*<now>.doc", 150), "whatnow.doc");
        assert_eq!(sanitize_filename("say \"hi\".txt", 150), "say 'hi'.txt");
        assert_eq!(sanitize_filename("tab\there\nnow", 150), "tab here now");
    }

    #[test]
    fn test_sanitize_filename_edges() {
        assert_eq!(sanitize_filename("", 150), "unnamed_file");
        assert_eq!(sanitize_filename("  ...  ", 150), "unnamed_file");
        assert_eq!(sanitize_filename("..", 150), "unnamed_file");
        assert_eq!(sanitize_filename("  spaced   out  .", 150), "spaced out");
        assert_eq!(sanitize_filename("CON.txt", 150), "_CON.txt");
        assert_eq!(sanitize_filename("lpt1", 150), "_lpt1");
    }

    #[test]
    fn test_sanitize_filename_replaces_dot_runs() {
        assert_eq!(sanitize_filename("../../etc/passwd", 150), "-_-etc-passwd");
        assert_eq!(sanitize_filename("notes..final...pdf", 150), "notes_final_pdf");
        assert_eq!(sanitize_filename("Wait for it...", 150), "Wait for it");
        assert_eq!(sanitize_filename("v1.2.txt", 150), "v1.2.txt");
    }

    #[test]
    fn test_sanitize_filename_truncation_preserves_extension() {
        let long = format!("{}.pdf", "x".repeat(300));
        let sanitized = sanitize_filename(&long, 50);
        assert_eq!(sanitized.len(), 50);
        assert!(sanitized.ends_with(".pdf"));

        let unicode = format!("{}.docx", "é".repeat(100));
        let sanitized = sanitize_filename(&unicode, 31);
        assert!(sanitized.len() <= 31);
        assert!(sanitized.ends_with(".docx"));
    }

    #[test]
    fn test_sanitize_filename_idempotent() {
        let inputs = [
            "",
            "..",
            "...hidden",
            "../../etc/passwd",
            "a..b. ..c",
            " a  b ",
            "CON",
            "com1.txt",
            "COM1 extra words that go on and on.pdf",
            "Lecture 3: \"Graphs\" / Trees?.pptx",
            "\t\n\r\0",
            "name. ext with space",
            "ünïcödé ñame 名前.txt",
            &"a.".repeat(200),
            &format!("{}.{}", "b".repeat(40), "c".repeat(30)),
            &format!("COM1.{}", "verylongextension".repeat(3)),
        ];

        for input in inputs {
            for max_len in [16, 20, 50, 150] {
                let once = sanitize_filename(input, max_len);
                let twice = sanitize_filename(&once, max_len);
                assert_eq!(once, twice, "not idempotent for {:?} at {}", input, max_len);
                assert!(!once.is_empty());
                assert!(once.len() <= max_len.max(MIN_FILENAME_LENGTH));
                assert!(!once.contains('/') && !once.contains('\\'));
            }
        }
    }

    #[test]
    fn test_resolve_unique_path() {
        let dir = TempDir::new().unwrap();

        let first = resolve_unique_path(dir.path(), "notes.pdf");
        assert_eq!(first, dir.path().join("notes.pdf"));
        std::fs::write(&first, b"a").unwrap();

        let second = resolve_unique_path(dir.path(), "notes.pdf");
        assert_eq!(second, dir.path().join("notes_001.pdf"));
        assert_eq!(resolve_unique_path(dir.path(), "notes.pdf"), second);
        std::fs::write(&second, b"b").unwrap();

        let third = resolve_unique_path(dir.path(), "notes.pdf");
        assert_eq!(third, dir.path().join("notes_002.pdf"));
        assert!(!third.exists());

        std::fs::write(dir.path().join("README"), b"c").unwrap();
        assert_eq!(
            resolve_unique_path(dir.path(), "README"),
            dir.path().join("README_001")
        );
    }

    #[test]
    fn test_is_existing_download() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");
        assert!(!is_existing_download(&path, None));

        std::fs::write(&path, b"12345").unwrap();
        assert!(is_existing_download(&path, None));
        assert!(is_existing_download(&path, Some(5)));
        assert!(!is_existing_download(&path, Some(6)));
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(
            extension_from_url("https://x.edu/files/1/Syllabus.PDF?download=1"),
            Some("pdf".to_string())
        );
        assert_eq!(extension_from_url("https://x.edu/files/1/download"), None);
        assert_eq!(extension_from_url("https://x.edu/a/setup.exe"), None);
    }

    #[test]
    fn test_file_type_label() {
        assert_eq!(file_type_label("a.pdf"), "PDF Document");
        assert_eq!(file_type_label("b.DOCX"), "Word Document");
        assert_eq!(file_type_label("c.png"), "image/png");
        assert_eq!(file_type_label("noext"), "Unknown");
    }
}
