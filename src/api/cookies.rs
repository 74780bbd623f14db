//! Netscape cookie file loading for authenticated page fetches.

use std::path::Path;
use std::sync::Arc;

use reqwest::cookie::Jar;
use url::Url;

use crate::error::{Error, Result};

/// One line of a Netscape `cookies.txt` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetscapeCookie {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub expires: i64,
    pub name: String,
    pub value: String,
    pub http_only: bool,
}

impl NetscapeCookie {
    /// Host the cookie is scoped to, without the leading dot.
    pub fn host(&self) -> &str {
        self.domain.trim_start_matches('.')
    }

    fn set_cookie_header(&self) -> String {
        let mut header = format!(
            "{}={}; Domain={}; Path={}",
            self.name,
            self.value,
            self.host(),
            self.path
        );
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }
}

/// Parse the tab separated cookie format written by browser export tools.
///
/// Comment lines are skipped, except `#HttpOnly_` entries which carry a
/// cookie. Lines with fewer than seven fields are ignored.
pub fn parse_netscape_cookies(text: &str) -> Vec<NetscapeCookie> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let (line, http_only) = match line.strip_prefix("#HttpOnly_") {
                Some(rest) => (rest, true),
                None => (line, false),
            };
            if line.trim().is_empty() || line.starts_with('#') {
                return None;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                tracing::debug!("Skipping malformed cookie line");
                return None;
            }

            Some(NetscapeCookie {
                domain: fields[0].to_string(),
                include_subdomains: fields[1].eq_ignore_ascii_case("TRUE"),
                path: fields[2].to_string(),
                secure: fields[3].eq_ignore_ascii_case("TRUE"),
                expires: fields[4].parse().unwrap_or(0),
                name: fields[5].to_string(),
                value: fields[6].to_string(),
                http_only,
            })
        })
        .collect()
}

/// Load a cookie file into a jar usable by `reqwest`.
pub fn load_netscape_cookies(path: &Path) -> Result<Arc<Jar>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read cookie file {}: {}",
            path.display(),
            e
        ))
    })?;

    let cookies = parse_netscape_cookies(&text);
    let jar = Jar::default();
    for cookie in &cookies {
        let url = Url::parse(&format!("https://{}{}", cookie.host(), cookie.path))?;
        jar.add_cookie_str(&cookie.set_cookie_header(), &url);
    }

    tracing::info!(count = cookies.len(), path = %path.display(), "Loaded browser cookies");
    Ok(Arc::new(jar))
}
