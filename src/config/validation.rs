//! Configuration validation logic.

use crate::config::loader::Config;
use crate::error::{Error, Result};
use regex::Regex;
use url::Url;

/// Minimum length for a Canvas access token.
const MIN_TOKEN_LENGTH: usize = 10;

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_base_url(&config.account.api_base_url)?;
    validate_token(&config.account.api_token)?;
    validate_download_limits(config)?;

    if let Some(path) = &config.account.cookies_path {
        if !path.exists() {
            return Err(Error::ConfigValidation {
                field: "cookies_path".to_string(),
                message: format!("Cookie file not found: {}", path.display()),
            });
        }
    }

    Ok(())
}

/// Validate the Canvas base URL and return it parsed.
pub fn validate_base_url(base_url: &str) -> Result<Url> {
    if base_url.trim().is_empty() {
        return Err(Error::MissingConfig("api_base_url".to_string()));
    }

    let url = Url::parse(base_url.trim())
        .map_err(|e| Error::InvalidBaseUrl(format!("'{}': {}", base_url, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(Error::InvalidBaseUrl(format!(
            "'{}': scheme must be http or https",
            base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(Error::InvalidBaseUrl(format!("'{}': missing host", base_url)));
    }

    Ok(url)
}

/// Validate the API access token.
pub fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(Error::MissingConfig("api_token".to_string()));
    }

    if token.len() < MIN_TOKEN_LENGTH {
        return Err(Error::ConfigValidation {
            field: "api_token".to_string(),
            message: format!(
                "Token must be at least {} characters (got {})",
                MIN_TOKEN_LENGTH,
                token.len()
            ),
        });
    }

    // Check for placeholder values
    let token_lower = token.to_lowercase();
    if token_lower.contains("replaceme") || token_lower.contains("your_token") {
        return Err(Error::ConfigValidation {
            field: "api_token".to_string(),
            message: "Token appears to be a placeholder. Generate one under Account > Settings."
                .to_string(),
        });
    }

    Ok(())
}

/// Validate numeric download limits.
pub fn validate_download_limits(config: &Config) -> Result<()> {
    let download = &config.download;

    let checks = [
        ("timeout_seconds", download.timeout_seconds == 0),
        ("max_file_size_mb", download.max_file_size_mb == 0),
        ("max_filename_length", download.max_filename_length < 16),
        ("retry_base_delay_ms", download.retry_base_delay_ms == 0),
        (
            "retry_max_delay_ms",
            download.retry_max_delay_ms < download.retry_base_delay_ms,
        ),
    ];

    for (field, invalid) in checks {
        if invalid {
            return Err(Error::ConfigValidation {
                field: field.to_string(),
                message: "Value out of range".to_string(),
            });
        }
    }

    Ok(())
}

/// Validate course identifiers given on the command line.
pub fn validate_course_ids<S: AsRef<str>>(ids: &[S]) -> Result<()> {
    if ids.is_empty() {
        return Err(Error::MissingConfig(
            "course ids (use --course or --all)".to_string(),
        ));
    }

    let id_pattern = Regex::new(r"^[A-Za-z0-9_:.\-]+$")
        .map_err(|e| Error::Config(format!("Invalid course id pattern: {}", e)))?;

    for id in ids {
        let id = id.as_ref();
        if !id_pattern.is_match(id) {
            return Err(Error::ConfigValidation {
                field: "course".to_string(),
                message: format!("Invalid course id: '{}'", id),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_base_url() {
        let url = validate_base_url("https://school.instructure.com").unwrap();
        assert_eq!(url.host_str(), Some("school.instructure.com"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            validate_base_url("ftp://school.edu"),
            Err(Error::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            validate_base_url("not a url"),
            Err(Error::InvalidBaseUrl(_))
        ));
        assert!(matches!(validate_base_url(""), Err(Error::MissingConfig(_))));
    }

    #[test]
    fn test_token_placeholder() {
        assert!(validate_token("").is_err());
        assert!(validate_token("short").is_err());
        assert!(validate_token("your_token_goes_here").is_err());
        assert!(validate_token("7~AbCdEfGhIjKlMnOpQrStUvWxYz").is_ok());
    }

    #[test]
    fn test_download_limits() {
        let mut config = Config::default();
        assert!(validate_download_limits(&config).is_ok());

        config.download.timeout_seconds = 0;
        assert!(validate_download_limits(&config).is_err());
    }

    #[test]
    fn test_course_ids() {
        assert!(validate_course_ids(&["12345", "sis_course_id:ABC-101"]).is_ok());
        assert!(validate_course_ids(&["12/../3"]).is_err());
        assert!(validate_course_ids::<&str>(&[]).is_err());
    }
}
