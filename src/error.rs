//! Error types for the canvas-sync application.

use std::time::Duration;

use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // Session errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid Canvas base URL: {0}")]
    InvalidBaseUrl(String),

    /// 401/403 on a single resource. The session itself may still be valid.
    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Session not initialized")]
    SessionNotInitialized,

    // API errors
    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    // Content errors
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Page scrape failed: {0}")]
    Scrape(String),

    #[error("No downloader registered for content type '{0}'")]
    UnknownContentType(String),

    // File system errors
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a failed request may succeed if attempted again.
    ///
    /// Timeouts, 5xx responses and rate limiting are transient. 401/403 never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::RateLimited(_) => true,
            Error::Status { status, .. } => *status >= 500 || *status == 429,
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Whether the error invalidates the whole session and must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_) | Error::InvalidBaseUrl(_) | Error::SessionNotInitialized
        )
    }

    /// Short machine-readable name of the error class, used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigValidation { .. } | Error::MissingConfig(_) => "config",
            Error::Authentication(_) => "authentication",
            Error::Forbidden(_) => "forbidden",
            Error::InvalidBaseUrl(_) => "invalid_base_url",
            Error::SessionNotInitialized => "session",
            Error::Api(_) => "api",
            Error::Status { .. } => "http_status",
            Error::NotFound(_) => "not_found",
            Error::RateLimited(_) => "rate_limited",
            Error::Timeout(_) => "timeout",
            Error::Download(_) => "download",
            Error::Scrape(_) => "scrape",
            Error::UnknownContentType(_) => "unknown_content_type",
            Error::InvalidFilename(_) => "invalid_filename",
            Error::Io(_) => "io",
            Error::Http(_) => "http",
            Error::Json(_) => "json",
            Error::TomlParse(_) => "toml",
            Error::UrlParse(_) => "url",
        }
    }
}

/// Process exit codes.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ABORT: i32 = 1;
    pub const API_ERROR: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
    pub const DOWNLOAD_ERROR: i32 = 4;
    pub const UNEXPECTED_ERROR: i32 = 5;
    pub const SOME_COURSES_FAILED: i32 = 6;
}
