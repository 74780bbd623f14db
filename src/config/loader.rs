//! Configuration structures and loading logic.

use crate::config::content_type::ContentType;
use crate::error::{Error, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub content_types: ContentTypesConfig,

    #[serde(default)]
    pub modules: ModulesConfig,
}

/// Canvas credentials. Resolved by the caller, never persisted by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Canvas instance root, e.g. `https://school.instructure.com`.
    #[serde(default)]
    pub api_base_url: String,

    /// Personal access token.
    #[serde(default)]
    pub api_token: String,

    /// Netscape-format cookie file for authenticated page scraping.
    #[serde(default)]
    pub cookies_path: Option<PathBuf>,
}

/// Download behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root of the produced folder tree.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Skip files that already exist locally instead of writing a renamed copy.
    #[serde(default = "default_true")]
    pub skip_existing: bool,

    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    #[serde(default = "default_max_filename_length")]
    pub max_filename_length: usize,

    #[serde(default = "default_blocked_extensions")]
    pub blocked_extensions: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            timeout_seconds: default_timeout_seconds(),
            skip_existing: true,
            max_file_size_mb: default_max_file_size_mb(),
            max_filename_length: default_max_filename_length(),
            blocked_extensions: default_blocked_extensions(),
            user_agent: default_user_agent(),
        }
    }
}

/// Per content type enable toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTypesConfig {
    #[serde(default = "default_true")]
    pub announcements: bool,
    #[serde(default = "default_true")]
    pub assignments: bool,
    #[serde(default = "default_true")]
    pub discussions: bool,
    #[serde(default = "default_true")]
    pub files: bool,
    #[serde(default = "default_true")]
    pub modules: bool,
    #[serde(default = "default_true")]
    pub grades: bool,
    #[serde(default = "default_true")]
    pub quizzes: bool,
    #[serde(default)]
    pub people: bool,
}

impl Default for ContentTypesConfig {
    fn default() -> Self {
        Self {
            announcements: true,
            assignments: true,
            discussions: true,
            files: true,
            modules: true,
            grades: true,
            quizzes: true,
            people: false,
        }
    }
}

impl ContentTypesConfig {
    /// Whether a content type is switched on.
    pub fn is_enabled(&self, content_type: ContentType) -> bool {
        match content_type {
            ContentType::Announcements => self.announcements,
            ContentType::Assignments => self.assignments,
            ContentType::Discussions => self.discussions,
            ContentType::Files => self.files,
            ContentType::Modules => self.modules,
            ContentType::Grades => self.grades,
            ContentType::People => self.people,
            ContentType::Quizzes => self.quizzes,
        }
    }

    pub fn set_enabled(&mut self, content_type: ContentType, enabled: bool) {
        let flag = match content_type {
            ContentType::Announcements => &mut self.announcements,
            ContentType::Assignments => &mut self.assignments,
            ContentType::Discussions => &mut self.discussions,
            ContentType::Files => &mut self.files,
            ContentType::Modules => &mut self.modules,
            ContentType::Grades => &mut self.grades,
            ContentType::People => &mut self.people,
            ContentType::Quizzes => &mut self.quizzes,
        };
        *flag = enabled;
    }

    /// Enabled content types in processing order.
    pub fn enabled(&self) -> Vec<ContentType> {
        ContentType::ALL
            .into_iter()
            .filter(|ct| self.is_enabled(*ct))
            .collect()
    }
}

/// Module retrieval options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Use the hybrid API + page scrape resolver for modules.
    #[serde(default = "default_true")]
    pub hybrid: bool,

    /// Enable the page scrape phase of the hybrid resolver.
    #[serde(default = "default_true")]
    pub web_scraping: bool,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            hybrid: true,
            web_scraping: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_file_size_mb() -> u64 {
    500
}

fn default_max_filename_length() -> usize {
    150
}

fn default_blocked_extensions() -> Vec<String> {
    [".exe", ".bat", ".cmd", ".scr"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_user_agent() -> String {
    concat!("canvas-sync/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "Configuration file not found: {}. Create one from config.example.toml",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the effective download root.
    ///
    /// Falls back to `<Downloads>/canvas`, then `./downloads`.
    pub fn download_directory(&self) -> PathBuf {
        if let Some(dir) = &self.download.directory {
            return dir.clone();
        }
        UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|d| d.join("canvas")))
            .unwrap_or_else(|| PathBuf::from("downloads"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.download.timeout_seconds)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.download.max_file_size_mb * 1024 * 1024
    }
}
