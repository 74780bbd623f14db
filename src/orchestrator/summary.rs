//! `download_summary.json`, written once per run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::{Config, ContentType};
use crate::error::Result;
use crate::orchestrator::results::DownloadResults;

pub const SUMMARY_FILE: &str = "download_summary.json";
pub const SUMMARY_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub api_base_url: String,
    pub user_name: Option<String>,
    pub started: DateTime<Local>,
    pub finished: Option<DateTime<Local>>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfiguration {
    pub enabled_content_types: Vec<ContentType>,
    pub directory: PathBuf,
    pub skip_existing: bool,
    pub max_retries: u32,
    pub max_file_size_mb: u64,
    pub hybrid_modules: bool,
    pub web_scraping: bool,
}

impl DownloadConfiguration {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled_content_types: config.content_types.enabled(),
            directory: config.download_directory(),
            skip_existing: config.download.skip_existing,
            max_retries: config.download.max_retries,
            max_file_size_mb: config.download.max_file_size_mb,
            hybrid_modules: config.modules.hybrid,
            web_scraping: config.modules.web_scraping,
        }
    }
}

/// The run summary document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub session_info: SessionInfo,
    pub download_configuration: DownloadConfiguration,
    pub results: DownloadResults,
    pub generated_at: DateTime<Local>,
    pub version: String,
}

impl RunSummary {
    pub fn new(
        config: &Config,
        user_name: Option<String>,
        results: &DownloadResults,
    ) -> Self {
        Self {
            session_info: SessionInfo {
                api_base_url: config.account.api_base_url.clone(),
                user_name,
                started: results.start_time,
                finished: results.end_time,
                cancelled: results.cancelled,
            },
            download_configuration: DownloadConfiguration::from_config(config),
            results: results.clone(),
            generated_at: Local::now(),
            version: SUMMARY_VERSION.to_string(),
        }
    }

    /// `{root}/download_summary.json`.
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(SUMMARY_FILE)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        tracing::info!(path = %path.display(), "Saved download summary");
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&text)?)
    }
}
