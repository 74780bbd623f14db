//! Command-line argument definitions using clap.

use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, ContentType};

/// Canvas course content synchronizer.
#[derive(Parser, Debug)]
#[command(
    name = "canvas-sync",
    version,
    about = "Synchronize Canvas LMS course content to a local folder tree",
    long_about = "Downloads announcements, assignments, discussions, files, modules, quizzes,\n\
                  grades and people from Canvas courses into {year}/{semester}/{course} folders.\n\n\
                  Module pages can be scraped with a browser cookie session to recover files\n\
                  the API does not list."
)]
pub struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Course id(s) to download. Repeat or separate with commas.
    #[arg(long = "course", value_delimiter = ',', num_args = 1..)]
    pub courses: Vec<String>,

    /// Download every active course.
    #[arg(long, conflicts_with = "courses")]
    pub all: bool,

    /// List available courses and exit.
    #[arg(short, long)]
    pub list: bool,

    /// Base directory for downloads.
    #[arg(short = 'd', long = "directory")]
    pub download_directory: Option<PathBuf>,

    /// Canvas base URL, e.g. https://school.instructure.com.
    #[arg(long = "api-url", env = "CANVAS_API_URL")]
    pub api_url: Option<String>,

    /// Canvas API access token.
    #[arg(short, long, env = "CANVAS_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Netscape-format cookie file for module page scraping.
    #[arg(long, env = "CANVAS_COOKIES")]
    pub cookies: Option<PathBuf>,

    /// Only these content types, comma separated.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub content: Option<Vec<ContentType>>,

    /// Disable module page scraping.
    #[arg(long)]
    pub no_scrape: bool,

    /// Use the API-only module downloader.
    #[arg(long)]
    pub api_only_modules: bool,

    /// Retry attempts for failed requests.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Hide progress bars.
    #[arg(long, short)]
    pub quiet: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(&self, config: &mut Config) {
        if let Some(url) = &self.api_url {
            config.account.api_base_url = url.clone();
        }

        if let Some(token) = &self.token {
            config.account.api_token = token.clone();
        }

        if let Some(cookies) = &self.cookies {
            config.account.cookies_path = Some(cookies.clone());
        }

        if let Some(dir) = &self.download_directory {
            config.download.directory = Some(dir.clone());
        }

        if let Some(retries) = self.max_retries {
            config.download.max_retries = retries;
        }

        // An explicit list replaces the configured toggles.
        if let Some(selected) = &self.content {
            for content_type in ContentType::ALL {
                config
                    .content_types
                    .set_enabled(content_type, selected.contains(&content_type));
            }
        }

        if self.no_scrape {
            config.modules.web_scraping = false;
        }

        if self.api_only_modules {
            config.modules.hybrid = false;
        }
    }
}
