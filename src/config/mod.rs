//! Configuration module for canvas-sync.
//!
//! This module handles:
//! - Loading configuration from TOML files
//! - Content type definitions and toggles
//! - Configuration validation

pub mod content_type;
pub mod loader;
pub mod validation;

pub use content_type::ContentType;
pub use loader::{AccountConfig, Config, ContentTypesConfig, DownloadConfig, ModulesConfig};
pub use validation::{validate_base_url, validate_config, validate_course_ids};
