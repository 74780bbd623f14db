//! Filesystem module.
//!
//! Provides:
//! - Filename sanitization
//! - Collision-safe path resolution
//! - Course and content-type folder layout

pub mod naming;
pub mod paths;

pub use naming::{
    extension_from_url, file_type_label, is_existing_download, resolve_unique_path,
    sanitize_filename, sanitize_path_component,
};
pub use paths::{content_type_dir, course_root, ensure_dir, metadata_file_path};
