//! Canvas API module.
//!
//! This module provides:
//! - HTTP client for the Canvas REST API
//! - Netscape cookie loading for rendered page fetches
//! - API response types

pub mod client;
pub mod cookies;
pub mod types;

pub use client::{CanvasApi, SessionCredentials};
pub use cookies::load_netscape_cookies;
pub use types::*;
