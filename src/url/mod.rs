//! URL handling module for Trawler
//!
//! This module provides start-URL normalization, host extraction, and the
//! same-host scope check that bounds every traversal.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{allowed_host, is_in_scope, normalize_hostname};
pub use normalize::{normalize_page_url, normalize_start_url};
