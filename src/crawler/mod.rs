//! Crawler module for same-host traversal jobs
//!
//! This module contains the core crawling logic, including:
//! - The resource filter that keeps non-document downloads out of a crawl
//! - The cancellation registry consulted once per traversal step
//! - HTTP fetching and HTML parsing
//! - The breadth-first crawl engine and the service that persists its result

mod cancellation;
mod engine;
mod fetcher;
mod parser;
mod resource_filter;
mod service;

pub use cancellation::{CancelGuard, CancellationRegistry};
pub use engine::CrawlEngine;
pub use fetcher::{build_http_client, FetchError, FetchedPage, HttpFetcher, PageFetcher};
pub use parser::{parse_page, ParsedPage};
pub use resource_filter::{ResourceFilter, ResourceKind};
pub use service::CrawlService;

use crate::state::JobStatus;
use serde::{Deserialize, Serialize};

/// One visited page of a crawl
///
/// A failed page keeps its URL, an empty title, no text and the error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub url: String,
    pub title: String,
    pub text_content: Option<String>,
    pub links_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageResult {
    /// Result for a page that loaded
    pub fn fetched(url: impl Into<String>, title: String, text: String, links_found: usize) -> Self {
        Self {
            url: url.into(),
            title,
            text_content: Some(text),
            links_found,
            error: None,
        }
    }

    /// Result for a page that could not be loaded
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            text_content: None,
            links_found: 0,
            error: Some(error.into()),
        }
    }

    /// Returns true if the page failed to load
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Traversal bounds of one crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSettings {
    /// Deepest link level that is still fetched (the start page is depth 0)
    pub max_depth: u32,
    /// Maximum number of pages in the result list
    pub page_limit: usize,
}

/// What a traversal hands back to its caller
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub pages: Vec<PageResult>,
    pub status: JobStatus,
}

impl CrawlOutcome {
    /// An outcome for a crawl that never reached its loop
    pub fn error() -> Self {
        Self {
            pages: Vec::new(),
            status: JobStatus::Error,
        }
    }
}
