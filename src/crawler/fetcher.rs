//! HTTP fetcher implementation
//!
//! This module handles all page requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Skipping resources the [`ResourceFilter`] blocks
//! - Per-request timeouts
//! - Error classification into page-level failures

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::{ResourceFilter, ResourceKind};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Why a single page could not be loaded
///
/// The `Display` text is stored as the page's error message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Skipped {0} resource")]
    Blocked(ResourceKind),

    #[error("Failed to read body: {0}")]
    Body(String),

    #[error("Fetcher unavailable: {0}")]
    Unavailable(String),
}

/// A page body ready for parsing
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub body: String,
}

/// Loads pages for the crawl engine
///
/// The engine calls `prepare` once before its loop and `fetch` once per page,
/// never concurrently for the same traversal.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Acquires whatever the fetcher needs before the first page
    async fn prepare(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Loads one page
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `crawler` - Timeouts for every request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        user_agent.crawler_name,
        user_agent.crawler_version,
        user_agent.contact_url,
        user_agent.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(crawler.page_timeout_secs))
        .connect_timeout(Duration::from_secs(crawler.connect_timeout_secs))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Plain HTTP page fetcher
pub struct HttpFetcher {
    client: Client,
    filter: ResourceFilter,
    timeout_secs: u64,
}

impl HttpFetcher {
    /// Creates a fetcher from the crawler and user agent sections of the config
    pub fn new(user_agent: &UserAgentConfig, crawler: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, crawler)?,
            filter: ResourceFilter::new(crawler.blocked_resources.iter().copied()),
            timeout_secs: crawler.page_timeout_secs,
        })
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client, filter: ResourceFilter, timeout_secs: u64) -> Self {
        Self {
            client,
            filter,
            timeout_secs,
        }
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout_secs)
        } else if err.is_connect() {
            FetchError::Network(format!("connection failed: {}", err))
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        if let Some(kind) = self.filter.blocks_url(url) {
            return Err(FetchError::Blocked(kind));
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if let Some(kind) = self.filter.blocks_content_type(&content_type) {
            return Err(FetchError::Blocked(kind));
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout_secs)
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        Ok(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            body,
        })
    }
}
