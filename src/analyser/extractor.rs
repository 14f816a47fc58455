//! Extraction backends
//!
//! An [`Extractor`] performs the two remote steps of an analysis: pick the
//! pages relevant to a prompt, then extract structured data from them.

use crate::config::AnalyserConfig;
use crate::crawler::PageResult;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Extraction backend errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Network error (connection failed, timeout)
    #[error("Extraction request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("Extraction service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not what was asked for
    #[error("Invalid extraction response: {0}")]
    Decode(String),

    /// The configured key variable is not set
    #[error("Environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("No analyser endpoint is configured")]
    NotConfigured,
}

/// A page the relevance step kept, with the content it judged relevant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantPage {
    pub url: String,
    pub content: String,
}

/// Remote analysis steps
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Selects the pages that matter for `prompt`
    async fn select_relevant(
        &self,
        prompt: &str,
        pages: &[PageResult],
    ) -> Result<Vec<RelevantPage>, ExtractError>;

    /// Extracts structured data for `prompt` from the selected pages
    async fn extract(&self, prompt: &str, pages: &[RelevantPage]) -> Result<Value, ExtractError>;
}

/// Extractor used when the config has no `[analyser]` section
///
/// Every run through it ends with status ERROR.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredExtractor;

#[async_trait]
impl Extractor for UnconfiguredExtractor {
    async fn select_relevant(
        &self,
        _prompt: &str,
        _pages: &[PageResult],
    ) -> Result<Vec<RelevantPage>, ExtractError> {
        Err(ExtractError::NotConfigured)
    }

    async fn extract(&self, _prompt: &str, _pages: &[RelevantPage]) -> Result<Value, ExtractError> {
        Err(ExtractError::NotConfigured)
    }
}

#[derive(Debug, Deserialize)]
struct RelevanceResponse {
    pages: Vec<RelevantPage>,
}

/// Extractor backed by an HTTP JSON service
///
/// `POST {endpoint}/relevance` receives `{prompt, pages: [{url, title, textContent}]}`
/// and answers `{pages: [{url, content}]}`. `POST {endpoint}/extract` receives
/// `{prompt, pages: [{url, content}]}` and answers with the extraction result.
#[derive(Clone)]
pub struct HttpExtractor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpExtractor {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    /// Builds an extractor from the `[analyser]` config section
    ///
    /// The bearer key is read from the environment variable the section names.
    pub fn from_config(config: &AnalyserConfig) -> Result<Self, ExtractError> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| ExtractError::MissingApiKey(var.clone()))?,
            ),
            None => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self::new(client, config.endpoint.as_str(), api_key))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, ExtractError> {
        let mut request = self
            .client
            .post(format!("{}/{}", self.endpoint, path))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, path, "Extraction service error");
            return Err(ExtractError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn select_relevant(
        &self,
        prompt: &str,
        pages: &[PageResult],
    ) -> Result<Vec<RelevantPage>, ExtractError> {
        let pages: Vec<Value> = pages
            .iter()
            .map(|p| json!({ "url": p.url, "title": p.title, "textContent": p.text_content }))
            .collect();

        debug!(pages = pages.len(), "Sending relevance request");
        let response = self
            .post("relevance", &json!({ "prompt": prompt, "pages": pages }))
            .await?;

        let relevance: RelevanceResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Decode(e.to_string()))?;
        Ok(relevance.pages)
    }

    async fn extract(&self, prompt: &str, pages: &[RelevantPage]) -> Result<Value, ExtractError> {
        debug!(pages = pages.len(), "Sending extraction request");
        let response = self
            .post("extract", &json!({ "prompt": prompt, "pages": pages }))
            .await?;

        let result: Value = response
            .json()
            .await
            .map_err(|e| ExtractError::Decode(e.to_string()))?;

        if result.is_null() {
            return Err(ExtractError::Decode("empty result".to_string()));
        }
        Ok(result)
    }
}
