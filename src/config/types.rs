use crate::crawler::ResourceKind;
use serde::Deserialize;

/// Main configuration structure for Trawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub analyser: Option<AnalyserConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Depth used when a crawl request does not name one
    #[serde(rename = "default-depth", default = "default_depth")]
    pub default_depth: u32,

    /// Page limit used when a crawl request does not name one
    #[serde(rename = "default-limit", default = "default_limit")]
    pub default_limit: usize,

    /// Timeout applied to every single page fetch (seconds)
    #[serde(rename = "page-timeout-secs", default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    /// Connect timeout for page fetches (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Resource kinds that are never downloaded
    #[serde(rename = "blocked-resources", default = "default_blocked_resources")]
    pub blocked_resources: Vec<ResourceKind>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
            default_limit: default_limit(),
            page_timeout_secs: default_page_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            blocked_resources: default_blocked_resources(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Job store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Trigger registry configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerConfig {
    /// Let a schedule fire again while its previous chain is still running
    #[serde(rename = "allow-overlap", default)]
    pub allow_overlap: bool,
}

/// Remote extraction service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyserConfig {
    /// Base URL of the extraction service
    pub endpoint: String,

    /// Environment variable holding the bearer key, if any
    #[serde(rename = "api-key-env", default)]
    pub api_key_env: Option<String>,

    /// Request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_analyser_timeout")]
    pub timeout_secs: u64,
}

fn default_depth() -> u32 {
    3
}

fn default_limit() -> usize {
    15
}

fn default_page_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_analyser_timeout() -> u64 {
    120
}

fn default_blocked_resources() -> Vec<ResourceKind> {
    vec![ResourceKind::Image, ResourceKind::Stylesheet, ResourceKind::Font]
}
