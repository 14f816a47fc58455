//! Configuration module for Trawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use trawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("trawler.toml")).unwrap();
//! println!("Default crawl depth: {}", config.crawler.default_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AnalyserConfig, Config, CrawlerConfig, SchedulerConfig, StorageConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
