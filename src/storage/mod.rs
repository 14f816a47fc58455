//! Storage module for persisting jobs
//!
//! This module handles all database operations for Trawler, including:
//! - SQLite database initialization and schema management
//! - Crawl job and analyser job persistence
//! - Scheduled job rows and their run bookkeeping

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{JobStore, StorageError, StorageResult};

use crate::crawler::PageResult;
use crate::state::JobStatus;
use crate::TrawlerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Job store shared between the crawl service, the analyser and the scheduler
pub type SharedStore = Arc<Mutex<dyn JobStore + Send>>;

/// Opens (or creates) the SQLite job store and wraps it for sharing
pub fn open_store(path: &Path) -> Result<SharedStore, TrawlerError> {
    let store = SqliteStore::new(path)?;
    Ok(Arc::new(Mutex::new(store)))
}

/// Runs `f` against the locked store
///
/// The lock is released before this returns, so callers never hold it across
/// an `.await`.
pub fn with_store<T>(
    store: &SharedStore,
    f: impl FnOnce(&mut dyn JobStore) -> StorageResult<T>,
) -> Result<T, TrawlerError> {
    let mut guard = store.lock().map_err(|_| StorageError::Poisoned)?;
    Ok(f(&mut *guard)?)
}

/// A crawl job row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlJob {
    pub id: i64,
    pub owner_id: i64,
    pub initial_url: String,
    pub max_depth: u32,
    pub page_limit: usize,
    pub status: JobStatus,
    pub pages: Vec<PageResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An analyser job row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyserJob {
    pub id: i64,
    pub owner_id: i64,
    pub crawl_job_id: i64,
    pub scheduled_job_id: Option<i64>,
    pub prompt: String,
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A recurring crawl-then-analyse schedule
///
/// `crawl_job_id` names the template crawl job whose URL, depth and limit
/// are reused on every fire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub cron_expression: String,
    pub enabled: bool,
    pub prompt: String,
    pub crawl_job_id: i64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_run_status: Option<JobStatus>,
    pub last_error: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a scheduled job
#[derive(Debug, Clone)]
pub struct NewScheduledJob {
    pub owner_id: i64,
    pub name: String,
    pub cron_expression: String,
    pub prompt: String,
    pub crawl_job_id: i64,
}

/// Partial edit of a scheduled job; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub cron_expression: Option<String>,
    pub prompt: Option<String>,
    pub enabled: Option<bool>,
}

impl ScheduleUpdate {
    /// Returns true if no field would change
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.cron_expression.is_none()
            && self.prompt.is_none()
            && self.enabled.is_none()
    }
}
