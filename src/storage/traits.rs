//! Storage traits and error types
//!
//! This module defines the trait interface for job store backends and
//! associated error types.

use crate::crawler::PageResult;
use crate::state::{InvalidTransition, JobStatus};
use crate::storage::{AnalyserJob, CrawlJob, NewScheduledJob, ScheduleUpdate, ScheduledJob};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Job store lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for job store implementations
///
/// This trait defines every persistence operation the crawl service, the
/// analyser and the scheduler need. Rows are keyed by id and by owner id.
pub trait JobStore {
    // ===== Crawl Jobs =====

    /// Creates a crawl job with status `STARTED` and no pages
    fn create_crawl_job(
        &mut self,
        owner_id: i64,
        initial_url: &str,
        max_depth: u32,
        page_limit: usize,
    ) -> StorageResult<CrawlJob>;

    /// Writes the terminal status and final page list of a crawl job
    ///
    /// Fails with `InvalidTransition` if the job already ended.
    fn finish_crawl_job(
        &mut self,
        id: i64,
        status: JobStatus,
        pages: &[PageResult],
    ) -> StorageResult<CrawlJob>;

    /// Gets a crawl job by ID
    fn get_crawl_job(&self, id: i64) -> StorageResult<Option<CrawlJob>>;

    /// Lists an owner's crawl jobs, newest first, optionally filtered by status
    fn list_crawl_jobs(
        &self,
        owner_id: i64,
        status: Option<JobStatus>,
    ) -> StorageResult<Vec<CrawlJob>>;

    // ===== Analyser Jobs =====

    /// Creates an analyser job with status `STARTED`
    fn create_analyser_job(
        &mut self,
        owner_id: i64,
        crawl_job_id: i64,
        prompt: &str,
        scheduled_job_id: Option<i64>,
    ) -> StorageResult<AnalyserJob>;

    /// Writes the terminal status and outcome of an analyser job
    fn finish_analyser_job(
        &mut self,
        id: i64,
        status: JobStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> StorageResult<AnalyserJob>;

    /// Gets an analyser job by ID
    fn get_analyser_job(&self, id: i64) -> StorageResult<Option<AnalyserJob>>;

    /// Lists an owner's analyser jobs, newest first, optionally filtered by status
    fn list_analyser_jobs(
        &self,
        owner_id: i64,
        status: Option<JobStatus>,
    ) -> StorageResult<Vec<AnalyserJob>>;

    // ===== Scheduled Jobs =====

    /// Inserts an enabled scheduled job
    fn create_scheduled_job(&mut self, job: &NewScheduledJob) -> StorageResult<ScheduledJob>;

    /// Gets a scheduled job by ID
    fn get_scheduled_job(&self, id: i64) -> StorageResult<Option<ScheduledJob>>;

    /// Lists an owner's scheduled jobs
    fn list_scheduled_jobs(&self, owner_id: i64) -> StorageResult<Vec<ScheduledJob>>;

    /// Lists every enabled scheduled job (used at startup)
    fn list_enabled_scheduled_jobs(&self) -> StorageResult<Vec<ScheduledJob>>;

    /// Applies a partial edit; returns None if the row does not exist
    fn update_scheduled_job(
        &mut self,
        id: i64,
        update: &ScheduleUpdate,
    ) -> StorageResult<Option<ScheduledJob>>;

    /// Marks a schedule whose cron expression cannot be registered
    ///
    /// Sets `enabled = false`, `last_run_status = ERROR` and `last_run = at`.
    fn disable_invalid_schedule(&mut self, id: i64, at: DateTime<Utc>) -> StorageResult<()>;

    /// Sets (or clears) the next fire time
    fn set_next_run(&mut self, id: i64, next_run: Option<DateTime<Utc>>) -> StorageResult<()>;

    /// Records the start of a scheduled run (`last_run = at`, status `STARTED`)
    fn record_run_started(&mut self, id: i64, at: DateTime<Utc>) -> StorageResult<()>;

    /// Records the end of a scheduled run together with the recomputed next fire time
    fn record_run_finished(
        &mut self,
        id: i64,
        status: JobStatus,
        next_run: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Deletes a scheduled job; returns true if a row was removed
    fn delete_scheduled_job(&mut self, id: i64) -> StorageResult<bool>;
}
