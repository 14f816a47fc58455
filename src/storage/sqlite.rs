//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the JobStore trait.

use crate::crawler::PageResult;
use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, StorageError, StorageResult};
use crate::storage::{AnalyserJob, CrawlJob, NewScheduledJob, ScheduleUpdate, ScheduledJob};
use crate::TrawlerError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const CRAWL_JOB_COLUMNS: &str =
    "id, owner_id, initial_url, max_depth, page_limit, status, pages, created_at, updated_at";

const ANALYSER_JOB_COLUMNS: &str = "id, owner_id, crawl_job_id, scheduled_job_id, prompt, status, \
     result, error, created_at, updated_at";

const SCHEDULED_JOB_COLUMNS: &str = "id, owner_id, name, cron_expression, enabled, prompt, \
     crawl_job_id, last_run, last_run_status, last_error, next_run, created_at, updated_at";

/// SQLite job store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(TrawlerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, TrawlerError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> Result<Self, TrawlerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn require_crawl_job(&self, id: i64) -> StorageResult<CrawlJob> {
        self.get_crawl_job(id)?.ok_or(StorageError::NotFound {
            kind: "crawl job",
            id,
        })
    }

    fn require_analyser_job(&self, id: i64) -> StorageResult<AnalyserJob> {
        self.get_analyser_job(id)?.ok_or(StorageError::NotFound {
            kind: "analyser job",
            id,
        })
    }

    fn require_scheduled_job(&self, id: i64) -> StorageResult<ScheduledJob> {
        self.get_scheduled_job(id)?.ok_or(StorageError::NotFound {
            kind: "scheduled job",
            id,
        })
    }
}

impl JobStore for SqliteStore {
    // ===== Crawl Jobs =====

    fn create_crawl_job(
        &mut self,
        owner_id: i64,
        initial_url: &str,
        max_depth: u32,
        page_limit: usize,
    ) -> StorageResult<CrawlJob> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_jobs (owner_id, initial_url, max_depth, page_limit, status, pages, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, '[]', ?6, ?6)",
            params![
                owner_id,
                initial_url,
                max_depth,
                page_limit as i64,
                JobStatus::Started.to_db_string(),
                now
            ],
        )?;

        self.require_crawl_job(self.conn.last_insert_rowid())
    }

    fn finish_crawl_job(
        &mut self,
        id: i64,
        status: JobStatus,
        pages: &[PageResult],
    ) -> StorageResult<CrawlJob> {
        let current = self.require_crawl_job(id)?;
        let status = current.status.transition(status)?;

        let pages_json = serde_json::to_string(pages)?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE crawl_jobs SET status = ?1, pages = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.to_db_string(), pages_json, now, id],
        )?;

        self.require_crawl_job(id)
    }

    fn get_crawl_job(&self, id: i64) -> StorageResult<Option<CrawlJob>> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {} FROM crawl_jobs WHERE id = ?1", CRAWL_JOB_COLUMNS),
                params![id],
                crawl_job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn list_crawl_jobs(
        &self,
        owner_id: i64,
        status: Option<JobStatus>,
    ) -> StorageResult<Vec<CrawlJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_jobs
             WHERE owner_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY id DESC",
            CRAWL_JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map(
                params![owner_id, status.map(|s| s.to_db_string())],
                crawl_job_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    // ===== Analyser Jobs =====

    fn create_analyser_job(
        &mut self,
        owner_id: i64,
        crawl_job_id: i64,
        prompt: &str,
        scheduled_job_id: Option<i64>,
    ) -> StorageResult<AnalyserJob> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO analyser_jobs (owner_id, crawl_job_id, scheduled_job_id, prompt, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                owner_id,
                crawl_job_id,
                scheduled_job_id,
                prompt,
                JobStatus::Started.to_db_string(),
                now
            ],
        )?;

        self.require_analyser_job(self.conn.last_insert_rowid())
    }

    fn finish_analyser_job(
        &mut self,
        id: i64,
        status: JobStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> StorageResult<AnalyserJob> {
        let current = self.require_analyser_job(id)?;
        let status = current.status.transition(status)?;

        let result_json = result.map(serde_json::to_string).transpose()?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE analyser_jobs SET status = ?1, result = ?2, error = ?3, updated_at = ?4 WHERE id = ?5",
            params![status.to_db_string(), result_json, error, now, id],
        )?;

        self.require_analyser_job(id)
    }

    fn get_analyser_job(&self, id: i64) -> StorageResult<Option<AnalyserJob>> {
        let job = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM analyser_jobs WHERE id = ?1",
                    ANALYSER_JOB_COLUMNS
                ),
                params![id],
                analyser_job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn list_analyser_jobs(
        &self,
        owner_id: i64,
        status: Option<JobStatus>,
    ) -> StorageResult<Vec<AnalyserJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM analyser_jobs
             WHERE owner_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY id DESC",
            ANALYSER_JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map(
                params![owner_id, status.map(|s| s.to_db_string())],
                analyser_job_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    // ===== Scheduled Jobs =====

    fn create_scheduled_job(&mut self, job: &NewScheduledJob) -> StorageResult<ScheduledJob> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO scheduled_jobs (owner_id, name, cron_expression, enabled, prompt, crawl_job_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?6)",
            params![
                job.owner_id,
                job.name,
                job.cron_expression,
                job.prompt,
                job.crawl_job_id,
                now
            ],
        )?;

        self.require_scheduled_job(self.conn.last_insert_rowid())
    }

    fn get_scheduled_job(&self, id: i64) -> StorageResult<Option<ScheduledJob>> {
        let job = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM scheduled_jobs WHERE id = ?1",
                    SCHEDULED_JOB_COLUMNS
                ),
                params![id],
                scheduled_job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn list_scheduled_jobs(&self, owner_id: i64) -> StorageResult<Vec<ScheduledJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM scheduled_jobs WHERE owner_id = ?1 ORDER BY id DESC",
            SCHEDULED_JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map(params![owner_id], scheduled_job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn list_enabled_scheduled_jobs(&self) -> StorageResult<Vec<ScheduledJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM scheduled_jobs WHERE enabled = 1 ORDER BY id",
            SCHEDULED_JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map([], scheduled_job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn update_scheduled_job(
        &mut self,
        id: i64,
        update: &ScheduleUpdate,
    ) -> StorageResult<Option<ScheduledJob>> {
        let Some(mut job) = self.get_scheduled_job(id)? else {
            return Ok(None);
        };

        if let Some(name) = &update.name {
            job.name = name.clone();
        }
        if let Some(cron_expression) = &update.cron_expression {
            job.cron_expression = cron_expression.clone();
        }
        if let Some(prompt) = &update.prompt {
            job.prompt = prompt.clone();
        }
        if let Some(enabled) = update.enabled {
            job.enabled = enabled;
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE scheduled_jobs SET name = ?1, cron_expression = ?2, prompt = ?3, enabled = ?4, updated_at = ?5
             WHERE id = ?6",
            params![job.name, job.cron_expression, job.prompt, job.enabled, now, id],
        )?;

        self.get_scheduled_job(id)
    }

    fn disable_invalid_schedule(&mut self, id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE scheduled_jobs SET enabled = 0, last_run_status = ?1, last_run = ?2, updated_at = ?2
             WHERE id = ?3",
            params![JobStatus::Error.to_db_string(), at.to_rfc3339(), id],
        )?;

        if updated == 0 {
            return Err(StorageError::NotFound {
                kind: "scheduled job",
                id,
            });
        }
        Ok(())
    }

    fn set_next_run(&mut self, id: i64, next_run: Option<DateTime<Utc>>) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE scheduled_jobs SET next_run = ?1 WHERE id = ?2",
            params![next_run.map(|t| t.to_rfc3339()), id],
        )?;
        Ok(())
    }

    fn record_run_started(&mut self, id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE scheduled_jobs SET last_run = ?1, last_run_status = ?2 WHERE id = ?3",
            params![at.to_rfc3339(), JobStatus::Started.to_db_string(), id],
        )?;
        Ok(())
    }

    fn record_run_finished(
        &mut self,
        id: i64,
        status: JobStatus,
        next_run: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE scheduled_jobs SET last_run_status = ?1, next_run = ?2, last_error = ?3 WHERE id = ?4",
            params![
                status.to_db_string(),
                next_run.map(|t| t.to_rfc3339()),
                error,
                id
            ],
        )?;
        Ok(())
    }

    fn delete_scheduled_job(&mut self, id: i64) -> StorageResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM scheduled_jobs WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

// ===== Row Mapping =====

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn status(row: &Row<'_>, idx: usize) -> rusqlite::Result<JobStatus> {
    let raw: String = row.get(idx)?;
    JobStatus::from_db_string(&raw)
        .ok_or_else(|| conversion_error(idx, StorageError::Corrupt(format!("status '{}'", raw))))
}

fn optional_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<JobStatus>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        JobStatus::from_db_string(&s)
            .ok_or_else(|| conversion_error(idx, StorageError::Corrupt(format!("status '{}'", s))))
    })
    .transpose()
}

fn crawl_job_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlJob> {
    let pages_json: String = row.get(6)?;
    let pages: Vec<PageResult> =
        serde_json::from_str(&pages_json).map_err(|e| conversion_error(6, e))?;
    let page_limit: i64 = row.get(4)?;

    Ok(CrawlJob {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        initial_url: row.get(2)?,
        max_depth: row.get(3)?,
        page_limit: page_limit.max(0) as usize,
        status: status(row, 5)?,
        pages,
        created_at: timestamp(row, 7)?,
        updated_at: timestamp(row, 8)?,
    })
}

fn analyser_job_from_row(row: &Row<'_>) -> rusqlite::Result<AnalyserJob> {
    let result_json: Option<String> = row.get(6)?;
    let result = result_json
        .map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(6, e)))
        .transpose()?;

    Ok(AnalyserJob {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        crawl_job_id: row.get(2)?,
        scheduled_job_id: row.get(3)?,
        prompt: row.get(4)?,
        status: status(row, 5)?,
        result,
        error: row.get(7)?,
        created_at: timestamp(row, 8)?,
        updated_at: timestamp(row, 9)?,
    })
}

fn scheduled_job_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledJob> {
    Ok(ScheduledJob {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        cron_expression: row.get(3)?,
        enabled: row.get(4)?,
        prompt: row.get(5)?,
        crawl_job_id: row.get(6)?,
        last_run: optional_timestamp(row, 7)?,
        last_run_status: optional_status(row, 8)?,
        last_error: row.get(9)?,
        next_run: optional_timestamp(row, 10)?,
        created_at: timestamp(row, 11)?,
        updated_at: timestamp(row, 12)?,
    })
}
