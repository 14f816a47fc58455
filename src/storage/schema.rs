//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Trawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl jobs and their final page lists (JSON array)
CREATE TABLE IF NOT EXISTS crawl_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    initial_url TEXT NOT NULL,
    max_depth INTEGER NOT NULL,
    page_limit INTEGER NOT NULL,
    status TEXT NOT NULL,
    pages TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_jobs_owner ON crawl_jobs(owner_id);
CREATE INDEX IF NOT EXISTS idx_crawl_jobs_status ON crawl_jobs(status);

-- Scheduled crawl-then-analyse jobs
CREATE TABLE IF NOT EXISTS scheduled_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    cron_expression TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    prompt TEXT NOT NULL,
    crawl_job_id INTEGER NOT NULL REFERENCES crawl_jobs(id),
    last_run TEXT,
    last_run_status TEXT,
    last_error TEXT,
    next_run TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_owner ON scheduled_jobs(owner_id);
CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_enabled ON scheduled_jobs(enabled);

-- Analyser jobs run against a crawl job
CREATE TABLE IF NOT EXISTS analyser_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    crawl_job_id INTEGER NOT NULL REFERENCES crawl_jobs(id),
    scheduled_job_id INTEGER REFERENCES scheduled_jobs(id) ON DELETE SET NULL,
    prompt TEXT NOT NULL,
    status TEXT NOT NULL,
    result TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analyser_jobs_owner ON analyser_jobs(owner_id);
CREATE INDEX IF NOT EXISTS idx_analyser_jobs_crawl ON analyser_jobs(crawl_job_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
