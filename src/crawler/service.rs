//! Crawl job lifecycle: create the row, traverse, persist the outcome

use crate::crawler::{CancellationRegistry, CrawlEngine, CrawlSettings};
use crate::storage::{with_store, CrawlJob, SharedStore};
use crate::url::normalize_start_url;
use crate::{Result, TrawlerError};
use std::sync::Arc;
use tracing::info;

/// Runs crawl jobs end to end
#[derive(Clone)]
pub struct CrawlService {
    store: SharedStore,
    engine: CrawlEngine,
    cancellations: Arc<CancellationRegistry>,
}

impl CrawlService {
    pub fn new(
        store: SharedStore,
        engine: CrawlEngine,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            store,
            engine,
            cancellations,
        }
    }

    /// Creates a crawl job, runs it to a terminal status and stores the pages
    ///
    /// A malformed URL or a zero page limit is rejected before any row is
    /// written. The returned job is the persisted final state.
    pub async fn start(&self, owner_id: i64, url: &str, settings: CrawlSettings) -> Result<CrawlJob> {
        let start = normalize_start_url(url)?;
        if settings.page_limit == 0 {
            return Err(TrawlerError::InvalidInput(
                "page limit must be at least 1".to_string(),
            ));
        }

        let job = with_store(&self.store, |s| {
            s.create_crawl_job(owner_id, start.as_str(), settings.max_depth, settings.page_limit)
        })?;
        let stop = self.cancellations.register(job.id);
        info!(job_id = job.id, owner_id, url = %start, "Crawl job created");

        let outcome = self
            .engine
            .crawl(owner_id, job.id, start.as_str(), settings, stop)
            .await;

        let job = with_store(&self.store, |s| {
            s.finish_crawl_job(job.id, outcome.status, &outcome.pages)
        })?;
        Ok(job)
    }

    /// Asks a running crawl to stop; returns false if it is not running
    pub fn request_stop(&self, job_id: i64) -> bool {
        let accepted = self.cancellations.request_stop(job_id);
        if accepted {
            info!(job_id, "Stop requested");
        } else {
            info!(job_id, "Stop request ignored, job is not running");
        }
        accepted
    }

    /// The registry of running crawls
    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }
}
