//! Analyser jobs
//!
//! An analyser job runs a prompt against the pages of a finished crawl job.
//! [`ExtractionAnalyser`] owns the job row and its stage notifications and
//! delegates the remote work to an [`Extractor`].

mod extractor;

pub use extractor::{ExtractError, Extractor, HttpExtractor, RelevantPage, UnconfiguredExtractor};

use crate::crawler::PageResult;
use crate::notify::{EventKind, JobEvent, Notifier};
use crate::state::JobStatus;
use crate::storage::{with_store, AnalyserJob, SharedStore};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Input of one analyser run
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub owner_id: i64,
    pub crawl_job_id: i64,
    pub prompt: String,
    pub pages: Vec<PageResult>,
    /// Suppresses the per-stage notifications (scheduled runs)
    pub silent: bool,
    pub scheduled_job_id: Option<i64>,
}

/// Runs an analysis and returns the persisted job
///
/// An extraction failure is not an `Err`: it ends the job with status
/// ERROR. `Err` means the job could not be recorded at all.
#[async_trait]
pub trait Analyser: Send + Sync {
    async fn run(&self, request: AnalysisRequest) -> Result<AnalyserJob>;
}

/// Analyser that drives an [`Extractor`] and records the job lifecycle
pub struct ExtractionAnalyser {
    store: SharedStore,
    notifier: Arc<dyn Notifier>,
    extractor: Arc<dyn Extractor>,
}

impl ExtractionAnalyser {
    pub fn new(
        store: SharedStore,
        notifier: Arc<dyn Notifier>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            store,
            notifier,
            extractor,
        }
    }

    fn stage(&self, request: &AnalysisRequest, kind: EventKind, job_id: i64) {
        if !request.silent {
            self.notifier.send(request.owner_id, JobEvent::new(kind, job_id));
        }
    }

    async fn analyse(
        &self,
        request: &AnalysisRequest,
        job_id: i64,
    ) -> std::result::Result<Value, ExtractError> {
        // Failed pages carry no text
        let pages: Vec<PageResult> = request
            .pages
            .iter()
            .filter(|p| !p.is_error())
            .cloned()
            .collect();

        self.stage(request, EventKind::AnalyserJobRelevanceStarted, job_id);
        let relevant = self
            .extractor
            .select_relevant(&request.prompt, &pages)
            .await?;
        self.stage(request, EventKind::AnalyserJobRelevanceFinished, job_id);

        self.stage(request, EventKind::AnalyserJobAnalysisStarted, job_id);
        let result = self.extractor.extract(&request.prompt, &relevant).await?;
        self.stage(request, EventKind::AnalyserJobAnalysisFinished, job_id);

        Ok(result)
    }
}

#[async_trait]
impl Analyser for ExtractionAnalyser {
    async fn run(&self, request: AnalysisRequest) -> Result<AnalyserJob> {
        let job = with_store(&self.store, |s| {
            s.create_analyser_job(
                request.owner_id,
                request.crawl_job_id,
                &request.prompt,
                request.scheduled_job_id,
            )
        })?;
        info!(
            job_id = job.id,
            crawl_job_id = request.crawl_job_id,
            pages = request.pages.len(),
            "Analyser job started"
        );

        let job = match self.analyse(&request, job.id).await {
            Ok(result) => with_store(&self.store, |s| {
                s.finish_analyser_job(job.id, JobStatus::Completed, Some(&result), None)
            })?,
            Err(e) => {
                warn!(job_id = job.id, error = %e, "Analyser job failed");
                let message = e.to_string();
                with_store(&self.store, |s| {
                    s.finish_analyser_job(job.id, JobStatus::Error, None, Some(&message))
                })?
            }
        };

        info!(job_id = job.id, status = %job.status, "Analyser job finished");
        Ok(job)
    }
}
