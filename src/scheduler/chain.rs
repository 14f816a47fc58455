//! Crawl-then-analyse run for one schedule fire
//!
//! Whatever happens inside a run, the schedule row ends with a final
//! `last_run_status` and a freshly computed `next_run`.

use crate::analyser::{AnalysisRequest, Analyser};
use crate::crawler::{CrawlService, CrawlSettings};
use crate::scheduler::CronSchedule;
use crate::state::JobStatus;
use crate::storage::{with_store, ScheduledJob, SharedStore};
use crate::Result;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Longest error message persisted on a schedule
pub const MAX_ERROR_LEN: usize = 1000;

/// Result of one fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// The schedule is missing or disabled; nothing ran
    Inactive,
    Completed {
        crawl_job_id: i64,
        analyser_job_id: i64,
    },
    Failed(ChainFailure),
}

/// A stage of a scheduled run did not complete
///
/// Jobs created before the failure are kept; their ids are recorded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFailure {
    pub message: String,
    pub crawl_job_id: Option<i64>,
    pub analyser_job_id: Option<i64>,
}

impl ChainFailure {
    /// Message plus the partial job ids, as stored in `last_error`
    pub fn describe(&self) -> String {
        let mut ids = Vec::new();
        if let Some(id) = self.crawl_job_id {
            ids.push(format!("crawl job {}", id));
        }
        if let Some(id) = self.analyser_job_id {
            ids.push(format!("analyser job {}", id));
        }

        if ids.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, ids.join(", "))
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StageIds {
    crawl: Option<i64>,
    analyser: Option<i64>,
}

/// Runs the stages of a scheduled job
pub struct ExecutionChain {
    store: SharedStore,
    crawler: CrawlService,
    analyser: Arc<dyn Analyser>,
}

impl ExecutionChain {
    pub fn new(store: SharedStore, crawler: CrawlService, analyser: Arc<dyn Analyser>) -> Self {
        Self {
            store,
            crawler,
            analyser,
        }
    }

    /// Executes one fire of `schedule_id`
    ///
    /// `Err` is only returned when the schedule row itself cannot be read or
    /// written. A failing stage yields [`ChainOutcome::Failed`].
    pub async fn run(&self, schedule_id: i64) -> Result<ChainOutcome> {
        let schedule = with_store(&self.store, |s| s.get_scheduled_job(schedule_id))?;
        let Some(schedule) = schedule.filter(|s| s.enabled) else {
            info!(schedule_id, "Schedule is missing or disabled, skipping run");
            return Ok(ChainOutcome::Inactive);
        };

        info!(schedule_id, name = %schedule.name, "Scheduled run started");
        with_store(&self.store, |s| s.record_run_started(schedule_id, Utc::now()))?;

        let ids = Arc::new(Mutex::new(StageIds::default()));
        // Stages run in their own task so a panic still reaches the bookkeeping below
        let stages = tokio::spawn(run_stages(
            self.store.clone(),
            self.crawler.clone(),
            Arc::clone(&self.analyser),
            schedule.clone(),
            Arc::clone(&ids),
        ));

        let result = match stages.await {
            Ok(result) => result,
            Err(e) => Err(format!("Scheduled run aborted: {}", e)),
        };
        let ids = *ids.lock().unwrap_or_else(|e| e.into_inner());

        let outcome = match result {
            Ok((crawl_job_id, analyser_job_id)) => {
                info!(schedule_id, crawl_job_id, analyser_job_id, "Scheduled run completed");
                ChainOutcome::Completed {
                    crawl_job_id,
                    analyser_job_id,
                }
            }
            Err(message) => {
                let failure = ChainFailure {
                    message: truncate(&message, MAX_ERROR_LEN),
                    crawl_job_id: ids.crawl,
                    analyser_job_id: ids.analyser,
                };
                error!(schedule_id, error = %failure.describe(), "Scheduled run failed");
                ChainOutcome::Failed(failure)
            }
        };

        let (status, last_error) = match &outcome {
            ChainOutcome::Failed(failure) => (
                JobStatus::Error,
                Some(truncate(&failure.describe(), MAX_ERROR_LEN)),
            ),
            _ => (JobStatus::Completed, None),
        };
        let next_run = CronSchedule::parse(&schedule.cron_expression)
            .ok()
            .and_then(|cron| cron.next());

        with_store(&self.store, |s| {
            s.record_run_finished(schedule_id, status, next_run, last_error.as_deref())
        })?;

        Ok(outcome)
    }
}

async fn run_stages(
    store: SharedStore,
    crawler: CrawlService,
    analyser: Arc<dyn Analyser>,
    schedule: ScheduledJob,
    ids: Arc<Mutex<StageIds>>,
) -> std::result::Result<(i64, i64), String> {
    let template = with_store(&store, |s| s.get_crawl_job(schedule.crawl_job_id))
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Template crawl job {} not found", schedule.crawl_job_id))?;

    let settings = CrawlSettings {
        max_depth: template.max_depth,
        page_limit: template.page_limit,
    };
    let crawl_job = crawler
        .start(schedule.owner_id, &template.initial_url, settings)
        .await
        .map_err(|e| format!("Crawl failed to start: {}", e))?;
    record(&ids, |ids| ids.crawl = Some(crawl_job.id));

    if crawl_job.status != JobStatus::Completed {
        return Err(format!(
            "Crawl did not complete successfully. Final status: {}.",
            crawl_job.status
        ));
    }

    let analyser_job = analyser
        .run(AnalysisRequest {
            owner_id: schedule.owner_id,
            crawl_job_id: crawl_job.id,
            prompt: schedule.prompt.clone(),
            pages: crawl_job.pages,
            silent: true,
            scheduled_job_id: Some(schedule.id),
        })
        .await
        .map_err(|e| format!("Analysis failed to start: {}", e))?;
    record(&ids, |ids| ids.analyser = Some(analyser_job.id));

    if analyser_job.status != JobStatus::Completed {
        let detail = analyser_job
            .error
            .map(|e| format!(": {}", e))
            .unwrap_or_default();
        return Err(format!(
            "Analysis did not complete successfully. Status: {}{}",
            analyser_job.status, detail
        ));
    }

    Ok((crawl_job.id, analyser_job.id))
}

fn record(ids: &Mutex<StageIds>, f: impl FnOnce(&mut StageIds)) {
    f(&mut ids.lock().unwrap_or_else(|e| e.into_inner()));
}

/// Cuts `message` to at most `max` characters
fn truncate(message: &str, max: usize) -> String {
    message.chars().take(max).collect()
}
