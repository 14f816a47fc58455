//! Public job surface
//!
//! [`Orchestrator`] wires the job store, the crawl service, the analyser and
//! the trigger registry together and validates caller input before any of
//! them is touched.

use crate::analyser::{Analyser, ExtractionAnalyser, Extractor, HttpExtractor, UnconfiguredExtractor};
use crate::config::Config;
use crate::crawler::{
    CancellationRegistry, CrawlEngine, CrawlService, CrawlSettings, HttpFetcher, PageFetcher,
};
use crate::notify::Notifier;
use crate::scheduler::{CronSchedule, ExecutionChain, TriggerRegistry};
use crate::storage::{
    open_store, with_store, CrawlJob, NewScheduledJob, ScheduleUpdate, ScheduledJob, SharedStore,
};
use crate::{Result, TrawlerError};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Entry point for crawl jobs and schedules
pub struct Orchestrator {
    store: SharedStore,
    crawler: CrawlService,
    registry: Arc<TriggerRegistry>,
    defaults: CrawlSettings,
}

impl Orchestrator {
    /// Assembles an orchestrator from its parts
    pub fn new(
        store: SharedStore,
        crawler: CrawlService,
        analyser: Arc<dyn Analyser>,
        defaults: CrawlSettings,
        allow_overlap: bool,
    ) -> Self {
        let chain = Arc::new(ExecutionChain::new(store.clone(), crawler.clone(), analyser));
        let registry = Arc::new(TriggerRegistry::new(store.clone(), chain, allow_overlap));

        Self {
            store,
            crawler,
            registry,
            defaults,
        }
    }

    /// Builds the HTTP-backed stack described by `config`
    ///
    /// Without an `[analyser]` section every analysis ends with ERROR.
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let store = open_store(Path::new(&config.storage.database_path))?;

        let fetcher: Arc<dyn PageFetcher> =
            Arc::new(HttpFetcher::new(&config.user_agent, &config.crawler)?);
        let engine = CrawlEngine::new(fetcher, notifier.clone());
        let crawler = CrawlService::new(
            store.clone(),
            engine,
            Arc::new(CancellationRegistry::new()),
        );

        let extractor: Arc<dyn Extractor> = match &config.analyser {
            Some(analyser) => Arc::new(
                HttpExtractor::from_config(analyser)
                    .map_err(|e| TrawlerError::Analyser(e.to_string()))?,
            ),
            None => Arc::new(UnconfiguredExtractor),
        };
        let analyser = Arc::new(ExtractionAnalyser::new(store.clone(), notifier, extractor));

        let defaults = CrawlSettings {
            max_depth: config.crawler.default_depth,
            page_limit: config.crawler.default_limit,
        };

        Ok(Self::new(
            store,
            crawler,
            analyser,
            defaults,
            config.scheduler.allow_overlap,
        ))
    }

    /// Registers every enabled schedule
    pub fn initialize(&self) -> Result<usize> {
        self.registry.initialize()
    }

    /// Stops every schedule timer
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    // ===== Crawl Jobs =====

    /// Runs a crawl job to completion and returns its final state
    ///
    /// `depth` and `limit` fall back to the configured defaults.
    pub async fn start_crawl(
        &self,
        owner_id: i64,
        url: &str,
        depth: Option<u32>,
        limit: Option<usize>,
    ) -> Result<CrawlJob> {
        let settings = CrawlSettings {
            max_depth: depth.unwrap_or(self.defaults.max_depth),
            page_limit: limit.unwrap_or(self.defaults.page_limit),
        };
        self.crawler.start(owner_id, url, settings).await
    }

    /// Asks a running crawl job to stop
    ///
    /// Returns false, and does nothing, if the job is not running.
    pub fn request_stop(&self, crawl_job_id: i64) -> bool {
        self.crawler.request_stop(crawl_job_id)
    }

    /// Ids of crawl jobs currently running in this process
    pub fn running_crawls(&self) -> Vec<i64> {
        self.crawler.cancellations().active_jobs()
    }

    // ===== Schedules =====

    /// Creates and registers a schedule
    ///
    /// The template crawl job must exist and belong to `owner_id`.
    pub fn create_schedule(
        &self,
        owner_id: i64,
        name: &str,
        cron_expression: &str,
        prompt: &str,
        template_crawl_job_id: i64,
    ) -> Result<ScheduledJob> {
        let name = require_text("name", name)?;
        let prompt = require_text("prompt", prompt)?;
        let cron = CronSchedule::parse(cron_expression)?;

        let template = with_store(&self.store, |s| s.get_crawl_job(template_crawl_job_id))?;
        if template.map(|t| t.owner_id) != Some(owner_id) {
            return Err(TrawlerError::NotFound {
                kind: "crawl job",
                id: template_crawl_job_id,
            });
        }

        let job = with_store(&self.store, |s| {
            s.create_scheduled_job(&NewScheduledJob {
                owner_id,
                name,
                cron_expression: cron.expression().to_string(),
                prompt,
                crawl_job_id: template_crawl_job_id,
            })
        })?;
        self.registry.register(&job)?;
        info!(schedule_id = job.id, owner_id, "Schedule created");

        self.reload_schedule(job.id)
    }

    /// Applies an edit and re-registers the schedule
    pub fn update_schedule(&self, id: i64, update: ScheduleUpdate) -> Result<ScheduledJob> {
        let mut update = update;
        if let Some(name) = &update.name {
            update.name = Some(require_text("name", name)?);
        }
        if let Some(prompt) = &update.prompt {
            update.prompt = Some(require_text("prompt", prompt)?);
        }
        if let Some(expression) = &update.cron_expression {
            update.cron_expression = Some(CronSchedule::parse(expression)?.expression().to_string());
        }

        let updated = with_store(&self.store, |s| s.update_scheduled_job(id, &update))?;
        if updated.is_none() {
            return Err(TrawlerError::NotFound {
                kind: "scheduled job",
                id,
            });
        }

        self.registry.update(id)?;
        info!(schedule_id = id, "Schedule updated");

        self.reload_schedule(id)
    }

    /// Unregisters and deletes a schedule
    pub fn delete_schedule(&self, id: i64) -> Result<()> {
        if !self.registry.delete(id)? {
            return Err(TrawlerError::NotFound {
                kind: "scheduled job",
                id,
            });
        }
        info!(schedule_id = id, "Schedule deleted");
        Ok(())
    }

    fn reload_schedule(&self, id: i64) -> Result<ScheduledJob> {
        with_store(&self.store, |s| s.get_scheduled_job(id))?.ok_or(TrawlerError::NotFound {
            kind: "scheduled job",
            id,
        })
    }

    // ===== Accessors =====

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<TriggerRegistry> {
        &self.registry
    }

    pub fn crawler(&self) -> &CrawlService {
        &self.crawler
    }

    pub fn defaults(&self) -> CrawlSettings {
        self.defaults
    }
}

fn require_text(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TrawlerError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}
