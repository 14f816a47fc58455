//! Integration tests for schedules and the crawl-then-analyse chain
//!
//! The crawled site and the extraction service are both wiremock servers.

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trawler::analyser::{ExtractionAnalyser, Extractor, HttpExtractor, UnconfiguredExtractor};
use trawler::config::{CrawlerConfig, UserAgentConfig};
use trawler::crawler::{CancellationRegistry, CrawlEngine, CrawlService, CrawlSettings, HttpFetcher};
use trawler::notify::{Notifier, TracingNotifier};
use trawler::scheduler::{ChainOutcome, Registration};
use trawler::storage::{with_store, NewScheduledJob, ScheduleUpdate, SharedStore, SqliteStore};
use trawler::{JobStatus, Orchestrator, TrawlerError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

/// Builds an orchestrator over an in-memory store
///
/// Without an extractor URI every analysis ends with ERROR.
fn create_orchestrator(extractor_uri: Option<String>) -> Orchestrator {
    create_orchestrator_with_overlap(extractor_uri, false)
}

fn create_orchestrator_with_overlap(
    extractor_uri: Option<String>,
    allow_overlap: bool,
) -> Orchestrator {
    let store: SharedStore = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);

    let fetcher = HttpFetcher::new(&test_user_agent(), &CrawlerConfig::default()).unwrap();
    let engine = CrawlEngine::new(Arc::new(fetcher), notifier.clone());
    let crawler = CrawlService::new(
        store.clone(),
        engine,
        Arc::new(CancellationRegistry::new()),
    );

    let extractor: Arc<dyn Extractor> = match extractor_uri {
        Some(uri) => Arc::new(HttpExtractor::new(reqwest::Client::new(), uri, None)),
        None => Arc::new(UnconfiguredExtractor),
    };
    let analyser = Arc::new(ExtractionAnalyser::new(store.clone(), notifier, extractor));

    let defaults = CrawlSettings {
        max_depth: 1,
        page_limit: 5,
    };
    Orchestrator::new(store, crawler, analyser, defaults, allow_overlap)
}

async fn mount_site(server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(
                    r#"<html><head><title>Shop</title></head><body>
                    <p>Prices inside</p><a href="/prices">Prices</a>
                    </body></html>"#,
                    "text/html",
                )
                .set_delay(delay),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><head><title>Prices</title></head><body>Widget: 10 EUR</body></html>",
            "text/html",
        ))
        .mount(server)
        .await;
}

/// Runs a template crawl and returns its id
async fn template_crawl(orchestrator: &Orchestrator, owner_id: i64, site: &MockServer) -> i64 {
    let job = orchestrator
        .start_crawl(owner_id, &site.uri(), None, None)
        .await
        .expect("Template crawl should run");
    assert_eq!(job.status, JobStatus::Completed);
    job.id
}

#[tokio::test]
async fn test_scheduled_run_completes_chain() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let extractor = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/relevance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pages": [{ "url": format!("{}/prices", site.uri()), "content": "Widget: 10 EUR" }]
        })))
        .expect(1)
        .mount(&extractor)
        .await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "widget": { "price": 10 } })),
        )
        .expect(1)
        .mount(&extractor)
        .await;

    let orchestrator = create_orchestrator(Some(extractor.uri()));
    let template_id = template_crawl(&orchestrator, 1, &site).await;

    let schedule = orchestrator
        .create_schedule(1, "Nightly prices", "0 3 * * *", "Find prices", template_id)
        .unwrap();
    assert!(schedule.enabled);
    assert!(schedule.next_run.is_some());
    assert!(orchestrator.registry().is_registered(schedule.id));

    let outcome = orchestrator
        .registry()
        .fire(schedule.id)
        .expect("Fire should not be skipped")
        .await
        .unwrap()
        .unwrap();

    let ChainOutcome::Completed {
        crawl_job_id,
        analyser_job_id,
    } = outcome
    else {
        panic!("Expected a completed chain");
    };
    assert_ne!(crawl_job_id, template_id, "each run creates a new crawl job");

    let store = orchestrator.store();
    let crawl = with_store(store, |s| s.get_crawl_job(crawl_job_id)).unwrap().unwrap();
    assert_eq!(crawl.status, JobStatus::Completed);
    assert_eq!(crawl.pages.len(), 2);

    let analysis = with_store(store, |s| s.get_analyser_job(analyser_job_id))
        .unwrap()
        .unwrap();
    assert_eq!(analysis.status, JobStatus::Completed);
    assert_eq!(analysis.crawl_job_id, crawl_job_id);
    assert_eq!(analysis.scheduled_job_id, Some(schedule.id));
    assert_eq!(analysis.result, Some(json!({ "widget": { "price": 10 } })));

    let schedule = with_store(store, |s| s.get_scheduled_job(schedule.id))
        .unwrap()
        .unwrap();
    assert_eq!(schedule.last_run_status, Some(JobStatus::Completed));
    assert!(schedule.last_run.is_some());
    assert!(schedule.last_error.is_none());
    assert!(schedule.next_run.unwrap() > chrono::Utc::now());
}

#[tokio::test]
async fn test_stopped_crawl_fails_chain_without_analysis() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::from_millis(300)).await;

    let extractor = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pages": [] })))
        .expect(0)
        .mount(&extractor)
        .await;

    let orchestrator = create_orchestrator(Some(extractor.uri()));
    let template_id = template_crawl(&orchestrator, 1, &site).await;
    let schedule = orchestrator
        .create_schedule(1, "Stopped", "*/5 * * * *", "Find prices", template_id)
        .unwrap();

    let handle = orchestrator.registry().fire(schedule.id).unwrap();

    let mut stopped = false;
    for _ in 0..100 {
        if let Some(job_id) = orchestrator.running_crawls().first().copied() {
            stopped = orchestrator.request_stop(job_id);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(stopped, "Scheduled crawl should have been running");

    let outcome = handle.await.unwrap().unwrap();
    let ChainOutcome::Failed(failure) = outcome else {
        panic!("Expected a failed chain");
    };
    assert_eq!(
        failure.message,
        "Crawl did not complete successfully. Final status: STOPPED."
    );
    let crawl_job_id = failure.crawl_job_id.expect("Crawl job id should be kept");
    assert!(failure.analyser_job_id.is_none());

    let store = orchestrator.store();
    let crawl = with_store(store, |s| s.get_crawl_job(crawl_job_id)).unwrap().unwrap();
    assert_eq!(crawl.status, JobStatus::Stopped);

    let analyses = with_store(store, |s| s.list_analyser_jobs(1, None)).unwrap();
    assert!(analyses.is_empty(), "analysis must not start after a stopped crawl");

    let schedule = with_store(store, |s| s.get_scheduled_job(schedule.id))
        .unwrap()
        .unwrap();
    assert_eq!(schedule.last_run_status, Some(JobStatus::Error));
    assert!(schedule.enabled);
    assert!(schedule.next_run.is_some());
    let last_error = schedule.last_error.unwrap();
    assert!(last_error.contains("Final status: STOPPED"));
    assert!(last_error.contains(&format!("crawl job {}", crawl_job_id)));
}

#[tokio::test]
async fn test_extraction_failure_is_recorded_on_schedule() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;
    let schedule = orchestrator
        .create_schedule(1, "No backend", "0 * * * *", "Find prices", template_id)
        .unwrap();

    let outcome = orchestrator
        .registry()
        .fire(schedule.id)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    let ChainOutcome::Failed(failure) = outcome else {
        panic!("Expected a failed chain");
    };
    assert!(failure.crawl_job_id.is_some());
    let analyser_job_id = failure.analyser_job_id.expect("Analyser job id should be kept");

    let analysis = with_store(orchestrator.store(), |s| s.get_analyser_job(analyser_job_id))
        .unwrap()
        .unwrap();
    assert_eq!(analysis.status, JobStatus::Error);
    assert!(analysis.error.is_some());

    let schedule = with_store(orchestrator.store(), |s| s.get_scheduled_job(schedule.id))
        .unwrap()
        .unwrap();
    assert_eq!(schedule.last_run_status, Some(JobStatus::Error));
    assert!(schedule.last_error.unwrap().len() <= 1000);
}

#[tokio::test]
async fn test_invalid_cron_is_rejected_on_create() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;

    for expression in ["not a cron", "* * * *", "0 0 * * * *", "61 * * * *"] {
        let result = orchestrator.create_schedule(1, "Bad", expression, "prompt", template_id);
        assert!(
            matches!(result, Err(TrawlerError::InvalidCron { .. })),
            "{} should be rejected",
            expression
        );
    }

    let schedules = with_store(orchestrator.store(), |s| s.list_scheduled_jobs(1)).unwrap();
    assert!(schedules.is_empty());
}

#[tokio::test]
async fn test_stored_invalid_cron_disables_schedule() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;

    // Written straight to the store, bypassing validation
    let job = with_store(orchestrator.store(), |s| {
        s.create_scheduled_job(&NewScheduledJob {
            owner_id: 1,
            name: "Legacy".to_string(),
            cron_expression: "every tuesday".to_string(),
            prompt: "prompt".to_string(),
            crawl_job_id: template_id,
        })
    })
    .unwrap();

    let registration = orchestrator.registry().register(&job).unwrap();
    assert_eq!(registration, Registration::InvalidCron);
    assert!(!orchestrator.registry().is_registered(job.id));

    let job = with_store(orchestrator.store(), |s| s.get_scheduled_job(job.id))
        .unwrap()
        .unwrap();
    assert!(!job.enabled);
    assert_eq!(job.last_run_status, Some(JobStatus::Error));

    // Startup skips it from now on
    assert_eq!(orchestrator.initialize().unwrap(), 0);
}

#[tokio::test]
async fn test_disable_and_enable_schedule() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;
    let schedule = orchestrator
        .create_schedule(1, "Toggle", "30 6 * * 1-5", "prompt", template_id)
        .unwrap();
    assert!(orchestrator.registry().is_registered(schedule.id));

    let disabled = orchestrator
        .update_schedule(
            schedule.id,
            ScheduleUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!disabled.enabled);
    assert!(!orchestrator.registry().is_registered(schedule.id));

    // Re-reading a disabled schedule only unregisters
    assert_eq!(orchestrator.registry().update(schedule.id).unwrap(), None);
    assert!(!orchestrator.registry().is_registered(schedule.id));

    let enabled = orchestrator
        .update_schedule(
            schedule.id,
            ScheduleUpdate {
                enabled: Some(true),
                cron_expression: Some("0 12 * * 0".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(enabled.enabled);
    assert_eq!(enabled.cron_expression, "0 12 * * 0");
    assert!(enabled.next_run.is_some());
    assert!(orchestrator.registry().is_registered(schedule.id));

    // A rejected edit leaves the schedule untouched
    let result = orchestrator.update_schedule(
        schedule.id,
        ScheduleUpdate {
            cron_expression: Some("bogus".to_string()),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(TrawlerError::InvalidCron { .. })));
    assert!(orchestrator.registry().is_registered(schedule.id));
}

#[tokio::test]
async fn test_fire_of_disabled_schedule_is_inactive() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;
    let schedule = orchestrator
        .create_schedule(1, "Raced", "0 0 * * *", "prompt", template_id)
        .unwrap();

    // Disabled behind the registry's back, as if by a concurrent edit
    with_store(orchestrator.store(), |s| {
        s.update_scheduled_job(
            schedule.id,
            &ScheduleUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
    })
    .unwrap();

    let outcome = orchestrator
        .registry()
        .fire(schedule.id)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ChainOutcome::Inactive);
    assert!(!orchestrator.registry().is_registered(schedule.id));

    let crawls = with_store(orchestrator.store(), |s| s.list_crawl_jobs(1, None)).unwrap();
    assert_eq!(crawls.len(), 1, "only the template crawl exists");
}

#[tokio::test]
async fn test_delete_schedule() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;
    let schedule = orchestrator
        .create_schedule(1, "Doomed", "15 * * * *", "prompt", template_id)
        .unwrap();

    orchestrator.delete_schedule(schedule.id).unwrap();
    assert!(!orchestrator.registry().is_registered(schedule.id));
    assert!(with_store(orchestrator.store(), |s| s.get_scheduled_job(schedule.id))
        .unwrap()
        .is_none());

    let again = orchestrator.delete_schedule(schedule.id);
    assert!(matches!(again, Err(TrawlerError::NotFound { .. })));
}

#[tokio::test]
async fn test_template_must_belong_to_owner() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;

    let result = orchestrator.create_schedule(2, "Not mine", "0 0 * * *", "prompt", template_id);
    assert!(matches!(result, Err(TrawlerError::NotFound { .. })));

    let result = orchestrator.create_schedule(1, "Missing", "0 0 * * *", "prompt", 9999);
    assert!(matches!(result, Err(TrawlerError::NotFound { .. })));

    let result = orchestrator.create_schedule(1, "  ", "0 0 * * *", "prompt", template_id);
    assert!(matches!(result, Err(TrawlerError::InvalidInput(_))));
}

#[tokio::test]
async fn test_initialize_registers_enabled_schedules() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;

    let first = orchestrator
        .create_schedule(1, "First", "0 1 * * *", "prompt", template_id)
        .unwrap();
    let second = orchestrator
        .create_schedule(1, "Second", "0 2 * * *", "prompt", template_id)
        .unwrap();
    orchestrator
        .update_schedule(
            second.id,
            ScheduleUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    orchestrator.shutdown();
    assert!(orchestrator.registry().registered_ids().is_empty());

    assert_eq!(orchestrator.initialize().unwrap(), 1);
    assert_eq!(orchestrator.registry().registered_ids(), vec![first.id]);
}

#[tokio::test]
async fn test_overlapping_fire_is_skipped() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::from_millis(300)).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;
    let schedule = orchestrator
        .create_schedule(1, "Busy", "0 4 * * *", "prompt", template_id)
        .unwrap();

    let first = orchestrator.registry().fire(schedule.id).expect("First fire runs");
    assert!(orchestrator.registry().is_running(schedule.id));
    assert!(
        orchestrator.registry().fire(schedule.id).is_none(),
        "second fire must be skipped while the first runs"
    );

    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, ChainOutcome::Failed(_)));
    assert!(!orchestrator.registry().is_running(schedule.id));

    // Only one scheduled crawl ran next to the template
    let crawls = with_store(orchestrator.store(), |s| s.list_crawl_jobs(1, None)).unwrap();
    assert_eq!(crawls.len(), 2);

    // Once finished, the schedule can fire again
    let again = orchestrator.registry().fire(schedule.id).expect("Guard was released");
    again.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_overlapping_fires_run_when_allowed() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::from_millis(300)).await;

    let orchestrator = create_orchestrator_with_overlap(None, true);
    let template_id = template_crawl(&orchestrator, 1, &site).await;
    let schedule = orchestrator
        .create_schedule(1, "Parallel", "0 4 * * *", "prompt", template_id)
        .unwrap();

    let first = orchestrator.registry().fire(schedule.id).expect("First fire runs");
    let second = orchestrator.registry().fire(schedule.id).expect("Second fire runs");

    for handle in [first, second] {
        let outcome = handle.await.unwrap().unwrap();
        assert_ne!(outcome, ChainOutcome::Inactive);
    }

    let crawls = with_store(orchestrator.store(), |s| s.list_crawl_jobs(1, None)).unwrap();
    assert_eq!(crawls.len(), 3);
}

#[tokio::test]
async fn test_inactive_fire_keeps_newer_timer() {
    let site = MockServer::start().await;
    mount_site(&site, Duration::ZERO).await;

    let orchestrator = create_orchestrator(None);
    let template_id = template_crawl(&orchestrator, 1, &site).await;
    let schedule = orchestrator
        .create_schedule(1, "Flipped", "0 5 * * *", "prompt", template_id)
        .unwrap();

    // The row is disabled when the fire reads it
    with_store(orchestrator.store(), |s| {
        s.update_scheduled_job(
            schedule.id,
            &ScheduleUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
    })
    .unwrap();
    let handle = orchestrator.registry().fire(schedule.id).unwrap();

    // A re-enable lands a new timer before the fire finishes
    let registration = orchestrator.registry().register(&schedule).unwrap();
    assert!(matches!(registration, Registration::Scheduled { .. }));

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, ChainOutcome::Inactive);
    assert!(
        orchestrator.registry().is_registered(schedule.id),
        "the newer timer must survive the late inactive outcome"
    );
}
