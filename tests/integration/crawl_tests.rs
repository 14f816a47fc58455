//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl job cycle (create row, traverse, persist) against them.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use trawler::config::{CrawlerConfig, UserAgentConfig};
use trawler::crawler::{CancellationRegistry, CrawlEngine, CrawlService, CrawlSettings, HttpFetcher};
use trawler::notify::{EventKind, NotificationHub, Notifier, TracingNotifier};
use trawler::storage::{with_store, SharedStore, SqliteStore};
use trawler::{JobStatus, TrawlerError};
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

fn test_crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        page_timeout_secs: 5,
        connect_timeout_secs: 2,
        ..CrawlerConfig::default()
    }
}

/// Creates a crawl service over an in-memory store
fn create_service(notifier: Arc<dyn Notifier>) -> CrawlService {
    let store: SharedStore = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let fetcher = HttpFetcher::new(&test_user_agent(), &test_crawler_config()).unwrap();
    let engine = CrawlEngine::new(Arc::new(fetcher), notifier);
    CrawlService::new(store, engine, Arc::new(CancellationRegistry::new()))
}

fn html_page(title: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            title, body
        ),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

fn settings(max_depth: u32, page_limit: usize) -> CrawlSettings {
    CrawlSettings {
        max_depth,
        page_limit,
    }
}

#[tokio::test]
async fn test_full_crawl_single_host() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page(
            "Home",
            &format!(
                r#"<p>Welcome</p>
                <a href="{base}/page1">Page 1</a>
                <a href="/page2">Page 2</a>
                <a href="http://other.invalid/elsewhere">Elsewhere</a>"#,
                base = base_url
            ),
        ),
    )
    .await;
    mount_page(
        &mock_server,
        "/page1",
        html_page("Page 1", r#"<a href="/">Home</a> <a href="/page3#top">Page 3</a>"#),
    )
    .await;
    mount_page(&mock_server, "/page2", html_page("Page 2", "No links here")).await;
    mount_page(&mock_server, "/page3", html_page("Page 3", "Deep page")).await;

    let service = create_service(Arc::new(TracingNotifier));
    let job = service
        .start(1, &base_url, settings(2, 10))
        .await
        .expect("Crawl should run");

    assert_eq!(job.status, JobStatus::Completed);

    let urls: Vec<&str> = job.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            format!("{}/", base_url),
            format!("{}/page1", base_url),
            format!("{}/page2", base_url),
            format!("{}/page3", base_url),
        ]
    );

    let home = &job.pages[0];
    assert_eq!(home.title, "Home");
    assert_eq!(home.links_found, 2, "external link must not be counted");
    assert!(home.text_content.as_deref().unwrap_or("").contains("Welcome"));

    // "/" is already visited, only page3 is new
    assert_eq!(job.pages[1].links_found, 1);
    assert!(job.pages.iter().all(|p| p.error.is_none()));

    // The persisted row matches what was returned
    let stored = with_store(service.store(), |s| s.get_crawl_job(job.id))
        .unwrap()
        .expect("Job should be stored");
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.pages, job.pages);
}

#[tokio::test]
async fn test_missing_page_is_recorded_and_crawl_continues() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page("Home", r#"<a href="/missing">Gone</a> <a href="/ok">Fine</a>"#),
    )
    .await;
    mount_page(&mock_server, "/ok", html_page("Fine", "Still here")).await;
    // Unmatched paths are answered with 404 by the mock server

    let service = create_service(Arc::new(TracingNotifier));
    let job = service.start(1, &base_url, settings(1, 10)).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages.len(), 3);

    let missing = &job.pages[1];
    assert!(missing.url.ends_with("/missing"));
    assert_eq!(missing.error.as_deref(), Some("HTTP 404"));
    assert_eq!(missing.title, "");
    assert_eq!(missing.links_found, 0);

    assert_eq!(job.pages[2].title, "Fine");
}

#[tokio::test]
async fn test_blocked_resources_are_not_downloaded() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page("Home", r#"<a href="/logo.png">Logo</a> <a href="/photo">Photo</a>"#),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 16], "image/png"))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/photo"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 16], "image/jpeg"))
        .mount(&mock_server)
        .await;

    let service = create_service(Arc::new(TracingNotifier));
    let job = service.start(1, &base_url, settings(1, 10)).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages.len(), 3);
    for page in &job.pages[1..] {
        assert_eq!(page.error.as_deref(), Some("Skipped image resource"));
    }
}

#[tokio::test]
async fn test_page_limit_and_events() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page("Home", r#"<a href="/a">A</a> <a href="/b">B</a> <a href="/c">C</a>"#),
    )
    .await;
    for route in ["/a", "/b", "/c"] {
        mount_page(&mock_server, route, html_page(route, "leaf")).await;
    }

    let hub = Arc::new(NotificationHub::new());
    let mut events = hub.subscribe(7);
    let service = create_service(hub.clone());

    let job = service.start(7, &base_url, settings(3, 2)).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages.len(), 2);

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.job_id, job.id);
        received.push(event);
    }

    let kinds: Vec<EventKind> = received.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::CrawlerJobStarted,
            EventKind::CrawlerJobProgress,
            EventKind::CrawlerJobProgress,
            EventKind::CrawlerJobFinished,
        ]
    );

    let finished = received.last().unwrap().data.as_ref().unwrap();
    assert_eq!(finished["status"], "COMPLETED");
    assert_eq!(finished["pages"], 2);
}

#[tokio::test]
async fn test_stop_running_crawl() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page("Home", r#"<a href="/next">Next</a>"#).set_delay(Duration::from_millis(300)),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(html_page("Next", "never fetched"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = create_service(Arc::new(TracingNotifier));
    let runner = service.clone();
    let url = base_url.clone();
    let handle = tokio::spawn(async move { runner.start(1, &url, settings(2, 10)).await });

    // Wait until the job is registered as running
    let mut job_id = None;
    for _ in 0..100 {
        if let Some(id) = service.cancellations().active_jobs().first().copied() {
            job_id = Some(id);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let job_id = job_id.expect("Crawl should be running");

    assert!(service.request_stop(job_id));

    let job = handle.await.unwrap().unwrap();
    assert_eq!(job.id, job_id);
    assert_eq!(job.status, JobStatus::Stopped);
    assert_eq!(job.pages.len(), 1);

    // The entry is gone once the loop has exited
    assert!(service.cancellations().active_jobs().is_empty());
    assert!(!service.request_stop(job_id));
}

#[tokio::test]
async fn test_redirected_page_resolves_links_from_target() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/docs"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/docs/"))
        .mount(&mock_server)
        .await;
    mount_page(
        &mock_server,
        "/docs/",
        html_page("Docs", r#"<a href="page">Guide</a>"#),
    )
    .await;
    mount_page(&mock_server, "/docs/page", html_page("Guide", "Read me")).await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html_page("Wrong", "resolved against the old URL"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = create_service(Arc::new(TracingNotifier));
    let job = service
        .start(1, &format!("{}/docs", base_url), settings(1, 10))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    let urls: Vec<&str> = job.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![format!("{}/docs", base_url), format!("{}/docs/page", base_url)]
    );
    assert_eq!(job.pages[0].title, "Docs");
    assert!(job.pages.iter().all(|p| p.error.is_none()));
}

#[tokio::test]
async fn test_stop_during_last_page_completes() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        html_page("Only", "No links").set_delay(Duration::from_millis(300)),
    )
    .await;

    let service = create_service(Arc::new(TracingNotifier));
    let runner = service.clone();
    let url = base_url.clone();
    let handle = tokio::spawn(async move { runner.start(1, &url, settings(2, 10)).await });

    let mut requested = false;
    for _ in 0..100 {
        if let Some(id) = service.cancellations().active_jobs().first().copied() {
            requested = service.request_stop(id);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(requested, "Crawl should be running");

    let job = handle.await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages.len(), 1);
}

#[tokio::test]
async fn test_invalid_start_url_creates_no_job() {
    let service = create_service(Arc::new(TracingNotifier));

    let result = service.start(1, "http://", settings(1, 5)).await;
    assert!(matches!(result, Err(TrawlerError::UrlError(_))));

    let result = service.start(1, "example.com", settings(1, 0)).await;
    assert!(matches!(result, Err(TrawlerError::InvalidInput(_))));

    let jobs = with_store(service.store(), |s| s.list_crawl_jobs(1, None)).unwrap();
    assert!(jobs.is_empty());
}
