//! Breadth-first, same-host crawl engine
//!
//! The engine walks a FIFO frontier of `(url, depth)` pairs seeded with the
//! start page. Pages are fetched one at a time; a failing page is recorded
//! and the walk continues. The loop runs while the frontier is non-empty,
//! the page limit has not been reached and no stop was requested.

use crate::crawler::{
    parse_page, CancelGuard, CrawlOutcome, CrawlSettings, PageFetcher, PageResult,
};
use crate::notify::{EventKind, JobEvent, Notifier};
use crate::state::JobStatus;
use crate::url::{allowed_host, is_in_scope, normalize_page_url, normalize_start_url};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Runs crawl traversals
#[derive(Clone)]
pub struct CrawlEngine {
    fetcher: Arc<dyn PageFetcher>,
    notifier: Arc<dyn Notifier>,
}

impl CrawlEngine {
    pub fn new(fetcher: Arc<dyn PageFetcher>, notifier: Arc<dyn Notifier>) -> Self {
        Self { fetcher, notifier }
    }

    /// Crawls from `start_url` and returns the pages with a terminal status
    ///
    /// Returns ERROR with no pages if the start URL is malformed or the
    /// fetcher cannot be prepared. Otherwise the status is STOPPED when the
    /// stop request was seen at a loop checkpoint and COMPLETED when the
    /// loop ran out of work or hit the page limit.
    ///
    /// `stop` is dropped when the loop exits, which clears the job's
    /// cancellation entry.
    pub async fn crawl(
        &self,
        owner_id: i64,
        job_id: i64,
        start_url: &str,
        settings: CrawlSettings,
        stop: CancelGuard,
    ) -> CrawlOutcome {
        let start = match normalize_start_url(start_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(job_id, url = start_url, error = %e, "Invalid initial URL");
                drop(stop);
                return self.finish(owner_id, job_id, CrawlOutcome::error());
            }
        };

        let Some(allowed) = allowed_host(&start) else {
            drop(stop);
            return self.finish(owner_id, job_id, CrawlOutcome::error());
        };

        if let Err(e) = self.fetcher.prepare().await {
            warn!(job_id, error = %e, "Fetcher could not be prepared");
            drop(stop);
            return self.finish(owner_id, job_id, CrawlOutcome::error());
        }

        info!(
            job_id,
            url = %start,
            max_depth = settings.max_depth,
            page_limit = settings.page_limit,
            "Crawl started"
        );
        self.notifier.send(
            owner_id,
            JobEvent::new(EventKind::CrawlerJobStarted, job_id).with_data(json!({ "url": start.as_str() })),
        );

        let mut frontier = Frontier::new(start);
        let mut pages: Vec<PageResult> = Vec::new();
        let mut stopped = false;

        while pages.len() < settings.page_limit {
            // An exhausted queue completes the crawl even if a stop arrived meanwhile
            if frontier.is_empty() {
                break;
            }
            if stop.is_cancelled() {
                info!(job_id, pages = pages.len(), "Crawl stopped by request");
                stopped = true;
                break;
            }

            let Some((url, depth)) = frontier.pop() else {
                break;
            };

            if frontier.is_visited(&url) || depth > settings.max_depth {
                continue;
            }
            frontier.mark_visited(&url);

            self.notifier.send(
                owner_id,
                JobEvent::new(EventKind::CrawlerJobProgress, job_id)
                    .with_data(json!({ "url": url.as_str(), "currentDepth": depth })),
            );

            match self.fetcher.fetch(&url).await {
                Ok(fetched) => {
                    // Links resolve against the document actually served
                    let landed = normalize_page_url(fetched.final_url);
                    let parsed = parse_page(&fetched.body, &landed);
                    let landed_in_scope = is_in_scope(&landed, &allowed);
                    if landed != url {
                        debug!(job_id, from = %url, to = %landed, "Followed redirect");
                        if landed_in_scope {
                            frontier.mark_visited(&landed);
                        }
                    }

                    let mut discovered = HashSet::new();
                    let links = if landed_in_scope { parsed.links } else { Vec::new() };
                    for link in links {
                        if !is_in_scope(&link, &allowed)
                            || frontier.is_known(&link)
                            || !discovered.insert(link.to_string())
                        {
                            continue;
                        }
                        if depth < settings.max_depth {
                            frontier.push(link, depth + 1);
                        }
                    }

                    debug!(
                        job_id,
                        count = pages.len(),
                        depth,
                        url = %url,
                        title = %parsed.title,
                        links_found = discovered.len(),
                        "Page crawled"
                    );
                    pages.push(PageResult::fetched(
                        url.as_str(),
                        parsed.title,
                        parsed.text,
                        discovered.len(),
                    ));
                }
                Err(e) => {
                    warn!(job_id, url = %url, error = %e, "Failed to process page");
                    let message = e.to_string();
                    self.notifier.send(
                        owner_id,
                        JobEvent::new(EventKind::CrawlerJobProgressError, job_id)
                            .with_data(json!({ "url": url.as_str(), "error": message })),
                    );
                    pages.push(PageResult::failed(url.as_str(), message));
                }
            }
        }

        // Clears the cancellation entry before the result is handed back
        drop(stop);

        let status = if stopped {
            JobStatus::Stopped
        } else {
            JobStatus::Completed
        };
        info!(job_id, pages = pages.len(), status = %status, "Crawl finished");

        self.finish(owner_id, job_id, CrawlOutcome { pages, status })
    }

    fn finish(&self, owner_id: i64, job_id: i64, outcome: CrawlOutcome) -> CrawlOutcome {
        self.notifier.send(
            owner_id,
            JobEvent::new(EventKind::CrawlerJobFinished, job_id)
                .with_data(json!({ "status": outcome.status, "pages": outcome.pages.len() })),
        );
        outcome
    }
}

/// FIFO queue plus the visited and ever-queued sets
struct Frontier {
    queue: VecDeque<(Url, u32)>,
    visited: HashSet<String>,
    queued: HashSet<String>,
}

impl Frontier {
    fn new(start: Url) -> Self {
        let mut frontier = Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            queued: HashSet::new(),
        };
        frontier.push(start, 0);
        frontier
    }

    fn push(&mut self, url: Url, depth: u32) {
        self.queued.insert(url.to_string());
        self.queue.push_back((url, depth));
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn pop(&mut self) -> Option<(Url, u32)> {
        self.queue.pop_front()
    }

    fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(url.as_str())
    }

    fn mark_visited(&mut self, url: &Url) {
        self.visited.insert(url.to_string());
    }

    fn is_known(&self, url: &Url) -> bool {
        self.visited.contains(url.as_str()) || self.queued.contains(url.as_str())
    }
}
