//! Job event notifications
//!
//! Crawl and analyser runs push [`JobEvent`]s to a [`Notifier`], keyed by the
//! owner of the job. Delivery is fire-and-forget: an owner without a live
//! channel simply misses the event.

mod hub;

pub use hub::{NotificationHub, TracingNotifier};

use serde::Serialize;
use serde_json::Value;

/// Kind of a job event, serialized as its wire `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CrawlerJobStarted,
    CrawlerJobProgress,
    CrawlerJobProgressError,
    CrawlerJobFinished,
    AnalyserJobRelevanceStarted,
    AnalyserJobRelevanceFinished,
    AnalyserJobAnalysisStarted,
    AnalyserJobAnalysisFinished,
}

/// Message pushed to an owner's channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub job_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JobEvent {
    pub fn new(kind: EventKind, job_id: i64) -> Self {
        Self {
            kind,
            job_id,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Sink for job events
pub trait Notifier: Send + Sync {
    /// Delivers `event` to `owner_id`; never fails and never blocks
    fn send(&self, owner_id: i64, event: JobEvent);
}
