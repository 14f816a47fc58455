//! In-process notifier implementations

use crate::notify::{JobEvent, Notifier};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Per-owner channel registry
///
/// The notifier for callers that embed the library and forward job events
/// to their own clients (a socket per owner, for instance). The CLI has no
/// subscribers and logs events through [`TracingNotifier`] instead.
///
/// Each owner has at most one live channel; subscribing again replaces the
/// previous one.
///
/// [`TracingNotifier`]: crate::notify::TracingNotifier
#[derive(Debug, Default)]
pub struct NotificationHub {
    channels: Mutex<HashMap<i64, mpsc::UnboundedSender<JobEvent>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<i64, mpsc::UnboundedSender<JobEvent>>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens a channel for an owner
    pub fn subscribe(&self, owner_id: i64) -> mpsc::UnboundedReceiver<JobEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels().insert(owner_id, tx);
        debug!(owner_id, "Notification channel opened");
        rx
    }

    /// Closes an owner's channel
    pub fn unsubscribe(&self, owner_id: i64) {
        if self.channels().remove(&owner_id).is_some() {
            debug!(owner_id, "Notification channel closed");
        }
    }

    /// Number of owners with a live channel
    pub fn connected(&self) -> usize {
        let mut channels = self.channels();
        channels.retain(|_, tx| !tx.is_closed());
        channels.len()
    }
}

impl Notifier for NotificationHub {
    fn send(&self, owner_id: i64, event: JobEvent) {
        let mut channels = self.channels();
        let Some(tx) = channels.get(&owner_id) else {
            return;
        };

        if tx.send(event).is_err() {
            // Receiver went away
            channels.remove(&owner_id);
        }
    }
}

/// Notifier that writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, owner_id: i64, event: JobEvent) {
        match &event.data {
            Some(data) => info!(owner_id, job_id = event.job_id, kind = ?event.kind, %data, "Job event"),
            None => info!(owner_id, job_id = event.job_id, kind = ?event.kind, "Job event"),
        }
    }
}
