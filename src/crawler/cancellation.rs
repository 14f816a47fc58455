//! Per-job stop flags for running crawls
//!
//! Each running crawl owns a [`CancelGuard`]. The guard holds the job's
//! cancellation token and removes the registry entry when it is dropped, so
//! an entry exists exactly as long as the traversal loop runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Entries {
    next_generation: u64,
    tokens: HashMap<i64, (u64, CancellationToken)>,
}

/// Thread-safe map of running crawl jobs to their stop tokens
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    entries: Mutex<Entries>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        // The map holds no invariant a panic could break
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a running job and returns the guard the engine consumes
    ///
    /// Registering an id twice replaces the earlier token.
    pub fn register(self: &Arc<Self>, job_id: i64) -> CancelGuard {
        let token = CancellationToken::new();

        let generation = {
            let mut entries = self.entries();
            entries.next_generation += 1;
            let generation = entries.next_generation;
            entries.tokens.insert(job_id, (generation, token.clone()));
            generation
        };

        CancelGuard {
            job_id,
            generation,
            token,
            registry: Arc::clone(self),
        }
    }

    /// Asks a running job to stop at its next checkpoint
    ///
    /// Returns false if no such job is running; the request is dropped.
    pub fn request_stop(&self, job_id: i64) -> bool {
        match self.entries().tokens.get(&job_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns true if a stop was requested for a running job
    pub fn observe(&self, job_id: i64) -> bool {
        self.entries()
            .tokens
            .get(&job_id)
            .map(|(_, token)| token.is_cancelled())
            .unwrap_or(false)
    }

    /// Ids of every job currently registered
    pub fn active_jobs(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.entries().tokens.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn remove(&self, job_id: i64, generation: u64) {
        let mut entries = self.entries();
        // A newer registration for the same id keeps its entry
        if matches!(entries.tokens.get(&job_id), Some((g, _)) if *g == generation) {
            entries.tokens.remove(&job_id);
        }
    }
}

/// Stop handle owned by one running traversal
///
/// Dropping the guard clears the job's registry entry.
#[derive(Debug)]
pub struct CancelGuard {
    job_id: i64,
    generation: u64,
    token: CancellationToken,
    registry: Arc<CancellationRegistry>,
}

impl CancelGuard {
    /// The job this guard belongs to
    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    /// Returns true once a stop has been requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.registry.remove(self.job_id, self.generation);
    }
}
