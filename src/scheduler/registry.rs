//! Trigger registry: one timer task per enabled schedule
//!
//! A schedule is registered iff it is enabled and its cron expression is
//! valid. Every path that (re-)registers a schedule first removes the old
//! timer under the same lock, so a stale timer never survives an update.

use crate::scheduler::{ChainOutcome, CronSchedule, ExecutionChain};
use crate::storage::{with_store, ScheduledJob, SharedStore};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What `register` did with a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A timer is running
    Scheduled { next_run: Option<DateTime<Utc>> },
    /// The schedule is disabled; no timer
    Disabled,
    /// The cron expression is invalid; the schedule was disabled
    InvalidCron,
}

/// A running timer task; the generation tells replacements apart
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns the periodic timers, keyed by schedule id
pub struct TriggerRegistry {
    store: SharedStore,
    chain: Arc<ExecutionChain>,
    timers: Mutex<HashMap<i64, Timer>>,
    next_generation: AtomicU64,
    in_flight: Arc<Mutex<HashSet<i64>>>,
    allow_overlap: bool,
}

impl TriggerRegistry {
    pub fn new(store: SharedStore, chain: Arc<ExecutionChain>, allow_overlap: bool) -> Self {
        Self {
            store,
            chain,
            timers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            allow_overlap,
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<i64, Timer>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts (or restarts) the timer for a schedule
    ///
    /// A disabled schedule is unregistered. An invalid cron expression
    /// unregisters the schedule and persists `enabled = false` with
    /// `last_run_status = ERROR` instead of failing. On success the next
    /// fire time is persisted.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(self: &Arc<Self>, schedule: &ScheduledJob) -> Result<Registration> {
        if !schedule.enabled {
            debug!(schedule_id = schedule.id, "Schedule is disabled, not registering");
            self.unregister(schedule.id);
            return Ok(Registration::Disabled);
        }

        let cron = match CronSchedule::parse(&schedule.cron_expression) {
            Ok(cron) => cron,
            Err(e) => {
                warn!(schedule_id = schedule.id, error = %e, "Disabling schedule with invalid cron expression");
                self.unregister(schedule.id);
                with_store(&self.store, |s| s.disable_invalid_schedule(schedule.id, Utc::now()))?;
                return Ok(Registration::InvalidCron);
            }
        };

        let next_run = cron.next();
        let handle = tokio::spawn(run_timer(Arc::downgrade(self), schedule.id, cron));
        let timer = Timer {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            handle,
        };

        if let Some(old) = self.timers().insert(schedule.id, timer) {
            debug!(schedule_id = schedule.id, "Replacing existing timer");
            old.handle.abort();
        }

        with_store(&self.store, |s| s.set_next_run(schedule.id, next_run))?;
        info!(
            schedule_id = schedule.id,
            name = %schedule.name,
            cron = %schedule.cron_expression,
            "Schedule registered"
        );

        Ok(Registration::Scheduled { next_run })
    }

    /// Stops and removes a schedule's timer; returns false if there was none
    pub fn unregister(&self, schedule_id: i64) -> bool {
        match self.timers().remove(&schedule_id) {
            Some(timer) => {
                timer.handle.abort();
                info!(schedule_id, "Schedule unregistered");
                true
            }
            None => false,
        }
    }

    /// Re-reads a schedule after an edit
    ///
    /// Always unregisters first; registers again only if the persisted row
    /// still exists and is enabled.
    pub fn update(self: &Arc<Self>, schedule_id: i64) -> Result<Option<Registration>> {
        self.unregister(schedule_id);

        let schedule = with_store(&self.store, |s| s.get_scheduled_job(schedule_id))?;
        match schedule {
            Some(schedule) if schedule.enabled => self.register(&schedule).map(Some),
            _ => Ok(None),
        }
    }

    /// Unregisters a schedule and deletes its row; returns false if no row existed
    pub fn delete(&self, schedule_id: i64) -> Result<bool> {
        self.unregister(schedule_id);
        with_store(&self.store, |s| s.delete_scheduled_job(schedule_id))
    }

    /// Starts one chain run for a schedule without waiting for it
    ///
    /// Returns None when the fire is skipped because the previous run of the
    /// same schedule is still going and overlap is not allowed.
    pub fn fire(self: &Arc<Self>, schedule_id: i64) -> Option<JoinHandle<Result<ChainOutcome>>> {
        let guard = if self.allow_overlap {
            None
        } else {
            match InFlight::acquire(&self.in_flight, schedule_id) {
                Some(guard) => Some(guard),
                None => {
                    warn!(schedule_id, "Previous run still in progress, skipping fire");
                    return None;
                }
            }
        };

        // A timer registered after this point belongs to a newer edit
        let generation = self.timer_generation(schedule_id);
        let registry = Arc::clone(self);
        Some(tokio::spawn(async move {
            let outcome = registry.chain.run(schedule_id).await;
            drop(guard);

            match &outcome {
                Ok(ChainOutcome::Inactive) => {
                    if let Some(generation) = generation {
                        registry.unregister_generation(schedule_id, generation);
                    }
                }
                Err(e) => error!(schedule_id, error = %e, "Scheduled run could not be recorded"),
                _ => {}
            }
            outcome
        }))
    }

    /// Registers every enabled schedule; returns how many got a timer
    pub fn initialize(self: &Arc<Self>) -> Result<usize> {
        let schedules = with_store(&self.store, |s| s.list_enabled_scheduled_jobs())?;

        let mut scheduled = 0;
        for schedule in &schedules {
            if let Registration::Scheduled { .. } = self.register(schedule)? {
                scheduled += 1;
            }
        }

        info!(scheduled, total = schedules.len(), "Scheduler initialized");
        Ok(scheduled)
    }

    /// Aborts every timer
    ///
    /// Runs already in progress are not interrupted.
    pub fn shutdown(&self) {
        let mut timers = self.timers();
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
        info!("Scheduler stopped");
    }

    fn timer_generation(&self, schedule_id: i64) -> Option<u64> {
        self.timers().get(&schedule_id).map(|t| t.generation)
    }

    /// Removes the schedule's timer only if it is still the given one
    fn unregister_generation(&self, schedule_id: i64, generation: u64) -> bool {
        let mut timers = self.timers();
        match timers.get(&schedule_id) {
            Some(timer) if timer.generation == generation => {
                if let Some(timer) = timers.remove(&schedule_id) {
                    timer.handle.abort();
                }
                info!(schedule_id, "Inactive schedule unregistered");
                true
            }
            _ => {
                debug!(schedule_id, "Timer was replaced since the fire, keeping it");
                false
            }
        }
    }

    /// Returns true if a timer exists for the schedule
    pub fn is_registered(&self, schedule_id: i64) -> bool {
        self.timers().contains_key(&schedule_id)
    }

    /// Ids of all registered schedules, ascending
    pub fn registered_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.timers().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns true while a run of the schedule is in progress
    pub fn is_running(&self, schedule_id: i64) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&schedule_id)
    }
}

impl Drop for TriggerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sleeps until each fire time and fires; exits once the registry is gone
async fn run_timer(registry: Weak<TriggerRegistry>, schedule_id: i64, cron: CronSchedule) {
    let mut last_fire = Utc::now();

    loop {
        let now = Utc::now();
        let Some(next) = cron.next_after(&now.max(last_fire)) else {
            debug!(schedule_id, "Cron expression has no future fire time");
            return;
        };

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        last_fire = next;

        let Some(registry) = registry.upgrade() else {
            return;
        };
        debug!(schedule_id, "Timer fired");
        registry.fire(schedule_id);
    }
}

/// Marks a schedule as running until dropped
struct InFlight {
    set: Arc<Mutex<HashSet<i64>>>,
    schedule_id: i64,
}

impl InFlight {
    fn acquire(set: &Arc<Mutex<HashSet<i64>>>, schedule_id: i64) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(schedule_id);

        inserted.then(|| Self {
            set: Arc::clone(set),
            schedule_id,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.schedule_id);
    }
}
