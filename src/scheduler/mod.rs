//! Recurring crawl-then-analyse schedules
//!
//! This module contains:
//! - Five-field cron parsing
//! - The trigger registry that owns one timer per enabled schedule
//! - The execution chain each timer fire runs
//!
//! With `allow-overlap = false` a fire is skipped while the previous run of
//! the same schedule is still in progress. With overlap allowed, two runs of
//! one schedule may write `last_run` and `next_run` concurrently and the last
//! write wins.

mod chain;
mod cron;
mod registry;

pub use self::cron::CronSchedule;
pub use chain::{ChainFailure, ChainOutcome, ExecutionChain, MAX_ERROR_LEN};
pub use registry::{Registration, TriggerRegistry};
