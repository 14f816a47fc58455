//! State module for job lifecycles
//!
//! Every job kind (crawl jobs, analyser jobs, and each scheduled run record)
//! moves through the same [`JobStatus`] state machine.

mod job_status;

// Re-export main types
pub use job_status::{InvalidTransition, JobStatus};
