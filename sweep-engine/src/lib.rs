//! Work orchestration: stateless workers draining the shared queue, and
//! the orchestrator that chunks specs, enqueues jobs, and aggregates the
//! per-chunk findings into one result set.

pub mod orchestrator;
pub mod worker;

pub use orchestrator::{Orchestrator, ScanOutcome, ScanRequest};
pub use worker::Worker;
