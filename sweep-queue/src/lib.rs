//! Durable work queue records shared between orchestrators and workers.
//!
//! All cross-actor scan state lives here: job payloads and status, result
//! blobs, the worker registry, and orchestrator-owned scan records.
//! Workers never read scan records; orchestrators never write job records
//! except to cancel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod store;

pub use store::JobQueue;

/// Job lifecycle; `queued → running → {completed, failed, cancelled}`,
/// terminal statuses are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scan lifecycle as derived from the job aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<ScanStatus> {
        match s {
            "pending" => Some(ScanStatus::Pending),
            "running" => Some(ScanStatus::Running),
            "completed" => Some(ScanStatus::Completed),
            "failed" => Some(ScanStatus::Failed),
            "cancelled" => Some(ScanStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The immutable payload a worker needs to run one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: String,
    pub scan_id: String,
    pub chunk_id: String,
    pub spec_location: String,
    pub server_url: String,
    pub rate: f64,
    pub request_budget: u32,
    pub dangerous: bool,
    pub fuzz_auth: bool,
    pub created_at: DateTime<Utc>,
}

impl JobSpec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scan_id: &str,
        chunk_index: usize,
        spec_location: String,
        server_url: String,
        rate: f64,
        request_budget: u32,
        dangerous: bool,
        fuzz_auth: bool,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            scan_id: scan_id.to_string(),
            chunk_id: format!("{scan_id}_chunk_{chunk_index}"),
            spec_location,
            server_url,
            rate,
            request_budget,
            dangerous,
            fuzz_auth,
            created_at: Utc::now(),
        }
    }
}

/// Mutable job state as stored in the queue backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub scan_id: String,
    pub chunk_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub phase: String,
    pub worker_id: Option<String>,
    pub findings_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Worker registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub status: String,
    pub current_job: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Orchestrator-owned record of one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan_id: String,
    pub server_url: String,
    pub spec_ref: String,
    pub dangerous: bool,
    pub fuzz_auth: bool,
    pub total_chunks: u32,
    pub completed_chunks: u32,
    pub status: ScanStatus,
    pub progress: u8,
    pub findings_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Counters for the scan surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_length: u64,
    pub active_workers: u64,
    pub processing_workers: u64,
    pub waiting_workers: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_roundtrip() {
        for st in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(st.as_str()), Some(st));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_statuses_are_flagged() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn job_spec_derives_chunk_id_from_scan() {
        let job = JobSpec::new(
            "scan-1",
            2,
            "/tmp/x.json".into(),
            "http://t.local".into(),
            1.0,
            400,
            false,
            false,
        );
        assert_eq!(job.chunk_id, "scan-1_chunk_2");
        assert_eq!(job.scan_id, "scan-1");
    }
}
