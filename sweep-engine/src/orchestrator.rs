//! The orchestrator: chunk the spec, enqueue one job per chunk, monitor
//! job statuses, and merge the per-chunk findings into one result set.

use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use sweep_common::{Finding, Result, ScanError};
use sweep_queue::{JobQueue, JobSpec, JobState, JobStatus, ScanRecord, ScanStatus};
use sweep_spec::chunker::{chunk_paths, DEFAULT_CHUNK_SIZE};
use sweep_spec::loader::load_document;
use sweep_spec::SpecSource;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

const RATE_MIN: f64 = 0.1;
const RATE_MAX: f64 = 10.0;
const BUDGET_MIN: u32 = 1;
const BUDGET_MAX: u32 = 500;

/// Enqueue parameters for one scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub server_url: String,
    pub spec_ref: String,
    pub rate: f64,
    pub request_budget: u32,
    pub dangerous: bool,
    pub fuzz_auth: bool,
}

impl ScanRequest {
    pub fn new(server_url: impl Into<String>, spec_ref: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            spec_ref: spec_ref.into(),
            rate: 1.0,
            request_budget: 400,
            dangerous: false,
            fuzz_auth: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(RATE_MIN..=RATE_MAX).contains(&self.rate) {
            return Err(ScanError::InvalidParams(format!(
                "rate {} outside [{RATE_MIN}, {RATE_MAX}]",
                self.rate
            )));
        }
        if !(BUDGET_MIN..=BUDGET_MAX).contains(&self.request_budget) {
            return Err(ScanError::InvalidParams(format!(
                "request budget {} outside [{BUDGET_MIN}, {BUDGET_MAX}]",
                self.request_budget
            )));
        }
        Ok(())
    }
}

/// Terminal view of one scan.
#[derive(Debug)]
pub struct ScanOutcome {
    pub scan_id: String,
    pub status: ScanStatus,
    pub findings: Vec<Finding>,
    pub error: Option<String>,
    pub jobs: Vec<JobState>,
}

pub struct Orchestrator {
    queue: JobQueue,
    work_dir: PathBuf,
    chunk_size: usize,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl Orchestrator {
    pub fn new(queue: JobQueue, work_dir: PathBuf) -> Self {
        Self {
            queue,
            work_dir,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Load and chunk the spec, write chunk documents where workers can
    /// read them, and enqueue one job per chunk. Returns the scan id.
    pub async fn start(&self, request: &ScanRequest) -> Result<String> {
        request.validate()?;
        let scan_id = Uuid::new_v4().to_string();

        let doc = load_document(&SpecSource::detect(&request.spec_ref)).await?;
        let chunks = chunk_paths(&doc, self.chunk_size)?;

        let specs_dir = self.work_dir.join("specs");
        tokio::fs::create_dir_all(&specs_dir)
            .await
            .map_err(|e| ScanError::SpecUnreachable(format!("chunk spec dir: {e}")))?;

        self.queue
            .insert_scan(&ScanRecord {
                scan_id: scan_id.clone(),
                server_url: request.server_url.clone(),
                spec_ref: request.spec_ref.clone(),
                dangerous: request.dangerous,
                fuzz_auth: request.fuzz_auth,
                total_chunks: chunks.len() as u32,
                completed_chunks: 0,
                status: ScanStatus::Pending,
                progress: 0,
                findings_count: 0,
                error: None,
                created_at: Utc::now(),
            })
            .await?;

        for (index, chunk) in chunks.iter().enumerate() {
            let job = JobSpec::new(
                &scan_id,
                index,
                String::new(),
                request.server_url.clone(),
                request.rate,
                request.request_budget,
                request.dangerous,
                request.fuzz_auth,
            );
            let path = specs_dir.join(format!("{}_spec.json", job.chunk_id));
            let body = serde_json::to_string(chunk)
                .map_err(|e| ScanError::SpecInvalid(format!("chunk serialization: {e}")))?;
            tokio::fs::write(&path, body)
                .await
                .map_err(|e| ScanError::SpecUnreachable(format!("{}: {e}", path.display())))?;

            let job = JobSpec {
                spec_location: path.display().to_string(),
                ..job
            };
            self.queue.enqueue(&job).await?;
        }

        tracing::info!(scan_id = %scan_id, chunks = chunks.len(), "orchestrator.scan_enqueued");
        Ok(scan_id)
    }

    /// Poll job statuses until the scan reaches a terminal state, then
    /// aggregate findings from every completed chunk.
    pub async fn wait(&self, scan_id: &str) -> Result<ScanOutcome> {
        loop {
            let jobs = self.queue.scan_jobs(scan_id).await?;
            if jobs.is_empty() {
                return Err(ScanError::Queue(format!("no jobs recorded for scan {scan_id}")));
            }

            if let Some(stuck) = self.timed_out_job(&jobs) {
                let message = format!(
                    "chunk {} exceeded the per-job timeout ({}s)",
                    stuck.chunk_id,
                    self.job_timeout.as_secs()
                );
                tracing::warn!(scan_id, chunk_id = %stuck.chunk_id, "orchestrator.job_timeout");
                self.queue.cancel_scan(scan_id).await?;
                return self.finish(scan_id, ScanStatus::Failed, Some(message)).await;
            }

            if let Some(failed) = jobs.iter().find(|j| j.status == JobStatus::Failed) {
                let message = failed
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("chunk {} failed", failed.chunk_id));
                return self.finish(scan_id, ScanStatus::Failed, Some(message)).await;
            }

            if jobs.iter().all(|j| j.status.is_terminal()) {
                let status = if jobs.iter().any(|j| j.status == JobStatus::Cancelled) {
                    ScanStatus::Cancelled
                } else {
                    ScanStatus::Completed
                };
                return self.finish(scan_id, status, None).await;
            }

            // scan-level progress: integer mean, clamped below 95 until terminal
            let mean =
                jobs.iter().map(|j| j.progress as u32).sum::<u32>() / jobs.len() as u32;
            let progress = mean.min(95) as u8;
            let completed = jobs.iter().filter(|j| j.status == JobStatus::Completed).count();
            let findings: u32 = jobs.iter().map(|j| j.findings_count).sum();
            let _ = self
                .queue
                .update_scan(
                    scan_id,
                    ScanStatus::Running,
                    progress,
                    completed as u32,
                    findings,
                    None,
                )
                .await;

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn run(&self, request: &ScanRequest) -> Result<ScanOutcome> {
        let scan_id = self.start(request).await?;
        self.wait(&scan_id).await
    }

    /// Flip every non-terminal job of the scan to `cancelled` (the only
    /// job-record write an orchestrator may perform).
    pub async fn cancel(&self, scan_id: &str) -> Result<u64> {
        self.queue.cancel_scan(scan_id).await
    }

    fn timed_out_job<'a>(&self, jobs: &'a [JobState]) -> Option<&'a JobState> {
        let clamp = chrono::Duration::from_std(self.job_timeout).ok()?;
        let now = Utc::now();
        jobs.iter().find(|j| {
            j.status == JobStatus::Running
                && j.started_at.is_some_and(|started| now - started > clamp)
        })
    }

    /// Collect findings from every completed chunk (in chunk order,
    /// deduplicated by fingerprint) and write the terminal scan record.
    async fn finish(
        &self,
        scan_id: &str,
        status: ScanStatus,
        error: Option<String>,
    ) -> Result<ScanOutcome> {
        let jobs = self.queue.scan_jobs(scan_id).await?;
        let mut findings: Vec<Finding> = Vec::new();
        let mut seen = HashSet::new();

        for job in jobs.iter().filter(|j| j.status == JobStatus::Completed) {
            let Some(blob) = self.queue.result(&job.job_id).await? else {
                continue;
            };
            let chunk_findings: Vec<Finding> = serde_json::from_str(&blob)
                .map_err(|e| ScanError::Queue(format!("result blob for {}: {e}", job.job_id)))?;
            for finding in chunk_findings {
                let key = (
                    finding.rule,
                    finding.endpoint.clone(),
                    finding.method.clone(),
                );
                if seen.insert(key) {
                    findings.push(finding);
                }
            }
        }

        let completed = jobs.iter().filter(|j| j.status == JobStatus::Completed).count();
        self.queue
            .update_scan(
                scan_id,
                status,
                100,
                completed as u32,
                findings.len() as u32,
                error.as_deref(),
            )
            .await?;

        tracing::info!(
            scan_id,
            status = %status,
            findings = findings.len(),
            completed_chunks = completed,
            "orchestrator.scan_finished"
        );
        Ok(ScanOutcome {
            scan_id: scan_id.to_string(),
            status,
            findings,
            error,
            jobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ranges_are_enforced() {
        let mut req = ScanRequest::new("http://t.local", "spec.yaml");
        assert!(req.validate().is_ok());

        req.rate = 0.05;
        assert!(matches!(req.validate(), Err(ScanError::InvalidParams(_))));
        req.rate = 10.0;
        assert!(req.validate().is_ok());

        req.request_budget = 0;
        assert!(matches!(req.validate(), Err(ScanError::InvalidParams(_))));
        req.request_budget = 500;
        assert!(req.validate().is_ok());
    }
}
