//! Stateless worker: reserve a job, sweep its chunk, write the result.
//!
//! A worker processes one job at a time. Within a job, probes run in the
//! fixed sweep order; a watcher task polls the job row and fires the
//! cancellation token when the orchestrator cancels the scan, so the
//! sweep stops at the next checkpoint. Queue backend errors in the idle
//! loop retry with capped exponential backoff.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sweep_common::{Finding, Result, ScanError};
use sweep_http::{AuthContext, ScanClient};
use sweep_probes::{ExternalScannerSet, ProbeCtx, ScanFlags, SWEEP_ORDER};
use sweep_queue::{JobQueue, JobSpec, JobStatus};
use sweep_spec::{load_spec, SpecSource};

/// How long one blocking reserve waits before the idle loop spins again.
pub const RESERVE_TIMEOUT: Duration = Duration::from_secs(30);

const CANCEL_POLL: Duration = Duration::from_secs(1);
const BACKOFF_FLOOR: Duration = Duration::from_millis(100);
const BACKOFF_CEIL: Duration = Duration::from_secs(30);

pub struct Worker {
    id: String,
    queue: JobQueue,
    external: ExternalScannerSet,
    request_timeout: Duration,
    reserve_timeout: Duration,
}

impl Worker {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            id: format!("worker-{}", Uuid::new_v4().simple()),
            queue,
            external: ExternalScannerSet::default(),
            request_timeout: sweep_http::DEFAULT_TIMEOUT,
            reserve_timeout: RESERVE_TIMEOUT,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_external(mut self, external: ExternalScannerSet) -> Self {
        self.external = external;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reserve_timeout(mut self, timeout: Duration) -> Self {
        self.reserve_timeout = timeout;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lifecycle loop: register, reserve, sweep, repeat until shutdown.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.queue.register_worker(&self.id).await?;
        tracing::info!(worker_id = %self.id, "worker.started");

        let mut backoff = BACKOFF_FLOOR;
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            if let Err(e) = self.queue.update_worker(&self.id, "waiting", None).await {
                tracing::warn!(error = %e, "worker.registry_update_failed");
            }

            let reserved = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = self.queue.reserve(&self.id, self.reserve_timeout) => r,
            };
            match reserved {
                Ok(Some(job)) => {
                    backoff = BACKOFF_FLOOR;
                    let _ = self
                        .queue
                        .update_worker(&self.id, "processing", Some(&job.job_id))
                        .await;
                    self.process(job).await;
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "worker.queue_error");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CEIL);
                }
            }
        }

        let _ = self.queue.deregister_worker(&self.id).await;
        tracing::info!(worker_id = %self.id, "worker.stopped");
        Ok(())
    }

    /// Run one job to a terminal status. Budget exhaustion is an expected
    /// stop (`completed`); cancellation leaves the row as the
    /// orchestrator wrote it; anything else marks `failed`.
    async fn process(&self, job: JobSpec) {
        tracing::info!(
            job_id = %job.job_id,
            chunk_id = %job.chunk_id,
            server = %job.server_url,
            "worker.job_start"
        );

        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_for_cancel(
            self.queue.clone(),
            job.job_id.clone(),
            cancel.clone(),
        ));
        let outcome = self.sweep(&job, cancel).await;
        watcher.abort();

        match outcome {
            Ok(findings) => {
                let blob = match serde_json::to_string(&findings) {
                    Ok(blob) => blob,
                    Err(e) => {
                        let _ = self
                            .queue
                            .mark_failed(&job.job_id, &format!("result serialization: {e}"))
                            .await;
                        return;
                    }
                };
                if let Err(e) = self.queue.write_result(&job.job_id, &blob).await {
                    let _ = self.queue.mark_failed(&job.job_id, &e.to_string()).await;
                    return;
                }
                match self
                    .queue
                    .mark_completed(&job.job_id, findings.len() as u32)
                    .await
                {
                    Ok(true) => tracing::info!(
                        job_id = %job.job_id,
                        findings = findings.len(),
                        "worker.job_completed"
                    ),
                    Ok(false) => tracing::info!(
                        job_id = %job.job_id,
                        "worker.job_already_terminal"
                    ),
                    Err(e) => tracing::warn!(error = %e, "worker.completion_write_failed"),
                }
            }
            Err(ScanError::Cancelled) => {
                // the orchestrator already flipped the row
                tracing::info!(job_id = %job.job_id, "worker.job_cancelled");
            }
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "worker.job_failed");
                let _ = self.queue.mark_failed(&job.job_id, &e.to_string()).await;
            }
        }
    }

    async fn sweep(&self, job: &JobSpec, cancel: CancellationToken) -> Result<Vec<Finding>> {
        let snapshot = load_spec(&SpecSource::detect(&job.spec_location)).await?;
        let client = ScanClient::new(&job.server_url)?
            .with_rate(job.rate)
            .with_budget(job.request_budget)
            .with_timeout(self.request_timeout);
        let auth = AuthContext::new(snapshot.security_schemes.clone(), job.fuzz_auth);
        let flags = ScanFlags {
            dangerous: job.dangerous,
            fuzz_auth: job.fuzz_auth,
        };
        let ctx = ProbeCtx {
            spec: &snapshot,
            client: &client,
            auth: &auth,
            base: &job.server_url,
            flags,
            cancel: cancel.clone(),
        };

        let mut findings = Vec::new();
        for (i, probe) in SWEEP_ORDER.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            match probe.run(&ctx).await {
                Ok(found) => findings.extend(found),
                Err(ScanError::BudgetExhausted) => {
                    tracing::info!(
                        job_id = %job.job_id,
                        probe = probe.name(),
                        requests = client.used(),
                        "worker.budget_exhausted"
                    );
                    return Ok(findings);
                }
                Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
                Err(e) => {
                    // probe internal error: it contributes nothing further,
                    // the sweep continues with the next probe
                    tracing::warn!(probe = probe.name(), error = %e, "worker.probe_error");
                }
            }
            let _ = self
                .queue
                .update_progress(&job.job_id, ((i + 1) * 10) as u8, probe.phase())
                .await;
        }

        for scanner in self.external.iter() {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            match scanner.scan(&snapshot, &job.server_url).await {
                Ok(found) => findings.extend(found),
                Err(e) => {
                    tracing::warn!(scanner = scanner.name(), error = %e, "worker.external_error")
                }
            }
        }
        Ok(findings)
    }
}

async fn watch_for_cancel(queue: JobQueue, job_id: String, cancel: CancellationToken) {
    loop {
        tokio::time::sleep(CANCEL_POLL).await;
        match queue.job_state(&job_id).await {
            Ok(Some(state)) if state.status == JobStatus::Cancelled => {
                cancel.cancel();
                return;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "worker.cancel_watch_error"),
        }
    }
}
