//! SQLite-backed queue store.
//!
//! Every operation is a single statement (or a short transaction), so the
//! FIFO pop is atomic across concurrent workers and terminal status
//! transitions are absorbing. Result blobs are written with an upsert so
//! at-least-once delivery stays harmless.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sweep_common::{Result, ScanError};

use crate::{
    JobSpec, JobState, JobStatus, QueueStats, ScanRecord, ScanStatus, WorkerInfo,
};

const RESERVE_POLL: Duration = Duration::from_millis(250);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scan_job (
    job_id TEXT PRIMARY KEY,
    scan_id TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'queued',
    progress INTEGER NOT NULL DEFAULT 0,
    phase TEXT NOT NULL DEFAULT '',
    worker_id TEXT,
    findings_count INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_scan_job_scan ON scan_job(scan_id);
CREATE INDEX IF NOT EXISTS idx_scan_job_status ON scan_job(status);

CREATE TABLE IF NOT EXISTS scan_result (
    job_id TEXT PRIMARY KEY,
    findings TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scanner_worker (
    worker_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    current_job TEXT,
    started_at TEXT NOT NULL,
    last_update TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scan_record (
    scan_id TEXT PRIMARY KEY,
    server_url TEXT NOT NULL,
    spec_ref TEXT NOT NULL,
    dangerous INTEGER NOT NULL DEFAULT 0,
    fuzz_auth INTEGER NOT NULL DEFAULT 0,
    total_chunks INTEGER NOT NULL DEFAULT 0,
    completed_chunks INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    findings_count INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL
);
"#;

fn qerr(e: impl std::fmt::Display) -> ScanError {
    ScanError::Queue(e.to_string())
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Handle to the shared queue backend.
#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    /// Open (and migrate) the queue database at `url`, e.g.
    /// `sqlite:/var/lib/sweep/queue.db`.
    pub async fn connect(url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(qerr)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(qerr)?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await.map_err(qerr)?;
        Ok(Self { pool })
    }

    /// Convenience: a queue database file inside `dir`.
    pub async fn open_in_dir(dir: &Path) -> Result<Self> {
        let path = dir.join("queue.db");
        Self::connect(&format!("sqlite:{}", path.display())).await
    }

    // ----- jobs -----

    /// Append a job with status `queued` at the tail of the FIFO.
    pub async fn enqueue(&self, job: &JobSpec) -> Result<()> {
        let payload = serde_json::to_string(job).map_err(qerr)?;
        sqlx::query(
            "INSERT INTO scan_job (job_id, scan_id, chunk_id, payload, status, phase, created_at) \
             VALUES (?1, ?2, ?3, ?4, 'queued', 'Queued', ?5)",
        )
        .bind(&job.job_id)
        .bind(&job.scan_id)
        .bind(&job.chunk_id)
        .bind(payload)
        .bind(ts(job.created_at))
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        tracing::info!(job_id = %job.job_id, chunk_id = %job.chunk_id, "queue.enqueue");
        Ok(())
    }

    /// Atomically pop the oldest queued job, stamping the worker and start
    /// time. Blocks up to `timeout`, then returns `None`.
    pub async fn reserve(&self, worker_id: &str, timeout: Duration) -> Result<Option<JobSpec>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let row = sqlx::query(
                "UPDATE scan_job SET status = 'running', worker_id = ?1, started_at = ?2 \
                 WHERE job_id = (SELECT job_id FROM scan_job WHERE status = 'queued' \
                                 ORDER BY rowid LIMIT 1) \
                   AND status = 'queued' \
                 RETURNING payload",
            )
            .bind(worker_id)
            .bind(ts(Utc::now()))
            .fetch_optional(&self.pool)
            .await
            .map_err(qerr)?;

            if let Some(row) = row {
                let payload: String = row.try_get("payload").map_err(qerr)?;
                let job: JobSpec = serde_json::from_str(&payload).map_err(qerr)?;
                tracing::info!(job_id = %job.job_id, worker_id, "queue.reserve");
                return Ok(Some(job));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RESERVE_POLL).await;
        }
    }

    /// Monotonic progress/phase update; writes after a terminal
    /// transition are dropped.
    pub async fn update_progress(&self, job_id: &str, progress: u8, phase: &str) -> Result<()> {
        sqlx::query(
            "UPDATE scan_job SET progress = MAX(progress, ?2), phase = ?3 \
             WHERE job_id = ?1 AND status = 'running'",
        )
        .bind(job_id)
        .bind(progress as i64)
        .bind(phase)
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        Ok(())
    }

    /// Store the job's findings blob. Chunk ids are unique, so a repeat
    /// write from a redelivered job simply overwrites the same content.
    pub async fn write_result(&self, job_id: &str, findings_json: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO scan_result (job_id, findings, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(job_id) DO UPDATE SET findings = excluded.findings",
        )
        .bind(job_id)
        .bind(findings_json)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        Ok(())
    }

    pub async fn result(&self, job_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT findings FROM scan_result WHERE job_id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(qerr)?;
        row.map(|r| r.try_get::<String, _>("findings").map_err(qerr))
            .transpose()
    }

    /// `running → completed`. Returns false when the job had already
    /// reached a terminal status (e.g. cancelled under the worker).
    pub async fn mark_completed(&self, job_id: &str, findings_count: u32) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE scan_job SET status = 'completed', progress = 100, phase = 'Completed', \
             findings_count = ?2, completed_at = ?3 \
             WHERE job_id = ?1 AND status = 'running'",
        )
        .bind(job_id)
        .bind(findings_count as i64)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        Ok(res.rows_affected() > 0)
    }

    /// `queued|running → failed` with a message.
    pub async fn mark_failed(&self, job_id: &str, error: &str) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE scan_job SET status = 'failed', phase = 'Failed', error = ?2, \
             completed_at = ?3 \
             WHERE job_id = ?1 AND status IN ('queued', 'running')",
        )
        .bind(job_id)
        .bind(error)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        Ok(res.rows_affected() > 0)
    }

    /// Flip every non-terminal job of a scan to `cancelled`.
    pub async fn cancel_scan(&self, scan_id: &str) -> Result<u64> {
        let res = sqlx::query(
            "UPDATE scan_job SET status = 'cancelled', phase = 'Cancelled', completed_at = ?2 \
             WHERE scan_id = ?1 AND status IN ('queued', 'running')",
        )
        .bind(scan_id)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        tracing::info!(scan_id, cancelled = res.rows_affected(), "queue.cancel_scan");
        Ok(res.rows_affected())
    }

    pub async fn job_state(&self, job_id: &str) -> Result<Option<JobState>> {
        let row = sqlx::query("SELECT * FROM scan_job WHERE job_id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(qerr)?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    /// Every job of a scan, in enqueue order.
    pub async fn scan_jobs(&self, scan_id: &str) -> Result<Vec<JobState>> {
        let rows = sqlx::query("SELECT * FROM scan_job WHERE scan_id = ?1 ORDER BY rowid")
            .bind(scan_id)
            .fetch_all(&self.pool)
            .await
            .map_err(qerr)?;
        rows.iter().map(job_from_row).collect()
    }

    /// Drop jobs older than `ttl` together with their result blobs, and
    /// worker registrations that went quiet for as long.
    pub async fn cleanup_expired(&self, ttl: Duration) -> Result<u64> {
        let ttl = chrono::Duration::from_std(ttl).map_err(qerr)?;
        let cutoff = ts(Utc::now() - ttl);

        let results = sqlx::query(
            "DELETE FROM scan_result WHERE job_id IN \
             (SELECT job_id FROM scan_job WHERE created_at < ?1)",
        )
        .bind(&cutoff)
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        let jobs = sqlx::query("DELETE FROM scan_job WHERE created_at < ?1")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        let workers = sqlx::query("DELETE FROM scanner_worker WHERE last_update < ?1")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;

        let removed = jobs.rows_affected() + workers.rows_affected();
        if removed > 0 {
            tracing::info!(
                jobs = jobs.rows_affected(),
                results = results.rows_affected(),
                workers = workers.rows_affected(),
                "queue.cleanup"
            );
        }
        Ok(removed)
    }

    // ----- worker registry -----

    pub async fn register_worker(&self, worker_id: &str) -> Result<()> {
        let now = ts(Utc::now());
        sqlx::query(
            "INSERT INTO scanner_worker (worker_id, status, started_at, last_update) \
             VALUES (?1, 'ready', ?2, ?2) \
             ON CONFLICT(worker_id) DO UPDATE SET status = 'ready', last_update = excluded.last_update",
        )
        .bind(worker_id)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        tracing::info!(worker_id, "queue.worker_registered");
        Ok(())
    }

    pub async fn update_worker(
        &self,
        worker_id: &str,
        status: &str,
        current_job: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scanner_worker SET status = ?2, current_job = ?3, last_update = ?4 \
             WHERE worker_id = ?1",
        )
        .bind(worker_id)
        .bind(status)
        .bind(current_job)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        Ok(())
    }

    pub async fn deregister_worker(&self, worker_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scanner_worker WHERE worker_id = ?1")
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        Ok(())
    }

    pub async fn workers(&self) -> Result<Vec<WorkerInfo>> {
        let rows = sqlx::query("SELECT * FROM scanner_worker ORDER BY worker_id")
            .fetch_all(&self.pool)
            .await
            .map_err(qerr)?;
        rows.iter()
            .map(|r| {
                Ok(WorkerInfo {
                    worker_id: r.try_get("worker_id").map_err(qerr)?,
                    status: r.try_get("status").map_err(qerr)?,
                    current_job: r.try_get("current_job").map_err(qerr)?,
                    started_at: parse_ts(&r.try_get::<String, _>("started_at").map_err(qerr)?)
                        .unwrap_or_else(Utc::now),
                    last_update: parse_ts(&r.try_get::<String, _>("last_update").map_err(qerr)?)
                        .unwrap_or_else(Utc::now),
                })
            })
            .collect()
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let queued: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM scan_job WHERE status = 'queued'")
                .fetch_one(&self.pool)
                .await
                .map_err(qerr)?
                .try_get("n")
                .map_err(qerr)?;
        let workers = self.workers().await?;
        let processing = workers.iter().filter(|w| w.status == "processing").count() as u64;
        let active = workers.len() as u64;
        Ok(QueueStats {
            queue_length: queued as u64,
            active_workers: active,
            processing_workers: processing,
            waiting_workers: active - processing,
        })
    }

    // ----- scan records (orchestrator-owned) -----

    pub async fn insert_scan(&self, rec: &ScanRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO scan_record (scan_id, server_url, spec_ref, dangerous, fuzz_auth, \
             total_chunks, completed_chunks, status, progress, findings_count, error, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&rec.scan_id)
        .bind(&rec.server_url)
        .bind(&rec.spec_ref)
        .bind(rec.dangerous as i64)
        .bind(rec.fuzz_auth as i64)
        .bind(rec.total_chunks as i64)
        .bind(rec.completed_chunks as i64)
        .bind(rec.status.as_str())
        .bind(rec.progress as i64)
        .bind(rec.findings_count as i64)
        .bind(rec.error.as_deref())
        .bind(ts(rec.created_at))
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        Ok(())
    }

    pub async fn update_scan(
        &self,
        scan_id: &str,
        status: ScanStatus,
        progress: u8,
        completed_chunks: u32,
        findings_count: u32,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scan_record SET status = ?2, progress = ?3, completed_chunks = ?4, \
             findings_count = ?5, error = COALESCE(?6, error) \
             WHERE scan_id = ?1",
        )
        .bind(scan_id)
        .bind(status.as_str())
        .bind(progress as i64)
        .bind(completed_chunks as i64)
        .bind(findings_count as i64)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        Ok(())
    }

    pub async fn scan_record(&self, scan_id: &str) -> Result<Option<ScanRecord>> {
        let row = sqlx::query("SELECT * FROM scan_record WHERE scan_id = ?1")
            .bind(scan_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(qerr)?;
        row.map(|r| {
            Ok(ScanRecord {
                scan_id: r.try_get("scan_id").map_err(qerr)?,
                server_url: r.try_get("server_url").map_err(qerr)?,
                spec_ref: r.try_get("spec_ref").map_err(qerr)?,
                dangerous: r.try_get::<i64, _>("dangerous").map_err(qerr)? != 0,
                fuzz_auth: r.try_get::<i64, _>("fuzz_auth").map_err(qerr)? != 0,
                total_chunks: r.try_get::<i64, _>("total_chunks").map_err(qerr)? as u32,
                completed_chunks: r.try_get::<i64, _>("completed_chunks").map_err(qerr)? as u32,
                status: ScanStatus::parse(&r.try_get::<String, _>("status").map_err(qerr)?)
                    .unwrap_or(ScanStatus::Pending),
                progress: r.try_get::<i64, _>("progress").map_err(qerr)? as u8,
                findings_count: r.try_get::<i64, _>("findings_count").map_err(qerr)? as u32,
                error: r.try_get("error").map_err(qerr)?,
                created_at: parse_ts(&r.try_get::<String, _>("created_at").map_err(qerr)?)
                    .unwrap_or_else(Utc::now),
            })
        })
        .transpose()
    }
}

fn job_from_row(row: &SqliteRow) -> Result<JobState> {
    let status_raw: String = row.try_get("status").map_err(qerr)?;
    Ok(JobState {
        job_id: row.try_get("job_id").map_err(qerr)?,
        scan_id: row.try_get("scan_id").map_err(qerr)?,
        chunk_id: row.try_get("chunk_id").map_err(qerr)?,
        status: JobStatus::parse(&status_raw)
            .ok_or_else(|| ScanError::Queue(format!("unknown job status {status_raw:?}")))?,
        progress: row.try_get::<i64, _>("progress").map_err(qerr)? as u8,
        phase: row.try_get("phase").map_err(qerr)?,
        worker_id: row.try_get("worker_id").map_err(qerr)?,
        findings_count: row.try_get::<i64, _>("findings_count").map_err(qerr)? as u32,
        error: row.try_get("error").map_err(qerr)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(qerr)?)
            .unwrap_or_else(Utc::now),
        started_at: row
            .try_get::<Option<String>, _>("started_at")
            .map_err(qerr)?
            .as_deref()
            .and_then(parse_ts),
        completed_at: row
            .try_get::<Option<String>, _>("completed_at")
            .map_err(qerr)?
            .as_deref()
            .and_then(parse_ts),
    })
}
