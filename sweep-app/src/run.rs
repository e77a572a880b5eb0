//! Wiring for the CLI: config overlay, queue + worker startup, scan
//! execution, findings export, exit-code mapping.

use anyhow::Context;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sweep_common::ScanError;
use sweep_config::{SweepConfig, SweepConfigLoader, validate_budget, validate_rate};
use sweep_engine::{Orchestrator, ScanRequest, Worker};
use sweep_queue::{JobQueue, ScanStatus};
use sweep_spec::{SpecSource, load_spec};

use crate::{CleanupArgs, ScanArgs};

/// Invalid arguments exit with 2, matching the argument parser itself.
fn usage_error(message: &str) -> anyhow::Result<ExitCode> {
    eprintln!("sweep: {message}");
    Ok(ExitCode::from(2))
}

pub async fn scan(args: ScanArgs) -> anyhow::Result<ExitCode> {
    let cfg: SweepConfig = match &args.config {
        Some(path) => SweepConfigLoader::new().with_file(path).load()?,
        None => SweepConfigLoader::new().load()?,
    };

    let Some(spec_ref) = args.spec.clone().or_else(|| cfg.spec.clone()) else {
        return usage_error("an OpenAPI spec is required (--spec or config `spec`)");
    };

    let rate = args.rate.or(cfg.rate).unwrap_or(1.0);
    let budget = args.max_requests.or(cfg.request_budget).unwrap_or(400);
    if let Err(e) = validate_rate(rate) {
        return usage_error(&e.to_string());
    }
    if let Err(e) = validate_budget(budget) {
        return usage_error(&e.to_string());
    }

    // fall back to the spec's first server when no base URL is supplied
    let server_url = match args.server.clone().or_else(|| cfg.server_url.clone()) {
        Some(url) => url,
        None => {
            let snapshot = load_spec(&SpecSource::detect(&spec_ref)).await?;
            match snapshot.default_server() {
                Some(url) => url.to_string(),
                None => return usage_error("no server URL given and the spec lists none"),
            }
        }
    };

    tokio::fs::create_dir_all(&args.out)
        .await
        .with_context(|| format!("creating output directory {}", args.out.display()))?;
    let queue = JobQueue::open_in_dir(&args.out).await?;

    let shutdown = CancellationToken::new();
    let worker_count = args.workers.or(cfg.workers).unwrap_or(2).max(1);
    let request_timeout = Duration::from_secs(cfg.request_timeout_secs.unwrap_or(12));
    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let worker = Worker::new(queue.clone()).with_request_timeout(request_timeout);
        workers.push(tokio::spawn(worker.run(shutdown.clone())));
    }

    let mut orchestrator = Orchestrator::new(queue.clone(), args.out.clone());
    if let Some(chunk_size) = cfg.chunk_size {
        orchestrator = orchestrator.with_chunk_size(chunk_size);
    }
    if let Some(secs) = cfg.job_timeout_secs {
        orchestrator = orchestrator.with_job_timeout(Duration::from_secs(secs));
    }

    let request = ScanRequest {
        server_url: server_url.clone(),
        spec_ref,
        rate,
        request_budget: budget,
        dangerous: args.dangerous || cfg.dangerous.unwrap_or(false),
        fuzz_auth: args.fuzz_auth || cfg.fuzz_auth.unwrap_or(false),
    };

    let scan_id = match orchestrator.start(&request).await {
        Ok(id) => id,
        Err(ScanError::InvalidParams(message)) => {
            shutdown.cancel();
            return usage_error(&message);
        }
        Err(e) => {
            shutdown.cancel();
            return Err(e.into());
        }
    };
    tracing::info!(scan_id = %scan_id, server = %server_url, "sweep.scan_started");

    let outcome = tokio::select! {
        res = orchestrator.wait(&scan_id) => res?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("sweep: cancelling scan {scan_id}");
            orchestrator.cancel(&scan_id).await?;
            orchestrator.wait(&scan_id).await?
        }
    };

    shutdown.cancel();
    for handle in workers {
        let _ = handle.await;
    }

    // opportunistic TTL sweep of the queue we own
    let ttl = Duration::from_secs(cfg.job_ttl_hours.unwrap_or(24) * 3600);
    if let Err(e) = queue.cleanup_expired(ttl).await {
        tracing::warn!(error = %e, "sweep.cleanup_failed");
    }

    let findings_path = args.out.join("findings.json");
    tokio::fs::write(&findings_path, serde_json::to_vec_pretty(&outcome.findings)?)
        .await
        .with_context(|| format!("writing {}", findings_path.display()))?;

    println!("scan {} {}", outcome.scan_id, outcome.status);
    for job in &outcome.jobs {
        let suffix = job
            .error
            .as_deref()
            .map(|e| format!(" ({e})"))
            .unwrap_or_default();
        println!("  chunk {}: {}{suffix}", job.chunk_id, job.status);
    }
    println!(
        "{} finding(s) written to {}",
        outcome.findings.len(),
        findings_path.display()
    );
    for f in &outcome.findings {
        println!(
            "  [{}] {} {} {} - {}",
            f.severity, f.rule, f.method, f.endpoint, f.title
        );
    }
    if let Some(error) = &outcome.error {
        eprintln!("sweep: {error}");
    }

    Ok(if outcome.status == ScanStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

pub async fn cleanup(args: CleanupArgs) -> anyhow::Result<ExitCode> {
    let queue = JobQueue::connect(&format!("sqlite:{}", args.queue.display())).await?;
    let removed = queue
        .cleanup_expired(Duration::from_secs(args.ttl_hours * 3600))
        .await?;
    println!("removed {removed} expired record(s)");
    Ok(ExitCode::SUCCESS)
}
