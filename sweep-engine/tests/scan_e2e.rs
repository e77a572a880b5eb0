//! End-to-end scans against a stub server: chunked specs, multiple
//! workers, budget exhaustion, failure surfacing, and cancellation.

use httpmock::prelude::*;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use sweep_common::score::severity_for;
use sweep_common::RuleId;
use sweep_engine::{Orchestrator, ScanRequest, Worker};
use sweep_queue::{JobQueue, JobSpec, JobStatus, ScanStatus};

const FIVE_PATH_SPEC: &str = r#"
openapi: "3.0.0"
info:
  title: Target API
  version: "1.0"
paths:
  /health:
    get:
      responses:
        "200": { description: ok }
  /items/{id}:
    get:
      responses:
        "200": { description: ok }
  /users:
    get:
      responses:
        "200": { description: ok }
  /admin/stats:
    get:
      responses:
        "200": { description: ok }
  /version:
    get:
      responses:
        "200": { description: ok }
"#;

async fn write_spec(tmp: &TempDir, yaml: &str) -> String {
    let path = tmp.path().join("openapi.yaml");
    tokio::fs::write(&path, yaml).await.unwrap();
    path.display().to_string()
}

async fn mount_target(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).body("ok");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/items/1");
            then.status(200).body("{\"id\":1}");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/items/2");
            then.status(200).body("{\"id\":2}");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/users");
            then.status(200)
                .body("[{\"id\":1,\"email\":\"a@b\",\"password_hash\":\"x\"}]");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/admin/stats");
            then.status(200).body("{\"uptime\":1}");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/version");
            then.status(200).body("{\"version\":\"1\"}");
        })
        .await;
}

fn spawn_workers(
    queue: &JobQueue,
    count: usize,
    shutdown: &CancellationToken,
) -> Vec<tokio::task::JoinHandle<sweep_common::Result<()>>> {
    (0..count)
        .map(|i| {
            let worker = Worker::new(queue.clone())
                .with_id(format!("test-worker-{i}"))
                .with_reserve_timeout(Duration::from_millis(200));
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}

#[tokio::test]
async fn multi_chunk_scan_completes_and_aggregates_findings() {
    let server = MockServer::start_async().await;
    mount_target(&server).await;

    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(&tmp, FIVE_PATH_SPEC).await;
    let queue = JobQueue::open_in_dir(tmp.path()).await.unwrap();
    let shutdown = CancellationToken::new();
    let workers = spawn_workers(&queue, 2, &shutdown);

    let orchestrator = Orchestrator::new(queue.clone(), tmp.path().to_path_buf())
        .with_poll_interval(Duration::from_millis(100));
    let mut request = ScanRequest::new(server.base_url(), spec_path);
    request.rate = 10.0;

    let outcome = orchestrator.run(&request).await.unwrap();
    shutdown.cancel();
    for w in workers {
        w.await.unwrap().unwrap();
    }

    assert_eq!(outcome.status, ScanStatus::Completed);
    assert_eq!(outcome.jobs.len(), 2, "5 paths at chunk size 4 => 2 jobs");
    assert!(outcome
        .jobs
        .iter()
        .all(|j| j.status == JobStatus::Completed && j.progress == 100));

    let rules: std::collections::HashSet<RuleId> =
        outcome.findings.iter().map(|f| f.rule).collect();
    for expected in [RuleId::Api1, RuleId::Api2, RuleId::Api3, RuleId::Api4, RuleId::Api5] {
        assert!(rules.contains(&expected), "missing {expected}");
    }

    // severity always matches the scoring table for the numeric score
    for f in &outcome.findings {
        assert_eq!(f.severity, severity_for(f.score), "finding {}", f.rule);
    }

    let record = queue.scan_record(&outcome.scan_id).await.unwrap().unwrap();
    assert_eq!(record.status, ScanStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(record.total_chunks, 2);
    assert_eq!(record.completed_chunks, 2);
    assert_eq!(record.findings_count as usize, outcome.findings.len());
}

#[tokio::test]
async fn budget_exhaustion_is_a_clean_completion() {
    let server = MockServer::start_async().await;
    mount_target(&server).await;

    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(
        &tmp,
        r#"
openapi: "3.0.0"
info:
  title: Tiny API
  version: "1.0"
paths:
  /health:
    get:
      responses:
        "200": { description: ok }
"#,
    )
    .await;
    let queue = JobQueue::open_in_dir(tmp.path()).await.unwrap();
    let shutdown = CancellationToken::new();
    let workers = spawn_workers(&queue, 1, &shutdown);

    let orchestrator = Orchestrator::new(queue.clone(), tmp.path().to_path_buf())
        .with_poll_interval(Duration::from_millis(100));
    let mut request = ScanRequest::new(server.base_url(), spec_path);
    request.rate = 10.0;
    request.request_budget = 5;

    let outcome = orchestrator.run(&request).await.unwrap();
    shutdown.cancel();
    for w in workers {
        w.await.unwrap().unwrap();
    }

    assert_eq!(outcome.status, ScanStatus::Completed);
    assert!(outcome.jobs.iter().all(|j| j.status == JobStatus::Completed));
}

#[tokio::test]
async fn failed_chunk_surfaces_the_first_error() {
    let tmp = TempDir::new().unwrap();
    let queue = JobQueue::open_in_dir(tmp.path()).await.unwrap();

    let job = JobSpec::new(
        "scan-broken",
        0,
        "/no/such/chunk_spec.json".into(),
        "http://127.0.0.1:9".into(),
        1.0,
        400,
        false,
        false,
    );
    queue.enqueue(&job).await.unwrap();

    let shutdown = CancellationToken::new();
    let workers = spawn_workers(&queue, 1, &shutdown);
    let orchestrator = Orchestrator::new(queue.clone(), tmp.path().to_path_buf())
        .with_poll_interval(Duration::from_millis(100));

    let outcome = orchestrator.wait("scan-broken").await.unwrap();
    shutdown.cancel();
    for w in workers {
        w.await.unwrap().unwrap();
    }

    assert_eq!(outcome.status, ScanStatus::Failed);
    let error = outcome.error.expect("first failure message surfaced");
    assert!(error.contains("chunk_spec.json"), "got: {error}");
    assert!(outcome.findings.is_empty());
}

#[tokio::test]
async fn cancelled_scan_terminates_with_cancelled_status() {
    let server = MockServer::start_async().await;
    mount_target(&server).await;

    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(&tmp, FIVE_PATH_SPEC).await;
    let queue = JobQueue::open_in_dir(tmp.path()).await.unwrap();

    // no workers: jobs sit queued until the cancel flips them
    let orchestrator = Orchestrator::new(queue.clone(), tmp.path().to_path_buf())
        .with_poll_interval(Duration::from_millis(100));
    let request = ScanRequest::new(server.base_url(), spec_path);

    let scan_id = orchestrator.start(&request).await.unwrap();
    let flipped = orchestrator.cancel(&scan_id).await.unwrap();
    assert_eq!(flipped, 2);

    let outcome = orchestrator.wait(&scan_id).await.unwrap();
    assert_eq!(outcome.status, ScanStatus::Cancelled);
    assert!(outcome
        .jobs
        .iter()
        .all(|j| j.status == JobStatus::Cancelled));
}

#[tokio::test]
async fn invalid_parameters_are_rejected_before_enqueue() {
    let tmp = TempDir::new().unwrap();
    let queue = JobQueue::open_in_dir(tmp.path()).await.unwrap();
    let orchestrator = Orchestrator::new(queue, tmp.path().to_path_buf());

    let mut request = ScanRequest::new("http://t.local", "missing.yaml");
    request.request_budget = 1000;
    let err = orchestrator.start(&request).await.unwrap_err();
    assert!(matches!(err, sweep_common::ScanError::InvalidParams(_)));
}
