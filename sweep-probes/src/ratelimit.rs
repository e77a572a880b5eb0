//! API4: lack of rate limiting.
//!
//! Fires a burst of concurrent requests at one representative endpoint
//! and checks for any throttling signal: an HTTP 429 or rate-limit
//! headers. Siblings run as one structured group; all complete before the
//! probe returns.

use futures::future::join_all;

use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::{Exchange, RequestOpts};

use crate::{finding, ProbeCtx};

const BURST: usize = 15;

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let target = ctx
        .spec
        .endpoints
        .iter()
        .find(|e| e.method == "GET" && (e.path.contains("health") || e.path.contains("status")))
        .or_else(|| ctx.spec.endpoints.iter().find(|e| e.method == "GET"));
    let Some(target) = target else {
        return Ok(Vec::new());
    };
    ctx.checkpoint()?;

    let url = target.url(ctx.base);
    let burst = (0..BURST).map(|_| {
        let client = ctx.client.clone();
        let url = url.clone();
        async move { client.send("GET", &url, RequestOpts::default()).await }
    });
    let mut exchanges: Vec<Exchange> = Vec::with_capacity(BURST);
    for result in join_all(burst).await {
        exchanges.push(result?);
    }

    let live: Vec<&Exchange> = exchanges.iter().filter(|x| !x.is_unreachable()).collect();
    if live.is_empty() {
        return Ok(Vec::new());
    }

    let got_429 = live.iter().any(|x| x.status() == 429);
    let has_headers = live
        .iter()
        .any(|x| x.header("X-RateLimit-Remaining").is_some() || x.header("Retry-After").is_some());
    if got_429 || has_headers {
        return Ok(Vec::new());
    }
    tracing::info!(endpoint = %target.path, burst = BURST, "probe.ratelimit.hit");

    let statuses: Vec<u16> = live.iter().map(|x| x.status()).collect();
    let sample = live[0];
    let evidence = Evidence::capture(
        sample.request.clone(),
        Some(sample.response.clone()),
        "RateLimit",
    )
    .auth_context(format!(
        "Burst of {BURST} concurrent requests against {}",
        target.path
    ))
    .why(format!(
        "{BURST} concurrent requests produced no HTTP 429 and no rate-limit headers \
         (X-RateLimit-*, Retry-After); the endpoint accepts unthrottled traffic."
    ))
    .scenario(
        "An attacker floods the endpoint to exhaust backend resources or to enumerate \
         data rapidly; nothing slows the traffic down.",
    )
    .steps(vec![
        format!("Send {BURST} concurrent GET requests to {}", target.path),
        format!("Observed statuses: {statuses:?}"),
        "No 429 response and no rate-limit headers in any reply".to_string(),
    ])
    .references(RuleId::Api4)
    .extra("burst_statuses", serde_json::json!(statuses));

    Ok(vec![finding(
        RuleId::Api4,
        &target.path,
        &target.method,
        "Burst of requests did not trigger 429 nor expose rate limit headers; RL likely missing.",
        evidence,
    )])
}
