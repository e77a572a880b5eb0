//! API10: insufficient logging & monitoring.
//!
//! Sends a small series of invalid-credential requests and checks whether
//! any correlation headers come back. Success on bad credentials or
//! wildly varying statuses, combined with zero observability headers,
//! suggests the target cannot trace hostile traffic.

use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::{Exchange, RequestOpts, BOGUS_BEARER};

use crate::{finding, ProbeCtx};

const OBS_HEADERS: [&str; 4] = ["X-Request-Id", "X-Correlation-Id", "Trace-Id", "X-Trace-Id"];
const ATTEMPTS: usize = 5;
const SUCCESS: [u16; 4] = [200, 201, 202, 204];

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let Some(target) = ctx.spec.endpoints.iter().find(|e| e.method == "GET") else {
        return Ok(Vec::new());
    };

    let url = target.url(ctx.base);
    let mut exchanges: Vec<Exchange> = Vec::with_capacity(ATTEMPTS);
    for _ in 0..ATTEMPTS {
        ctx.checkpoint()?;
        exchanges.push(
            ctx.client
                .send(
                    "GET",
                    &url,
                    RequestOpts::default().header("Authorization", BOGUS_BEARER),
                )
                .await?,
        );
    }

    let live: Vec<&Exchange> = exchanges.iter().filter(|x| !x.is_unreachable()).collect();
    if live.is_empty() {
        return Ok(Vec::new());
    }

    let statuses: Vec<u16> = live.iter().map(|x| x.status()).collect();
    let success_on_invalid = statuses.iter().any(|s| SUCCESS.contains(s));
    let distinct: std::collections::HashSet<u16> = statuses.iter().copied().collect();
    let inconsistent = distinct.len() >= 3;
    let correlated = live
        .iter()
        .any(|x| OBS_HEADERS.iter().any(|h| x.header(h).is_some()));

    if !((success_on_invalid || inconsistent) && !correlated) {
        return Ok(Vec::new());
    }
    tracing::info!(
        endpoint = %target.path,
        ?statuses,
        success_on_invalid,
        inconsistent,
        "probe.logging.hit"
    );

    let mut issues = Vec::new();
    if success_on_invalid {
        issues.push("accepts invalid authentication tokens".to_string());
    }
    if inconsistent {
        issues.push(format!("returns inconsistent status codes ({statuses:?})"));
    }
    issues.push(format!(
        "no observability headers ({}, …) on any response",
        OBS_HEADERS[..2].join(", ")
    ));

    let sample = live[0];
    let evidence = Evidence::capture(sample.request.clone(), Some(sample.response.clone()), "Logging")
        .auth_context(format!(
            "{ATTEMPTS} requests against {} with an invalid bearer token",
            target.path
        ))
        .why(format!(
            "The endpoint shows poor logging and monitoring hygiene: {}. Without request \
             correlation, hostile traffic cannot be traced or investigated.",
            issues.join("; ")
        ))
        .scenario(
            "An attacker probes with invalid credentials at will; no correlation IDs tie \
             the requests together, so the activity never surfaces in monitoring.",
        )
        .steps(vec![
            format!("Send {ATTEMPTS} GET requests to {} with a bogus bearer token", target.path),
            format!("Observe status codes: {statuses:?}"),
            "No response carries X-Request-Id/X-Correlation-Id/Trace-Id headers".to_string(),
        ])
        .references(RuleId::Api10)
        .extra("observed_statuses", serde_json::json!(statuses));

    Ok(vec![finding(
        RuleId::Api10,
        &target.path,
        "GET",
        "Invalid-auth requests produced success/inconsistent responses without correlation headers.",
        evidence,
    )])
}
