//! API8: injection.
//!
//! A fixed payload set is tried against three channels (query parameter,
//! `User-Agent` header, and, in dangerous mode only, the JSON body). The
//! signal is an error-shaped response body: SQL/ORM exceptions, stack
//! traces, interpreter errors. At most one finding per (endpoint,
//! channel).

use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::{Exchange, RequestOpts};

use crate::{finding, ProbeCtx};

pub const FUZZ_PAYLOADS: [&str; 6] = [
    "' OR '1'='1",
    "\" OR \"1\"=\"1",
    "')--",
    "../../etc/passwd",
    "<script>alert(1)</script>",
    "<?xml version='1.0'?><!DOCTYPE a [<!ENTITY xxe SYSTEM 'file:///etc/passwd'>]><a>&xxe;</a>",
];

const ERROR_PATTERN: &str = r"SQL syntax|SQLSTATE|ORA-\d{5}|mysql_|PDOException|MongoError|Traceback \(most recent call last\)|System\.InvalidOperationException|ReferenceError|TypeError|stack trace";

/// Only the leading slice of a body is scanned.
const SCAN_WINDOW: usize = 4096;

const MAX_ENDPOINTS: usize = 50;

fn error_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(ERROR_PATTERN)
            .case_insensitive(true)
            .build()
            .expect("static pattern compiles")
    })
}

pub fn looks_like_error(body: &str) -> bool {
    let mut cut = body.len().min(SCAN_WINDOW);
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    error_regex().is_match(&body[..cut])
}

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();

    let mut targets: Vec<_> = ctx
        .spec
        .endpoints
        .iter()
        .filter(|e| e.method == "GET")
        .collect();
    if ctx.flags.dangerous {
        targets.extend(
            ctx.spec
                .endpoints
                .iter()
                .filter(|e| matches!(e.method.as_str(), "POST" | "PUT" | "PATCH")),
        );
    }

    for ep in targets.into_iter().take(MAX_ENDPOINTS) {
        ctx.checkpoint()?;
        let url = ep.url(ctx.base);

        // Query channel: stop at the first payload that trips the signal.
        for payload in &FUZZ_PAYLOADS[..4] {
            let xchg = ctx
                .client
                .send(&ep.method, &url, RequestOpts::default().query("q", *payload))
                .await?;
            if !looks_like_error(&xchg.response.body) {
                continue;
            }
            tracing::info!(endpoint = %ep.path, channel = "query", "probe.injection.hit");
            findings.push(query_finding(ep.path.as_str(), &ep.method, payload, &xchg));
            break;
        }

        // Header channel.
        let xchg = ctx
            .client
            .send(
                &ep.method,
                &url,
                RequestOpts::default().header("User-Agent", FUZZ_PAYLOADS[0]),
            )
            .await?;
        if looks_like_error(&xchg.response.body) {
            tracing::info!(endpoint = %ep.path, channel = "header", "probe.injection.hit");
            findings.push(header_finding(ep.path.as_str(), &ep.method, &xchg));
        }

        // Body channel, dangerous mode only.
        if ctx.flags.dangerous && matches!(ep.method.as_str(), "POST" | "PUT" | "PATCH") {
            let xchg = ctx
                .client
                .send(
                    &ep.method,
                    &url,
                    RequestOpts::default().json(serde_json::json!({"name": FUZZ_PAYLOADS[1]})),
                )
                .await?;
            if looks_like_error(&xchg.response.body) {
                tracing::info!(endpoint = %ep.path, channel = "body", "probe.injection.hit");
                findings.push(body_finding(ep.path.as_str(), &ep.method, &xchg));
            }
        }
    }
    Ok(findings)
}

fn query_finding(path: &str, method: &str, payload: &str, xchg: &Exchange) -> Finding {
    let evidence = Evidence::capture(xchg.request.clone(), Some(xchg.response.clone()), "Injection")
        .auth_context("Public endpoint (no authentication required)")
        .why(format!(
            "{path} reflects the query parameter 'q' into error output. The payload \
             {payload:?} produced an error-shaped response (status {}), so the input \
             reaches a parser or query engine unsanitised.",
            xchg.status()
        ))
        .scenario(
            "An attacker refines the query payload into full SQL injection: extracting \
             rows, bypassing filters, or reading files. The leaked error text maps the \
             backend for them.",
        )
        .steps(vec![
            format!("Send {method} {path} with query parameter q={payload}"),
            format!("Response contains database/interpreter error patterns (status {})", xchg.status()),
            "Escalate the payload (UNION SELECT, stacked queries) to extract data".to_string(),
        ])
        .references(RuleId::Api8)
        .extra("channel", serde_json::json!("query"))
        .extra("payload", serde_json::json!(payload));
    finding(
        RuleId::Api8,
        path,
        method,
        "Possible injection via query param (error-like output observed).",
        evidence,
    )
}

fn header_finding(path: &str, method: &str, xchg: &Exchange) -> Finding {
    let evidence = Evidence::capture(xchg.request.clone(), Some(xchg.response.clone()), "Injection")
        .auth_context("Public endpoint (no authentication required)")
        .why(format!(
            "{path} processes the User-Agent header unsafely; the payload {:?} leaked \
             error details in the response.",
            FUZZ_PAYLOADS[0]
        ))
        .scenario(
            "Headers flow into logs and databases without sanitisation; injected \
             payloads fire there (log/SQL injection, XSS in admin dashboards).",
        )
        .steps(vec![
            format!("Send {method} {path} with User-Agent: {}", FUZZ_PAYLOADS[0]),
            format!("Response contains error patterns (status {})", xchg.status()),
            "Repeat with Referer/X-Forwarded-For to find more sinks".to_string(),
        ])
        .references(RuleId::Api8)
        .extra("channel", serde_json::json!("header"));
    finding(
        RuleId::Api8,
        path,
        method,
        "Possible injection via header (error-like output observed).",
        evidence,
    )
}

fn body_finding(path: &str, method: &str, xchg: &Exchange) -> Finding {
    let evidence = Evidence::capture(xchg.request.clone(), Some(xchg.response.clone()), "Injection")
        .auth_context("Public endpoint (no authentication required)")
        .why(format!(
            "{path} accepts JSON but does not sanitise the 'name' field; the payload \
             {:?} triggered an error-shaped response.",
            FUZZ_PAYLOADS[1]
        ))
        .scenario(
            "Create/update endpoints pass JSON values into queries; SQL or NoSQL \
             injection through the body rewrites or exfiltrates stored data.",
        )
        .steps(vec![
            format!("Send {method} {path} with body {{\"name\": {:?}}}", FUZZ_PAYLOADS[1]),
            format!("Response contains error patterns (status {})", xchg.status()),
            "Probe other body fields with SQL/NoSQL payloads".to_string(),
        ])
        .references(RuleId::Api8)
        .extra("channel", serde_json::json!("body"));
    finding(
        RuleId::Api8,
        path,
        method,
        "Possible injection via JSON body (error-like output observed).",
        evidence,
    )
}
