//! API7: security misconfiguration: plaintext base URLs, permissive
//! CORS, and missing HSTS.

use sweep_common::evidence::RequestRecord;
use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::RequestOpts;

use crate::{finding, ProbeCtx};

const PREFLIGHT_ORIGIN: &str = "https://scanner.example";

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    let base = ctx.base.to_ascii_lowercase();

    // 1) Plain HTTP base URL: no request needed, the configuration itself
    //    is the evidence.
    if base.starts_with("http://") {
        let request = RequestRecord {
            method: "GET".to_string(),
            url: ctx.base.to_string(),
            ..Default::default()
        };
        let evidence = Evidence::capture(request, None, "Misconfig")
            .auth_context("Configuration analysis - no request sent")
            .why(format!(
                "The API accepts plaintext HTTP connections ({}); credentials, tokens and \
                 PII travel unencrypted and can be intercepted in transit.",
                ctx.base
            ))
            .scenario(
                "An attacker on the network path (open WiFi, compromised router) captures \
                 API traffic in cleartext and lifts tokens and session cookies from it.",
            )
            .steps(vec![
                format!("Observe the server base URL: {}", ctx.base),
                "The server speaks HTTP without TLS".to_string(),
                "Capture traffic on a shared network segment to read it".to_string(),
            ])
            .references(RuleId::Api7);
        findings.push(finding(
            RuleId::Api7,
            "/",
            "GET",
            "Server base URL uses plaintext HTTP (no TLS).",
            evidence,
        ));
    }

    // 2) CORS / HSTS via a preflight on a representative GET endpoint.
    let Some(target) = ctx.spec.endpoints.iter().find(|e| e.method == "GET") else {
        return Ok(findings);
    };
    ctx.checkpoint()?;
    let xchg = ctx
        .client
        .send(
            "OPTIONS",
            &target.url(ctx.base),
            RequestOpts::default()
                .header("Origin", PREFLIGHT_ORIGIN)
                .header("Access-Control-Request-Method", "GET"),
        )
        .await?;
    if xchg.is_unreachable() {
        return Ok(findings);
    }

    let permissive_cors = xchg.header("Access-Control-Allow-Origin") == Some("*")
        && xchg
            .header("Access-Control-Allow-Credentials")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let hsts_missing =
        base.starts_with("https://") && xchg.header("Strict-Transport-Security").is_none();
    if !(permissive_cors || hsts_missing) {
        return Ok(findings);
    }
    tracing::info!(
        endpoint = %target.path,
        permissive_cors,
        hsts_missing,
        "probe.misconfig.hit"
    );

    let mut issues = Vec::new();
    if permissive_cors {
        issues.push("CORS allows any origin with credentials=true".to_string());
    }
    if hsts_missing {
        issues.push("Missing Strict-Transport-Security header on HTTPS endpoint".to_string());
    }

    let evidence = Evidence::capture(xchg.request.clone(), Some(xchg.response.clone()), "Misconfig")
        .auth_context(format!(
            "CORS preflight and security headers on {}",
            target.path
        ))
        .why(format!(
            "Security misconfiguration detected: {}. Permissive CORS lets hostile \
             origins ride the victim's credentials; missing HSTS allows protocol \
             downgrade.",
            issues.join("; ")
        ))
        .scenario(
            "A malicious site issues cross-origin requests with the victim's cookies, or \
             a network attacker downgrades the first HTTPS connection to HTTP.",
        )
        .steps(vec![
            format!(
                "Send OPTIONS {} with Origin: {PREFLIGHT_ORIGIN} and \
                 Access-Control-Request-Method: GET",
                target.path
            ),
            format!("Observe response status {}", xchg.status()),
            format!("Issues: {}", issues.join("; ")),
        ])
        .references(RuleId::Api7);

    findings.push(finding(
        RuleId::Api7,
        &target.path,
        "OPTIONS",
        "Potential security misconfiguration (permissive CORS and/or missing HSTS).",
        evidence,
    ));
    Ok(findings)
}
