//! API6: mass assignment. Only runs when the dangerous flag is set,
//! since it sends mutating payloads.

use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::RequestOpts;

use crate::{finding, ProbeCtx};

const SENSITIVE_MUTABLE: [&str; 4] = ["role", "isAdmin", "ownerId", "balance"];
const MAX_ENDPOINTS: usize = 25;
const WRITE_OK: [u16; 3] = [200, 201, 202];

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    if !ctx.flags.dangerous {
        return Ok(findings);
    }

    let payload = serde_json::json!({
        "role": true,
        "isAdmin": true,
        "ownerId": true,
        "balance": true,
    });
    let targets = ctx
        .spec
        .endpoints
        .iter()
        .filter(|e| matches!(e.method.as_str(), "POST" | "PUT" | "PATCH"))
        .take(MAX_ENDPOINTS);

    for ep in targets {
        ctx.checkpoint()?;
        let xchg = ctx
            .client
            .send(
                &ep.method,
                &ep.url(ctx.base),
                RequestOpts::default().json(payload.clone()),
            )
            .await?;
        if !WRITE_OK.contains(&xchg.status()) {
            continue;
        }
        tracing::info!(endpoint = %ep.path, method = %ep.method, "probe.mass_assign.hit");

        let fields = SENSITIVE_MUTABLE.join(", ");
        let evidence = Evidence::capture(
            xchg.request.clone(),
            Some(xchg.response.clone()),
            "MassAssignment",
        )
        .auth_context(format!(
            "Mass assignment payload on {} {} (dangerous mode)",
            ep.method, ep.path
        ))
        .why(format!(
            "{} {} accepted a body carrying privileged fields ({fields}) and answered {}; \
             the server binds caller-supplied properties without filtering.",
            ep.method,
            ep.path,
            xchg.status()
        ))
        .scenario(
            "An attacker adds fields like role=admin or balance=999999 to an otherwise \
             legitimate request; blind binding escalates their privileges or rewrites \
             protected attributes.",
        )
        .steps(vec![
            format!("Send {} {} with extra fields: {fields}", ep.method, ep.path),
            format!("Server accepts the request with status {}", xchg.status()),
            "Unauthorized fields are processed without validation".to_string(),
        ])
        .references(RuleId::Api6);

        findings.push(finding(
            RuleId::Api6,
            &ep.path,
            &ep.method,
            "Sent extra sensitive fields; server accepted/echoed them (possible mass assignment).",
            evidence,
        ));
    }
    Ok(findings)
}
