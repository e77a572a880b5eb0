//! API5: broken function level authorization.
//!
//! Administrative endpoints (path or tag mentions "admin") are invoked
//! once, unauthenticated, with their documented method.

use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::RequestOpts;

use crate::{finding, ProbeCtx, ACTION_OK};

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    let targets = ctx.spec.endpoints.iter().filter(|e| {
        e.path.to_ascii_lowercase().contains("admin")
            || e.tags
                .iter()
                .any(|t| t.to_ascii_lowercase().contains("admin"))
    });

    for ep in targets {
        ctx.checkpoint()?;
        let xchg = ctx
            .client
            .send(&ep.method, &ep.url(ctx.base), RequestOpts::default())
            .await?;
        if !ACTION_OK.contains(&xchg.status()) {
            continue;
        }
        tracing::info!(endpoint = %ep.path, method = %ep.method, "probe.bfla.hit");

        let evidence = Evidence::capture(xchg.request.clone(), Some(xchg.response.clone()), "BFLA")
            .auth_context(format!(
                "Unauthenticated call to admin surface {} {}",
                ep.method, ep.path
            ))
            .why(format!(
                "The admin-tagged endpoint {} {} responded {} to a request carrying no \
                 credentials; function level authorization is missing.",
                ep.method,
                ep.path,
                xchg.status()
            ))
            .scenario(
                "An ordinary or anonymous user invokes administrative functionality \
                 directly, bypassing whatever the UI hides.",
            )
            .steps(vec![
                format!("Send {} {} without credentials", ep.method, ep.path),
                format!("Server responds {} and performs the operation", xchg.status()),
            ])
            .references(RuleId::Api5);

        findings.push(finding(
            RuleId::Api5,
            &ep.path,
            &ep.method,
            "Admin-tagged endpoint succeeded without credentials.",
            evidence,
        ));
    }
    Ok(findings)
}
