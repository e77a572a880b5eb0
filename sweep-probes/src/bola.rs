//! API1: broken object level authorization.
//!
//! For every GET endpoint with a path template, fetch two distinct object
//! IDs without credentials. Success for both is the signal: the endpoint
//! serves arbitrary objects to anonymous callers.

use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::RequestOpts;

use crate::{finding, ProbeCtx, READ_OK};

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    let targets = ctx
        .spec
        .endpoints
        .iter()
        .filter(|e| e.method == "GET" && e.has_id_param());

    for ep in targets {
        ctx.checkpoint()?;
        let first = ctx
            .client
            .send("GET", &ep.url_with(ctx.base, "1"), RequestOpts::default())
            .await?;
        let second = ctx
            .client
            .send("GET", &ep.url_with(ctx.base, "2"), RequestOpts::default())
            .await?;

        if !(READ_OK.contains(&first.status()) && READ_OK.contains(&second.status())) {
            continue;
        }
        tracing::info!(endpoint = %ep.path, "probe.bola.hit");

        let evidence = Evidence::capture(first.request.clone(), Some(first.response.clone()), "BOLA")
            .auth_context(format!("Unauthenticated object probing on {}", ep.path))
            .why(format!(
                "Object IDs 1 and 2 on {} both returned success ({} and {}) without any \
                 credentials, so object ownership is not checked before serving data.",
                ep.path,
                first.status(),
                second.status()
            ))
            .scenario(
                "An attacker enumerates object identifiers in the path and reads other \
                 users' records one request at a time, without ever authenticating.",
            )
            .steps(vec![
                format!("Send GET {} with the template variable set to 1", ep.path),
                format!("Send GET {} with the template variable set to 2", ep.path),
                "Both requests return success with object payloads".to_string(),
                "No authorization check ties the object to the caller".to_string(),
            ])
            .references(RuleId::Api1)
            .extra("response_id_1", first.response.summary())
            .extra("response_id_2", second.response.summary());

        findings.push(finding(
            RuleId::Api1,
            &ep.path,
            &ep.method,
            "Two distinct object IDs returned success without auth; potential IDOR/BOLA.",
            evidence,
        ));
    }
    Ok(findings)
}
