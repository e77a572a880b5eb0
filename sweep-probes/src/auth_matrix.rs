//! API2: broken authentication.
//!
//! Each readable endpoint is exercised with no credentials, a bogus
//! bearer token, and (fuzz-auth only) default Basic credentials. Any
//! success means the endpoint does not enforce authentication.

use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::{basic_default_header, RequestOpts, BOGUS_BEARER};

use crate::{finding, ProbeCtx, READ_OK};

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    let targets = ctx
        .spec
        .endpoints
        .iter()
        .filter(|e| e.method == "GET" || e.method == "HEAD");

    for ep in targets {
        ctx.checkpoint()?;
        let url = ep.url(ctx.base);

        let unauth = ctx.client.send("GET", &url, RequestOpts::default()).await?;
        let bogus = ctx
            .client
            .send(
                "GET",
                &url,
                RequestOpts::default().header("Authorization", BOGUS_BEARER),
            )
            .await?;
        let basic = if ctx.flags.fuzz_auth {
            let (name, value) = basic_default_header();
            Some(
                ctx.client
                    .send("GET", &url, RequestOpts::default().header(name, value))
                    .await?,
            )
        } else {
            None
        };

        let mut variants = vec![("unauth", &unauth), ("bogus", &bogus)];
        if let Some(basic) = &basic {
            variants.push(("basic_default", basic));
        }
        let Some((label, hit)) = variants
            .iter()
            .find(|(_, x)| READ_OK.contains(&x.status()))
            .copied()
        else {
            continue;
        };
        tracing::info!(endpoint = %ep.path, variant = label, "probe.auth_matrix.hit");

        let mut evidence =
            Evidence::capture(hit.request.clone(), Some(hit.response.clone()), "AuthMatrix")
                .auth_context(format!("Credential matrix against {} ({label})", ep.path))
                .why(format!(
                    "{} answered {} to the '{label}' credential variant; valid \
                     authentication is not required to read this endpoint.",
                    ep.path,
                    hit.status()
                ))
                .scenario(
                    "An attacker calls the endpoint directly with no or garbage credentials \
                     and receives the same data an authenticated user would.",
                )
                .steps(vec![
                    format!("Send GET {url} with no Authorization header"),
                    "Send the same request with a bogus bearer token".to_string(),
                    format!("Observe success ({}) for the '{label}' variant", hit.status()),
                ])
                .references(RuleId::Api2);
        for (label, xchg) in &variants {
            evidence = evidence.extra(*label, xchg.response.summary());
        }

        findings.push(finding(
            RuleId::Api2,
            &ep.path,
            &ep.method,
            "Endpoint returns success for unauthenticated/invalid credentials requests.",
            evidence,
        ));
    }
    Ok(findings)
}
