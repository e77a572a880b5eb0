//! API9: improper inventory management.
//!
//! Two candidate families: undocumented methods on documented GET paths,
//! and common hidden sibling segments (`/debug`, `/_search`, …) appended
//! to documented paths. Any success on an undocumented candidate is a
//! finding.

use std::collections::HashSet;

use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::RequestOpts;

use crate::{finding, ProbeCtx, ACTION_OK};

const ALT_METHODS: [&str; 4] = ["HEAD", "POST", "PUT", "DELETE"];
const COMMON_SIBLINGS: [&str; 7] = ["search", "_search", "export", "debug", "internal", "v1", "v2"];
const MAX_GUESS_PATHS: usize = 50;

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    let documented: HashSet<(&str, &str)> = ctx
        .spec
        .endpoints
        .iter()
        .map(|e| (e.method.as_str(), e.path.as_str()))
        .collect();
    let known_paths: HashSet<&str> = ctx.spec.endpoints.iter().map(|e| e.path.as_str()).collect();

    // 1) Alternate methods on documented GET paths.
    for ep in ctx.spec.endpoints.iter().filter(|e| e.method == "GET") {
        for alt in ALT_METHODS {
            if documented.contains(&(alt, ep.path.as_str())) {
                continue;
            }
            ctx.checkpoint()?;
            let xchg = ctx
                .client
                .send(alt, &ep.url(ctx.base), RequestOpts::default())
                .await?;
            if !ACTION_OK.contains(&xchg.status()) {
                continue;
            }
            tracing::info!(endpoint = %ep.path, method = alt, "probe.inventory.hit");

            let evidence =
                Evidence::capture(xchg.request.clone(), Some(xchg.response.clone()), "Inventory")
                    .auth_context(format!(
                        "Undocumented {alt} against documented GET path {}",
                        ep.path
                    ))
                    .why(format!(
                        "{} is documented for GET only, yet {alt} returned {}; the extra \
                         method lives outside the API inventory and may skip the controls \
                         the documented surface has.",
                        ep.path,
                        xchg.status()
                    ))
                    .scenario(format!(
                        "An attacker enumerates verbs on known paths and finds a working \
                         {alt} that nobody monitors, rate-limits, or authenticates."
                    ))
                    .steps(vec![
                        format!("Documented endpoint: GET {}", ep.path),
                        format!("Send {alt} to the same path"),
                        format!("Server responds {}", xchg.status()),
                    ])
                    .references(RuleId::Api9);
            findings.push(finding(
                RuleId::Api9,
                &ep.path,
                alt,
                "Endpoint appears to support an undocumented method.",
                evidence,
            ));
        }
    }

    // 2) Guess common hidden sibling paths, in spec order.
    let mut ordered_paths = Vec::new();
    let mut seen = HashSet::new();
    for ep in &ctx.spec.endpoints {
        if seen.insert(ep.path.as_str()) {
            ordered_paths.push(ep.path.as_str());
        }
    }

    for path in ordered_paths.into_iter().take(MAX_GUESS_PATHS) {
        for suffix in COMMON_SIBLINGS {
            let guess = format!("{}/{suffix}", path.trim_end_matches('/')).replace("//", "/");
            if known_paths.contains(guess.as_str()) {
                continue;
            }
            ctx.checkpoint()?;
            let url = format!("{}{}", ctx.base.trim_end_matches('/'), guess);
            let xchg = ctx.client.send("GET", &url, RequestOpts::default()).await?;
            if !ACTION_OK.contains(&xchg.status()) {
                continue;
            }
            tracing::info!(endpoint = %guess, "probe.inventory.hit");

            let evidence =
                Evidence::capture(xchg.request.clone(), Some(xchg.response.clone()), "Inventory")
                    .auth_context(format!(
                        "Hidden-endpoint discovery for {guess} (derived from {path})"
                    ))
                    .why(format!(
                        "{guess} answers {} but is absent from the specification. Segments \
                         like /debug or /internal are typically developer tooling that \
                         bypasses the documented security posture.",
                        xchg.status()
                    ))
                    .scenario(
                        "An attacker fuzzes common suffixes on documented paths and lands \
                         on operational endpoints that were never inventoried or locked \
                         down.",
                    )
                    .steps(vec![
                        format!("Start from the documented path {path}"),
                        format!("Append the common suffix to get {guess}"),
                        format!("GET {guess} responds {}", xchg.status()),
                    ])
                    .references(RuleId::Api9);
            findings.push(finding(
                RuleId::Api9,
                &guess,
                "GET",
                "Potential undocumented endpoint responded with success.",
                evidence,
            ));
        }
    }
    Ok(findings)
}
