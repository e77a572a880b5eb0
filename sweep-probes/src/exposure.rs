//! API3: excessive data exposure.
//!
//! Fetches readable endpoints and walks the returned JSON for keys that
//! smell like sensitive material. Traversal is depth-first with a depth
//! cap of 64 and only bodies up to 1 MiB are parsed.

use serde_json::Value;
use std::collections::BTreeSet;

use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::RequestOpts;

use crate::{finding, ProbeCtx, READ_OK};

const SENSITIVE_HINTS: [&str; 7] = ["password", "token", "secret", "apikey", "ssn", "dob", "email"];

const MAX_ENDPOINTS: usize = 50;
const MAX_PARSED_BYTES: usize = 1024 * 1024;
const MAX_DEPTH: usize = 64;

/// All string keys at any depth of a JSON document.
pub fn collect_keys(value: &Value) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    walk(value, &mut keys, 0);
    keys
}

fn walk(value: &Value, keys: &mut BTreeSet<String>, depth: usize) {
    if depth >= MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                keys.insert(k.clone());
                walk(v, keys, depth + 1);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, keys, depth + 1);
            }
        }
        _ => {}
    }
}

pub async fn run(ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    let targets = ctx
        .spec
        .endpoints
        .iter()
        .filter(|e| e.method == "GET")
        .take(MAX_ENDPOINTS);

    for ep in targets {
        ctx.checkpoint()?;
        let xchg = ctx
            .client
            .send("GET", &ep.url(ctx.base), RequestOpts::default())
            .await?;
        if !READ_OK.contains(&xchg.status()) || xchg.response.body.len() > MAX_PARSED_BYTES {
            continue;
        }
        let Ok(data) = serde_json::from_str::<Value>(&xchg.response.body) else {
            continue;
        };

        let hints: Vec<String> = collect_keys(&data)
            .into_iter()
            .filter(|k| {
                let k = k.to_ascii_lowercase();
                SENSITIVE_HINTS.iter().any(|h| k.contains(h))
            })
            .collect();
        if hints.is_empty() {
            continue;
        }
        tracing::info!(endpoint = %ep.path, hints = ?hints, "probe.exposure.hit");

        let shown = hints
            .iter()
            .take(5)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let evidence = Evidence::capture(xchg.request.clone(), Some(xchg.response.clone()), "Exposure")
            .auth_context(format!("Plain GET against {}", ep.path))
            .why(format!(
                "Response contains {} potentially sensitive field(s): {shown}. These fields \
                 may expose sensitive user data without filtering or access controls.",
                hints.len()
            ))
            .scenario(
                "A normal GET request returns fields that should be filtered by permission \
                 or redacted entirely; any caller harvests them as-is.",
            )
            .steps(vec![
                format!("Send GET {}", ep.path),
                "Receive success with a JSON payload".to_string(),
                format!("Observe sensitive-looking keys: {shown}"),
            ])
            .references(RuleId::Api3)
            .extra("sensitive_keys", serde_json::json!(hints));

        findings.push(finding(
            RuleId::Api3,
            &ep.path,
            &ep.method,
            "Live response includes sensitive-looking fields.",
            evidence,
        ));
    }
    Ok(findings)
}
