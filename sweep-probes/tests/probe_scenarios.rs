//! End-to-end probe scenarios against a stub server.

use httpmock::prelude::*;
use tokio_util::sync::CancellationToken;

use sweep_common::{RuleId, ScanError, Severity};
use sweep_http::{AuthContext, ScanClient};
use sweep_probes::{auth_matrix, bola, exposure, injection, inventory, ratelimit};
use sweep_probes::{ProbeCtx, ScanFlags};
use sweep_spec::{load_spec, SpecSnapshot, SpecSource};

async fn snapshot(yaml: &str) -> SpecSnapshot {
    load_spec(&SpecSource::Inline(yaml.to_string()))
        .await
        .expect("scenario spec loads")
}

fn spec_yaml(paths: &str) -> String {
    format!(
        r#"
openapi: "3.0.0"
info:
  title: Scenario API
  version: "1.0"
components:
  securitySchemes:
    bearerAuth:
      type: http
      scheme: bearer
paths:
{paths}
"#
    )
}

fn probe_ctx<'a>(
    spec: &'a SpecSnapshot,
    client: &'a ScanClient,
    auth: &'a AuthContext,
    base: &'a str,
) -> ProbeCtx<'a> {
    ProbeCtx {
        spec,
        client,
        auth,
        base,
        flags: ScanFlags::default(),
        cancel: CancellationToken::new(),
    }
}

fn fast_client(base: &str) -> ScanClient {
    ScanClient::new(base).unwrap().with_rate(1000.0)
}

#[tokio::test]
async fn s1_bola_positive() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/items/1");
            then.status(200).body("{\"id\":1}");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/items/2");
            then.status(200).body("{\"id\":2}");
        })
        .await;

    let spec = snapshot(&spec_yaml(
        r#"  /items/{id}:
    get:
      responses:
        "200": { description: ok }"#,
    ))
    .await;
    let base = server.base_url();
    let client = fast_client(&base);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let findings = bola::run(&probe_ctx(&spec, &client, &auth, &base))
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    let f = &findings[0];
    assert_eq!(f.rule, RuleId::Api1);
    assert_eq!(f.score, 8.1);
    assert_eq!(f.severity, Severity::High);
    assert_eq!(f.endpoint, "/items/{id}");
    assert_eq!(f.method, "GET");
    assert_eq!(f.evidence.request.method, "GET");
    assert!(f.evidence.extra.contains_key("response_id_1"));
    assert!(f.evidence.extra.contains_key("response_id_2"));
}

#[tokio::test]
async fn s2_broken_auth_on_secured_endpoint() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/secret");
            then.status(200).body("top secret");
        })
        .await;

    let spec = snapshot(&spec_yaml(
        r#"  /secret:
    get:
      security:
        - bearerAuth: []
      responses:
        "200": { description: ok }"#,
    ))
    .await;
    let base = server.base_url();
    let client = fast_client(&base);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let findings = auth_matrix::run(&probe_ctx(&spec, &client, &auth, &base))
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].rule, RuleId::Api2);
    assert_eq!(findings[0].severity, Severity::High);
    // the evidence curl must not leak the bogus bearer value
    assert!(findings[0].evidence.extra.contains_key("unauth"));
    assert!(findings[0].evidence.extra.contains_key("bogus"));
}

#[tokio::test]
async fn s3_missing_rate_limit_fires_once() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).body("ok");
        })
        .await;

    let spec = snapshot(&spec_yaml(
        r#"  /health:
    get:
      responses:
        "200": { description: ok }"#,
    ))
    .await;
    let base = server.base_url();
    let client = fast_client(&base);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let findings = ratelimit::run(&probe_ctx(&spec, &client, &auth, &base))
        .await
        .unwrap();

    assert_eq!(mock.hits_async().await, 15);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].rule, RuleId::Api4);
}

#[tokio::test]
async fn s3_rate_limit_headers_suppress_the_finding() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).header("X-RateLimit-Remaining", "10").body("ok");
        })
        .await;

    let spec = snapshot(&spec_yaml(
        r#"  /health:
    get:
      responses:
        "200": { description: ok }"#,
    ))
    .await;
    let base = server.base_url();
    let client = fast_client(&base);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let findings = ratelimit::run(&probe_ctx(&spec, &client, &auth, &base))
        .await
        .unwrap();
    assert!(findings.is_empty());
}

#[tokio::test]
async fn s4_sensitive_exposure_names_the_keys() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/users");
            then.status(200)
                .body("[{\"id\":1,\"email\":\"a@b\",\"password_hash\":\"x\"}]");
        })
        .await;

    let spec = snapshot(&spec_yaml(
        r#"  /users:
    get:
      responses:
        "200": { description: ok }"#,
    ))
    .await;
    let base = server.base_url();
    let client = fast_client(&base);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let findings = exposure::run(&probe_ctx(&spec, &client, &auth, &base))
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    let f = &findings[0];
    assert_eq!(f.rule, RuleId::Api3);
    assert!(f.evidence.why_vulnerable.contains("email"));
    assert!(f.evidence.why_vulnerable.contains("password_hash"));
}

#[tokio::test]
async fn s5_injection_via_query_emits_one_finding() {
    let server = MockServer::start_async().await;
    // only the first payload trips the signal; every other request falls
    // through to the mock server's default 404
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/search")
                .query_param("q", "' OR '1'='1");
            then.status(500).body("SQL syntax error near ''1'='1'");
        })
        .await;

    let spec = snapshot(&spec_yaml(
        r#"  /search:
    get:
      responses:
        "200": { description: ok }"#,
    ))
    .await;
    let base = server.base_url();
    let client = fast_client(&base);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let findings = injection::run(&probe_ctx(&spec, &client, &auth, &base))
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    let f = &findings[0];
    assert_eq!(f.rule, RuleId::Api8);
    assert_eq!(
        f.evidence.request.query.get("q").map(String::as_str),
        Some("' OR '1'='1")
    );
}

#[tokio::test]
async fn s6_inventory_flags_the_undocumented_method() {
    let server = MockServer::start_async().await;
    // undocumented methods and sibling guesses fall through to 404
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/admin/users");
            then.status(204);
        })
        .await;

    let spec = snapshot(&spec_yaml(
        r#"  /admin/users:
    get:
      responses:
        "200": { description: ok }"#,
    ))
    .await;
    let base = server.base_url();
    let client = fast_client(&base);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let findings = inventory::run(&probe_ctx(&spec, &client, &auth, &base))
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].rule, RuleId::Api9);
    assert_eq!(findings[0].method, "DELETE");
    assert_eq!(findings[0].endpoint, "/admin/users");
}

#[tokio::test]
async fn s6_documented_delete_is_not_flagged() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/admin/users");
            then.status(204);
        })
        .await;

    let spec = snapshot(&spec_yaml(
        r#"  /admin/users:
    get:
      responses:
        "200": { description: ok }
    delete:
      responses:
        "204": { description: gone }"#,
    ))
    .await;
    let base = server.base_url();
    let client = fast_client(&base);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let findings = inventory::run(&probe_ctx(&spec, &client, &auth, &base))
        .await
        .unwrap();
    assert!(findings.is_empty());
}

#[tokio::test]
async fn probes_return_cancelled_at_the_first_checkpoint() {
    let server = MockServer::start_async().await;
    let spec = snapshot(&spec_yaml(
        r#"  /items/{id}:
    get:
      responses:
        "200": { description: ok }"#,
    ))
    .await;
    let base = server.base_url();
    let client = fast_client(&base);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = ProbeCtx {
        spec: &spec,
        client: &client,
        auth: &auth,
        base: &base,
        flags: ScanFlags::default(),
        cancel,
    };
    let err = bola::run(&ctx).await.unwrap_err();
    assert!(matches!(err, ScanError::Cancelled));
}

#[tokio::test]
async fn budget_exhaustion_propagates_out_of_a_probe() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200).body("{}");
        })
        .await;

    let spec = snapshot(&spec_yaml(
        r#"  /a/{id}:
    get:
      responses:
        "200": { description: ok }
  /b/{id}:
    get:
      responses:
        "200": { description: ok }"#,
    ))
    .await;
    let base = server.base_url();
    let client = ScanClient::new(&base)
        .unwrap()
        .with_rate(1000.0)
        .with_budget(3);
    let auth = AuthContext::new(spec.security_schemes.clone(), false);

    let err = bola::run(&probe_ctx(&spec, &client, &auth, &base))
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::BudgetExhausted));
    assert_eq!(client.used(), 3);
}
