//! Spec loading: fetch, `$ref` resolution, validation, flattening.
//!
//! Resolution is memoised by JSON pointer and tolerates circular schemas:
//! a pointer already on the resolution stack is left in place as its raw
//! `$ref` node instead of being expanded forever.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

use sweep_common::{Result, ScanError};

use crate::model::{Endpoint, SchemeKind, SecurityScheme, SpecSnapshot};

/// Methods recognised when flattening path items; anything else in a path
/// item (summary, parameters, vendor extensions) is skipped.
const METHODS: [&str; 7] = ["get", "post", "put", "patch", "delete", "head", "options"];

/// How many `$ref` hops a single resolution may take.
const MAX_REF_DEPTH: usize = 64;

/// Where a spec document comes from.
#[derive(Debug, Clone)]
pub enum SpecSource {
    Path(PathBuf),
    Url(String),
    Inline(String),
}

impl SpecSource {
    /// Classify a CLI/job reference: URLs by scheme, everything else a path.
    pub fn detect(reference: &str) -> SpecSource {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            SpecSource::Url(reference.to_string())
        } else {
            SpecSource::Path(PathBuf::from(reference))
        }
    }
}

/// Load, resolve, validate, and flatten a spec into a [`SpecSnapshot`].
pub async fn load_spec(source: &SpecSource) -> Result<SpecSnapshot> {
    let doc = load_document(source).await?;
    snapshot_from(&doc)
}

/// Load and resolve a spec to its raw (chunkable) document form.
pub async fn load_document(source: &SpecSource) -> Result<Value> {
    let raw = fetch(source).await?;
    let doc = parse_document(&raw)?;
    let resolved = resolve_refs(&doc)?;
    validate(&resolved)?;
    Ok(resolved)
}

async fn fetch(source: &SpecSource) -> Result<String> {
    match source {
        SpecSource::Inline(text) => Ok(text.clone()),
        SpecSource::Path(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            ScanError::SpecUnreachable(format!("{}: {e}", path.display()))
        }),
        SpecSource::Url(url) => {
            let resp = reqwest::get(url)
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| ScanError::SpecUnreachable(format!("{url}: {e}")))?;
            resp.text()
                .await
                .map_err(|e| ScanError::SpecUnreachable(format!("{url}: {e}")))
        }
    }
}

/// Parse a JSON or YAML spec document into a JSON value.
pub fn parse_document(raw: &str) -> Result<Value> {
    if raw.trim_start().starts_with('{') {
        serde_json::from_str(raw).map_err(|e| ScanError::SpecInvalid(format!("JSON parse: {e}")))
    } else {
        serde_yaml::from_str(raw).map_err(|e| ScanError::SpecInvalid(format!("YAML parse: {e}")))
    }
}

/// Resolve every in-document `#/…` reference, memoised by pointer.
pub fn resolve_refs(doc: &Value) -> Result<Value> {
    let mut memo = HashMap::new();
    let mut stack = Vec::new();
    resolve_node(doc, doc, &mut memo, &mut stack)
}

fn resolve_node(
    root: &Value,
    node: &Value,
    memo: &mut HashMap<String, Value>,
    stack: &mut Vec<String>,
) -> Result<Value> {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                return resolve_reference(root, node, reference, memo, stack);
            }
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_node(root, v, memo, stack)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_node(root, item, memo, stack)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_reference(
    root: &Value,
    node: &Value,
    reference: &str,
    memo: &mut HashMap<String, Value>,
    stack: &mut Vec<String>,
) -> Result<Value> {
    // External references are left to the consumer; only `#/…` is ours.
    if !reference.starts_with("#/") {
        return Ok(node.clone());
    }
    if let Some(cached) = memo.get(reference) {
        return Ok(cached.clone());
    }
    // Circular schema: keep the raw `$ref` node so expansion terminates.
    if stack.iter().any(|r| r == reference) || stack.len() >= MAX_REF_DEPTH {
        return Ok(node.clone());
    }
    let target = root
        .pointer(&reference[1..])
        .cloned()
        .ok_or_else(|| ScanError::SpecInvalid(format!("unresolvable $ref: {reference}")))?;

    stack.push(reference.to_string());
    let resolved = resolve_node(root, &target, memo, stack);
    stack.pop();
    let resolved = resolved?;
    memo.insert(reference.to_string(), resolved.clone());
    Ok(resolved)
}

/// Validate the resolved document against the OpenAPI 3 object model.
fn validate(doc: &Value) -> Result<()> {
    let version = doc
        .get("openapi")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !version.starts_with("3.") {
        return Err(ScanError::SpecInvalid(format!(
            "unsupported openapi version: {version:?}"
        )));
    }
    serde_json::from_value::<openapiv3::OpenAPI>(doc.clone())
        .map_err(|e| ScanError::SpecInvalid(e.to_string()))?;
    Ok(())
}

/// Flatten a resolved document into the snapshot the probes consume.
pub fn snapshot_from(doc: &Value) -> Result<SpecSnapshot> {
    let info = doc.get("info").cloned().unwrap_or_default();
    let title = info
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Unnamed API")
        .to_string();
    let version = info
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("0")
        .to_string();

    let servers = doc
        .get("servers")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.get("url").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let global_security = match doc.get("security") {
        Some(v) => Some(
            serde_json::from_value(v.clone())
                .map_err(|e| ScanError::SpecInvalid(format!("security: {e}")))?,
        ),
        None => None,
    };

    let security_schemes: std::collections::BTreeMap<String, crate::model::SecurityScheme> = doc
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .and_then(Value::as_object)
        .map(|schemes| {
            schemes
                .iter()
                .filter_map(|(name, raw)| {
                    raw.as_object()
                        .map(|raw| (name.clone(), normalize_scheme(raw)))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut endpoints = Vec::new();
    if let Some(paths) = doc.get("paths").and_then(Value::as_object) {
        for (path, item) in paths {
            let Some(item) = item.as_object() else {
                continue;
            };
            for method in METHODS {
                let Some(op) = item.get(method).and_then(Value::as_object) else {
                    continue;
                };
                endpoints.push(build_endpoint(path, method, op)?);
            }
        }
    }

    tracing::debug!(
        title = %title,
        endpoints = endpoints.len(),
        schemes = security_schemes.len(),
        "spec.loaded"
    );

    Ok(SpecSnapshot {
        title,
        version,
        servers,
        global_security,
        security_schemes,
        endpoints,
    })
}

fn build_endpoint(path: &str, method: &str, op: &Map<String, Value>) -> Result<Endpoint> {
    let security = match op.get("security") {
        Some(v) => Some(
            serde_json::from_value(v.clone())
                .map_err(|e| ScanError::SpecInvalid(format!("{method} {path} security: {e}")))?,
        ),
        None => None,
    };
    Ok(Endpoint {
        method: method.to_ascii_uppercase(),
        path: path.to_string(),
        operation_id: op
            .get("operationId")
            .and_then(Value::as_str)
            .map(str::to_string),
        tags: op
            .get("tags")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        security,
        parameters: op
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        request_body: op.get("requestBody").cloned(),
        responses: op
            .get("responses")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    })
}

fn normalize_scheme(raw: &Map<String, Value>) -> SecurityScheme {
    let typ = raw.get("type").and_then(Value::as_str).unwrap_or_default();
    let scheme = raw.get("scheme").and_then(Value::as_str).unwrap_or_default();
    let location = raw.get("in").and_then(Value::as_str).unwrap_or_default();
    let kind = match (typ, scheme, location) {
        ("http", "basic", _) => SchemeKind::HttpBasic,
        ("http", "bearer", _) => SchemeKind::HttpBearer,
        ("apiKey", _, "header") => SchemeKind::ApiKeyHeader,
        ("apiKey", _, "query") => SchemeKind::ApiKeyQuery,
        _ => SchemeKind::Other,
    };
    SecurityScheme {
        kind,
        name: raw.get("name").and_then(Value::as_str).map(str::to_string),
        bearer_format: raw
            .get("bearerFormat")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
