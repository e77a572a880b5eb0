//! Structured evidence capture for security findings.
//!
//! Evidence pairs the request as sent with the observed response, a
//! redacted curl reproduction, human reproduction steps, and analysis
//! text. Sensitive header values (`Authorization`, `Cookie`, `X-Api-Key`)
//! never appear in the curl string; response bodies are stored verbatim
//! up to 100 KiB and truncated with an explicit marker beyond that.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::RuleId;

/// Stored response bodies are capped at this size.
pub const MAX_BODY_BYTES: usize = 100 * 1024;

const REDACTED: &str = "[REDACTED]";
const UNDECODABLE: &str = "[Unable to decode response body]";

const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "cookie", "x-api-key"];

const HEADER_SAFELIST: [&str; 6] = [
    "content-type",
    "retry-after",
    "x-ratelimit-remaining",
    "x-ratelimit-limit",
    "content-length",
    "server",
];

/// Complete HTTP request details as sent on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Complete HTTP response details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub size_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
}

impl ResponseRecord {
    /// Headers restricted to the diagnostic safelist.
    pub fn safelisted_headers(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .filter(|(k, _)| {
                let k = k.to_ascii_lowercase();
                HEADER_SAFELIST.contains(&k.as_str()) || k.starts_with("x-ratelimit-")
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Compact summary used as probe-specific evidence extras.
    pub fn summary(&self) -> serde_json::Value {
        let excerpt: String = self.body.chars().take(200).collect();
        serde_json::json!({
            "status": self.status,
            "headers": self.safelisted_headers(),
            "len": self.size_bytes,
            "excerpt": excerpt,
        })
    }
}

/// Decode a raw body, enforcing the storage cap.
///
/// Invalid UTF-8 yields a fixed marker; oversized bodies are truncated on
/// a char boundary and annotated with the original size.
pub fn decode_body(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => return UNDECODABLE.to_string(),
    };
    if text.len() <= MAX_BODY_BYTES {
        return text.to_string();
    }
    let mut cut = MAX_BODY_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n\n[... truncated, original size: {} bytes]",
        &text[..cut],
        text.len()
    )
}

/// Render a ready-to-run curl command with sensitive header values masked.
///
/// ```
/// use sweep_common::evidence::{curl_command, RequestRecord};
/// use std::collections::BTreeMap;
///
/// let mut headers = BTreeMap::new();
/// headers.insert("Authorization".into(), "Bearer s3cr3t".into());
/// headers.insert("Accept".into(), "application/json".into());
/// let req = RequestRecord {
///     method: "GET".into(),
///     url: "https://api.example.com/users".into(),
///     headers,
///     ..Default::default()
/// };
/// let curl = curl_command(&req);
/// assert!(curl.starts_with("curl -X GET 'https://api.example.com/users'"));
/// assert!(curl.contains("[REDACTED]"));
/// assert!(!curl.contains("s3cr3t"));
/// ```
pub fn curl_command(request: &RequestRecord) -> String {
    let mut parts = vec![format!("curl -X {}", request.method)];
    parts.push(format!("'{}'", request.url));

    for (key, value) in &request.headers {
        if SENSITIVE_HEADERS.contains(&key.to_ascii_lowercase().as_str()) {
            parts.push(format!("-H '{}: {}'", key, REDACTED));
        } else {
            parts.push(format!("-H '{}: {}'", key, value.replace('\'', r"'\''")));
        }
    }

    if let Some(body) = &request.body {
        parts.push(format!("-d '{}'", body.replace('\'', r"'\''")));
    }

    parts.join(" ")
}

/// Default proof-of-concept references per rule.
pub fn poc_references(rule: RuleId) -> Vec<String> {
    let refs: &[&str] = match rule {
        RuleId::Api1 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xa1-broken-object-level-authorization/",
            "https://portswigger.net/web-security/access-control/idor",
        ],
        RuleId::Api2 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xa2-broken-authentication/",
            "https://cheatsheetseries.owasp.org/cheatsheets/Authentication_Cheat_Sheet.html",
        ],
        RuleId::Api3 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xa3-broken-object-property-level-authorization/",
        ],
        RuleId::Api4 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xa4-unrestricted-resource-consumption/",
        ],
        RuleId::Api5 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xa5-broken-function-level-authorization/",
        ],
        RuleId::Api6 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xa6-unrestricted-access-to-sensitive-business-flows/",
        ],
        RuleId::Api7 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xa7-server-side-request-forgery/",
            "https://portswigger.net/web-security/ssrf",
        ],
        RuleId::Api8 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xa8-security-misconfiguration/",
            "https://cheatsheetseries.owasp.org/cheatsheets/SQL_Injection_Prevention_Cheat_Sheet.html",
        ],
        RuleId::Api9 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xa9-improper-inventory-management/",
        ],
        RuleId::Api10 => &[
            "https://owasp.org/API-Security/editions/2023/en/0xaa-unsafe-consumption-of-apis/",
        ],
    };
    refs.iter().map(|s| s.to_string()).collect()
}

/// Structured evidence for one finding.
///
/// The `extra` map carries probe-specific context (e.g. the second
/// response of an object-level check) and is flattened into the JSON
/// representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub request: RequestRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseRecord>,
    pub auth_context: String,
    pub probe_name: String,
    pub timestamp: String,
    pub curl_command: String,
    pub steps: Vec<String>,
    pub why_vulnerable: String,
    pub attack_scenario: String,
    pub poc_references: Vec<String>,
    /// Probe-specific context (extra responses, payload labels); an empty
    /// map flattens to nothing.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Evidence {
    /// Start an evidence record from an observed exchange. The curl
    /// reproduction and timestamp are derived here; analysis text is
    /// attached with the builder methods.
    pub fn capture(
        request: RequestRecord,
        response: Option<ResponseRecord>,
        probe_name: impl Into<String>,
    ) -> Self {
        let curl = curl_command(&request);
        Self {
            request,
            response,
            auth_context: String::new(),
            probe_name: probe_name.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            curl_command: curl,
            steps: Vec::new(),
            why_vulnerable: String::new(),
            attack_scenario: String::new(),
            poc_references: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn auth_context(mut self, ctx: impl Into<String>) -> Self {
        self.auth_context = ctx.into();
        self
    }

    pub fn why(mut self, text: impl Into<String>) -> Self {
        self.why_vulnerable = text.into();
        self
    }

    pub fn scenario(mut self, text: impl Into<String>) -> Self {
        self.attack_scenario = text.into();
        self
    }

    pub fn steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    pub fn references(mut self, rule: RuleId) -> Self {
        self.poc_references = poc_references(rule);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req_with(headers: &[(&str, &str)]) -> RequestRecord {
        RequestRecord {
            method: "POST".into(),
            url: "http://localhost/a".into(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            query: BTreeMap::new(),
            body: Some("it's a body".into()),
        }
    }

    #[test]
    fn curl_redacts_sensitive_headers_case_insensitively() {
        let req = req_with(&[
            ("authorization", "Bearer tok"),
            ("COOKIE", "session=abc"),
            ("X-Api-Key", "k123"),
            ("Accept", "application/json"),
        ]);
        let curl = curl_command(&req);
        assert!(!curl.contains("Bearer tok"));
        assert!(!curl.contains("session=abc"));
        assert!(!curl.contains("k123"));
        assert!(curl.contains("-H 'Accept: application/json'"));
        assert_eq!(curl.matches(REDACTED).count(), 3);
    }

    #[test]
    fn curl_has_no_redaction_without_sensitive_headers() {
        let req = req_with(&[("Accept", "application/json")]);
        assert!(!curl_command(&req).contains(REDACTED));
    }

    #[test]
    fn curl_escapes_single_quotes_in_body() {
        let req = req_with(&[]);
        let curl = curl_command(&req);
        assert!(curl.ends_with(r"-d 'it'\''s a body'"));
    }

    #[test]
    fn oversized_body_is_truncated_with_marker() {
        let big = vec![b'x'; MAX_BODY_BYTES + 10];
        let decoded = decode_body(&big);
        assert!(decoded.starts_with("xxx"));
        assert!(decoded.ends_with(&format!(
            "[... truncated, original size: {} bytes]",
            MAX_BODY_BYTES + 10
        )));
    }

    #[test]
    fn invalid_utf8_yields_marker() {
        assert_eq!(decode_body(&[0xff, 0xfe, 0x00]), UNDECODABLE);
    }

    #[test]
    fn safelist_keeps_ratelimit_headers() {
        let resp = ResponseRecord {
            status: 200,
            headers: [
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-RateLimit-Remaining".to_string(), "9".to_string()),
                ("X-Internal-Debug".to_string(), "1".to_string()),
            ]
            .into_iter()
            .collect(),
            body: String::new(),
            size_bytes: 0,
            time_ms: None,
        };
        let kept = resp.safelisted_headers();
        assert!(kept.contains_key("Content-Type"));
        assert!(kept.contains_key("X-RateLimit-Remaining"));
        assert!(!kept.contains_key("X-Internal-Debug"));
    }
}
