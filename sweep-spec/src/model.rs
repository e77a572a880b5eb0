//! The normalised endpoint/security view of a loaded spec.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One `name → scopes` requirement as it appears in an OpenAPI
/// `security` array.
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

/// Which request surface a credential attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemeKind {
    HttpBasic,
    HttpBearer,
    ApiKeyHeader,
    ApiKeyQuery,
    /// Anything the injector has no variant for (oauth2, openIdConnect, …).
    Other,
}

/// A parsed `components.securitySchemes` entry. The kind determines which
/// of the remaining fields are meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityScheme {
    pub kind: SchemeKind,
    /// Header or query parameter name for api-key schemes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_format: Option<String>,
}

/// One path × method operation.
///
/// `security` is copied verbatim from the operation: `None` means inherit
/// the global requirement, `Some(vec![])` means explicit no-auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub responses: serde_json::Map<String, Value>,
}

impl Endpoint {
    /// Whether the path template carries an `{id}`-style placeholder.
    pub fn has_id_param(&self) -> bool {
        self.path.contains('{') && self.path.contains('}')
    }

    /// The endpoint URL under `base`, template variables untouched.
    pub fn url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path)
    }

    /// The endpoint URL with every `{param}` substituted by `value`.
    ///
    /// ```
    /// use sweep_spec::Endpoint;
    ///
    /// let ep = Endpoint {
    ///     method: "GET".into(),
    ///     path: "/users/{userId}/items/{id}".into(),
    ///     operation_id: None,
    ///     tags: vec![],
    ///     security: None,
    ///     parameters: vec![],
    ///     request_body: None,
    ///     responses: Default::default(),
    /// };
    /// assert_eq!(
    ///     ep.url_with("http://api.local/", "1"),
    ///     "http://api.local/users/1/items/1"
    /// );
    /// ```
    pub fn url_with(&self, base: &str, value: &str) -> String {
        let mut out = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            match rest[open..].find('}') {
                Some(close) => {
                    out.push_str(value);
                    rest = &rest[open + close + 1..];
                }
                None => {
                    // unbalanced template; keep the tail verbatim
                    rest = &rest[open..];
                    break;
                }
            }
        }
        out.push_str(rest);
        format!("{}{}", base.trim_end_matches('/'), out)
    }
}

/// The immutable view of a loaded spec handed to the probe suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecSnapshot {
    pub title: String,
    pub version: String,
    pub servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_security: Option<Vec<SecurityRequirement>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
    pub endpoints: Vec<Endpoint>,
}

impl SpecSnapshot {
    /// `servers[0]` is the default base when the caller supplies none.
    pub fn default_server(&self) -> Option<&str> {
        self.servers.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(path: &str) -> Endpoint {
        Endpoint {
            method: "GET".into(),
            path: path.into(),
            operation_id: None,
            tags: vec![],
            security: None,
            parameters: vec![],
            request_body: None,
            responses: Default::default(),
        }
    }

    #[test]
    fn id_param_detection() {
        assert!(ep("/items/{id}").has_id_param());
        assert!(!ep("/items").has_id_param());
    }

    #[test]
    fn substitutes_every_template_variable() {
        assert_eq!(
            ep("/a/{x}/b/{y}").url_with("http://h", "2"),
            "http://h/a/2/b/2"
        );
    }

    #[test]
    fn security_distinction_survives_serde() {
        let inherit = ep("/a");
        let mut none = ep("/b");
        none.security = Some(vec![]);

        let round = |e: &Endpoint| -> Endpoint {
            serde_json::from_str(&serde_json::to_string(e).unwrap()).unwrap()
        };
        assert!(round(&inherit).security.is_none());
        assert_eq!(round(&none).security, Some(vec![]));
    }
}
