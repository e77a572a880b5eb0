//! Credential-variant injection for outgoing probe requests.
//!
//! Probes never carry real credentials; the injector attaches labelled
//! synthetic variants (a bogus bearer token, a default Basic pair, an
//! api-key placeholder) so the target's handling of each can be observed.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::BTreeMap;

use sweep_spec::{SchemeKind, SecurityScheme};

use crate::RequestOpts;

/// The bearer value shared by the injector and the auth-centric probes.
pub const BOGUS_BEARER: &str = "Bearer eyJbogus.eyJbogus.sig";

const DEFAULT_BASIC_CREDENTIALS: &str = "admin:admin";
const API_KEY_PLACEHOLDER: &str = "PLACEHOLDER";

/// The `Authorization` header for the default-credential Basic variant.
pub fn basic_default_header() -> (String, String) {
    let token = BASE64.encode(DEFAULT_BASIC_CREDENTIALS);
    ("Authorization".to_string(), format!("Basic {token}"))
}

/// A labelled auth-injection mode applied to a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVariant {
    /// `Authorization: Basic base64("admin:admin")`; only effective when
    /// fuzz-auth is enabled.
    BasicDefault,
    /// Structurally invalid bearer token.
    Bogus,
    /// `<name>: PLACEHOLDER` in the scheme's header or query slot.
    ApiKeyPlaceholder,
}

impl AuthVariant {
    pub fn label(&self) -> &'static str {
        match self {
            AuthVariant::BasicDefault => "basic-default",
            AuthVariant::Bogus => "bogus",
            AuthVariant::ApiKeyPlaceholder => "apikey-placeholder",
        }
    }
}

/// Security-scheme view shared by every probe of one sweep.
#[derive(Debug, Clone)]
pub struct AuthContext {
    schemes: BTreeMap<String, SecurityScheme>,
    fuzz_auth: bool,
}

impl AuthContext {
    pub fn new(schemes: BTreeMap<String, SecurityScheme>, fuzz_auth: bool) -> Self {
        Self { schemes, fuzz_auth }
    }

    pub fn fuzz_auth(&self) -> bool {
        self.fuzz_auth
    }

    pub fn scheme(&self, name: &str) -> Option<&SecurityScheme> {
        self.schemes.get(name)
    }

    /// Mutate `opts` for the given (scheme, variant) pair. Combinations
    /// outside the variant table are no-ops.
    pub fn apply(&self, scheme_name: Option<&str>, variant: AuthVariant, opts: &mut RequestOpts) {
        let Some(name) = scheme_name else { return };
        let Some(scheme) = self.schemes.get(name) else {
            return;
        };

        match (scheme.kind, variant) {
            (SchemeKind::HttpBasic, AuthVariant::BasicDefault) if self.fuzz_auth => {
                opts.headers.push(basic_default_header());
            }
            (SchemeKind::HttpBearer, AuthVariant::Bogus) => {
                opts.headers
                    .push(("Authorization".to_string(), BOGUS_BEARER.to_string()));
            }
            (SchemeKind::ApiKeyHeader, AuthVariant::ApiKeyPlaceholder) => {
                if let Some(key) = &scheme.name {
                    opts.headers
                        .push((key.clone(), API_KEY_PLACEHOLDER.to_string()));
                }
            }
            (SchemeKind::ApiKeyQuery, AuthVariant::ApiKeyPlaceholder) => {
                if let Some(key) = &scheme.name {
                    opts.query.push((key.clone(), API_KEY_PLACEHOLDER.to_string()));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(fuzz_auth: bool) -> AuthContext {
        let schemes: BTreeMap<String, SecurityScheme> = [
            (
                "basic".to_string(),
                SecurityScheme {
                    kind: SchemeKind::HttpBasic,
                    name: None,
                    bearer_format: None,
                },
            ),
            (
                "bearer".to_string(),
                SecurityScheme {
                    kind: SchemeKind::HttpBearer,
                    name: None,
                    bearer_format: Some("JWT".into()),
                },
            ),
            (
                "key_h".to_string(),
                SecurityScheme {
                    kind: SchemeKind::ApiKeyHeader,
                    name: Some("X-Api-Key".into()),
                    bearer_format: None,
                },
            ),
            (
                "key_q".to_string(),
                SecurityScheme {
                    kind: SchemeKind::ApiKeyQuery,
                    name: Some("api_key".into()),
                    bearer_format: None,
                },
            ),
        ]
        .into_iter()
        .collect();
        AuthContext::new(schemes, fuzz_auth)
    }

    #[test]
    fn basic_default_requires_fuzz_auth() {
        let mut opts = RequestOpts::default();
        ctx(false).apply(Some("basic"), AuthVariant::BasicDefault, &mut opts);
        assert!(opts.headers.is_empty());

        ctx(true).apply(Some("basic"), AuthVariant::BasicDefault, &mut opts);
        assert_eq!(
            opts.headers,
            vec![("Authorization".to_string(), "Basic YWRtaW46YWRtaW4=".to_string())]
        );
    }

    #[test]
    fn bogus_bearer_sets_authorization() {
        let mut opts = RequestOpts::default();
        ctx(false).apply(Some("bearer"), AuthVariant::Bogus, &mut opts);
        assert_eq!(
            opts.headers,
            vec![("Authorization".to_string(), BOGUS_BEARER.to_string())]
        );
    }

    #[test]
    fn api_key_placeholder_targets_the_declared_slot() {
        let mut opts = RequestOpts::default();
        let c = ctx(false);
        c.apply(Some("key_h"), AuthVariant::ApiKeyPlaceholder, &mut opts);
        c.apply(Some("key_q"), AuthVariant::ApiKeyPlaceholder, &mut opts);
        assert_eq!(
            opts.headers,
            vec![("X-Api-Key".to_string(), "PLACEHOLDER".to_string())]
        );
        assert_eq!(
            opts.query,
            vec![("api_key".to_string(), "PLACEHOLDER".to_string())]
        );
    }

    #[test]
    fn unknown_scheme_and_mismatched_variant_are_noops() {
        let mut opts = RequestOpts::default();
        let c = ctx(true);
        c.apply(Some("missing"), AuthVariant::Bogus, &mut opts);
        c.apply(Some("basic"), AuthVariant::Bogus, &mut opts);
        c.apply(None, AuthVariant::Bogus, &mut opts);
        assert!(opts.headers.is_empty() && opts.query.is_empty());
    }
}
