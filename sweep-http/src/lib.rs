//! Rate-limited, budgeted HTTP client for the probe suite.
//!
//! - Every outgoing call passes the token bucket and spends one unit of
//!   the per-client request budget; an exhausted budget is the normal end
//!   of a chunk sweep, surfaced as [`ScanError::BudgetExhausted`].
//! - Transport failures are coerced into a synthetic `599` response with
//!   the error message as body, so probe logic can treat every outcome as
//!   a response.
//! - Each call returns an [`Exchange`]: the request exactly as sent plus
//!   the observed response, ready for evidence capture.
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> sweep_common::Result<()> {
//! let client = sweep_http::ScanClient::new("http://api.local")?
//!     .with_rate(2.0)
//!     .with_budget(50);
//! let xchg = client
//!     .send("GET", "http://api.local/health", sweep_http::RequestOpts::default())
//!     .await?;
//! assert!(xchg.response.status > 0);
//! # Ok(()) }
//! ```

use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use url::Url;

use sweep_common::evidence::{RequestRecord, ResponseRecord, decode_body};
use sweep_common::{Result, ScanError};

pub mod auth;
pub mod throttle;

pub use auth::{AuthContext, AuthVariant, BOGUS_BEARER, basic_default_header};
pub use throttle::TokenBucket;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_RATE: f64 = 1.0;
pub const DEFAULT_BUDGET: u32 = 400;

/// Synthetic status for transport-level failures.
pub const STATUS_UNREACHABLE: u16 = 599;

const USER_AGENT: &str = concat!("sweep/", env!("CARGO_PKG_VERSION"));

/// Per-request tuning: extra headers, query pairs, optional JSON body.
#[derive(Clone, Debug, Default)]
pub struct RequestOpts {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
}

impl RequestOpts {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }
}

/// One request/response pair as observed on the wire.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: RequestRecord,
    pub response: ResponseRecord,
}

impl Exchange {
    pub fn status(&self) -> u16 {
        self.response.status
    }

    /// Whether this exchange is a coerced transport failure.
    pub fn is_unreachable(&self) -> bool {
        self.response.status == STATUS_UNREACHABLE
    }

    /// Case-insensitive response header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Async request executor owned by exactly one job.
#[derive(Clone)]
pub struct ScanClient {
    base: Url,
    inner: Client,
    bucket: Arc<TokenBucket>,
    remaining: Arc<AtomicI64>,
    budget: u32,
    timeout: Duration,
}

impl ScanClient {
    /// Construct a client anchored to the target base URL with default
    /// rate (1 req/s), budget (400), and timeout (12 s).
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| ScanError::InvalidParams(format!("server url {base:?}: {e}")))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .redirect(Policy::limited(10))
            .build()
            .map_err(|e| ScanError::InvalidParams(format!("client build: {e}")))?;
        Ok(Self {
            base,
            inner,
            bucket: Arc::new(TokenBucket::new(DEFAULT_RATE)),
            remaining: Arc::new(AtomicI64::new(DEFAULT_BUDGET as i64)),
            budget: DEFAULT_BUDGET,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_rate(mut self, rate_per_sec: f64) -> Self {
        self.bucket = Arc::new(TokenBucket::new(rate_per_sec));
        self
    }

    pub fn with_budget(mut self, budget: u32) -> Self {
        self.remaining = Arc::new(AtomicI64::new(budget as i64));
        self.budget = budget;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Requests issued so far by this client.
    pub fn used(&self) -> u32 {
        let left = self.remaining.load(Ordering::Relaxed).max(0) as u32;
        self.budget - left
    }

    /// Issue one request. `target` may be an absolute URL or a path
    /// resolved against the client's base.
    pub async fn send(&self, method: &str, target: &str, opts: RequestOpts) -> Result<Exchange> {
        self.spend_budget()?;
        self.bucket.take(1.0).await;

        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ScanError::Probe(format!("bad method {method:?}")))?;
        let mut url = self.resolve(target)?;
        for (k, v) in &opts.query {
            url.query_pairs_mut().append_pair(k, v);
        }

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        headers.insert("User-Agent".to_string(), USER_AGENT.to_string());
        let body = match &opts.json {
            Some(value) => {
                headers.insert("Content-Type".to_string(), "application/json".to_string());
                Some(serde_json::to_string(value).unwrap_or_default())
            }
            None => None,
        };
        for (k, v) in &opts.headers {
            headers.insert(k.clone(), v.clone());
        }

        let request = RequestRecord {
            method: method.as_str().to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            query: opts.query.iter().cloned().collect(),
            body: body.clone(),
        };

        let mut rb = self.inner.request(method.clone(), url.clone());
        rb = rb.timeout(self.timeout);
        for (k, v) in &headers {
            rb = rb.header(k.as_str(), v.as_str());
        }
        if let Some(bytes) = body {
            rb = rb.body(bytes.into_bytes());
        }

        tracing::debug!(method = %method, url = %url, "client.request");

        let t0 = std::time::Instant::now();
        let response = match rb.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let resp_headers: BTreeMap<String, String> = resp
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
                    .collect();
                match resp.bytes().await {
                    Ok(bytes) => {
                        let text = decode_body(&bytes);
                        ResponseRecord {
                            status,
                            headers: resp_headers,
                            size_bytes: text.len(),
                            body: text,
                            time_ms: Some(t0.elapsed().as_millis() as u64),
                        }
                    }
                    Err(e) => self.unreachable_response(e.to_string(), t0),
                }
            }
            Err(e) => self.unreachable_response(e.to_string(), t0),
        };

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = response.status,
            duration_ms = response.time_ms,
            remaining = self.remaining.load(Ordering::Relaxed),
            "client.response"
        );

        Ok(Exchange { request, response })
    }

    fn resolve(&self, target: &str) -> Result<Url> {
        if target.starts_with("http://") || target.starts_with("https://") {
            Url::parse(target).map_err(|e| ScanError::Probe(format!("url {target:?}: {e}")))
        } else {
            self.base
                .join(target)
                .map_err(|e| ScanError::Probe(format!("url {target:?}: {e}")))
        }
    }

    fn spend_budget(&self) -> Result<()> {
        let taken = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                if left > 0 { Some(left - 1) } else { None }
            });
        match taken {
            Ok(_) => Ok(()),
            Err(_) => Err(ScanError::BudgetExhausted),
        }
    }

    fn unreachable_response(&self, message: String, t0: std::time::Instant) -> ResponseRecord {
        ResponseRecord {
            status: STATUS_UNREACHABLE,
            headers: BTreeMap::new(),
            size_bytes: message.len(),
            body: message,
            time_ms: Some(t0.elapsed().as_millis() as u64),
        }
    }
}
