//! The probe suite: ten independent detection strategies, one per OWASP
//! API Security Top 10 rule.
//!
//! Every probe consumes the shared [`ProbeCtx`] (spec snapshot, budgeted
//! client, auth context, base URL, flags) and produces findings. Probes
//! are side-effect-free apart from the HTTP requests they issue, continue
//! past individual request failures (a synthetic 599 is "no signal"), and
//! observe cancellation between endpoints via [`ProbeCtx::checkpoint`].

use tokio_util::sync::CancellationToken;

use sweep_common::score::score;
use sweep_common::{Evidence, Finding, Result, RuleId};
use sweep_http::{AuthContext, ScanClient};
use sweep_spec::SpecSnapshot;

pub mod auth_matrix;
pub mod bfla;
pub mod bola;
pub mod exposure;
pub mod external;
pub mod injection;
pub mod inventory;
pub mod logging;
pub mod mass_assign;
pub mod misconfig;
pub mod ratelimit;

pub use external::{ExternalScanner, ExternalScannerSet};

/// Scan-wide switches restricted to privileged callers upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanFlags {
    /// Allow probes that send mutating or fuzzing payloads.
    pub dangerous: bool,
    /// Allow the default-credential auth variant.
    pub fuzz_auth: bool,
}

/// Everything a probe needs for one chunk sweep.
pub struct ProbeCtx<'a> {
    pub spec: &'a SpecSnapshot,
    pub client: &'a ScanClient,
    pub auth: &'a AuthContext,
    pub base: &'a str,
    pub flags: ScanFlags,
    pub cancel: CancellationToken,
}

impl ProbeCtx<'_> {
    /// Cooperative cancellation checkpoint; probes call this between
    /// endpoints and return at the first cancelled one.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(sweep_common::ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One detection strategy associated with exactly one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    AuthMatrix,
    Bola,
    Bfla,
    RateLimit,
    Exposure,
    MassAssign,
    Misconfig,
    Injection,
    Inventory,
    Logging,
}

/// The fixed order a worker runs probes in.
pub const SWEEP_ORDER: [ProbeKind; 10] = [
    ProbeKind::AuthMatrix,
    ProbeKind::Bola,
    ProbeKind::Bfla,
    ProbeKind::RateLimit,
    ProbeKind::Exposure,
    ProbeKind::MassAssign,
    ProbeKind::Misconfig,
    ProbeKind::Injection,
    ProbeKind::Inventory,
    ProbeKind::Logging,
];

impl ProbeKind {
    pub fn rule(&self) -> RuleId {
        match self {
            ProbeKind::AuthMatrix => RuleId::Api2,
            ProbeKind::Bola => RuleId::Api1,
            ProbeKind::Bfla => RuleId::Api5,
            ProbeKind::RateLimit => RuleId::Api4,
            ProbeKind::Exposure => RuleId::Api3,
            ProbeKind::MassAssign => RuleId::Api6,
            ProbeKind::Misconfig => RuleId::Api7,
            ProbeKind::Injection => RuleId::Api8,
            ProbeKind::Inventory => RuleId::Api9,
            ProbeKind::Logging => RuleId::Api10,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProbeKind::AuthMatrix => "AuthMatrix",
            ProbeKind::Bola => "BOLA",
            ProbeKind::Bfla => "BFLA",
            ProbeKind::RateLimit => "RateLimit",
            ProbeKind::Exposure => "Exposure",
            ProbeKind::MassAssign => "MassAssignment",
            ProbeKind::Misconfig => "Misconfig",
            ProbeKind::Injection => "Injection",
            ProbeKind::Inventory => "Inventory",
            ProbeKind::Logging => "Logging",
        }
    }

    /// Human phase string written to the job record after this probe.
    pub fn phase(&self) -> &'static str {
        match self {
            ProbeKind::AuthMatrix => "Checking authentication handling",
            ProbeKind::Bola => "Checking object level authorization",
            ProbeKind::Bfla => "Checking function level authorization",
            ProbeKind::RateLimit => "Checking rate limiting",
            ProbeKind::Exposure => "Checking for excessive data exposure",
            ProbeKind::MassAssign => "Checking for mass assignment",
            ProbeKind::Misconfig => "Checking security configuration",
            ProbeKind::Injection => "Checking injection handling",
            ProbeKind::Inventory => "Checking API inventory",
            ProbeKind::Logging => "Checking logging & monitoring",
        }
    }

    pub async fn run(&self, ctx: &ProbeCtx<'_>) -> Result<Vec<Finding>> {
        match self {
            ProbeKind::AuthMatrix => auth_matrix::run(ctx).await,
            ProbeKind::Bola => bola::run(ctx).await,
            ProbeKind::Bfla => bfla::run(ctx).await,
            ProbeKind::RateLimit => ratelimit::run(ctx).await,
            ProbeKind::Exposure => exposure::run(ctx).await,
            ProbeKind::MassAssign => mass_assign::run(ctx).await,
            ProbeKind::Misconfig => misconfig::run(ctx).await,
            ProbeKind::Injection => injection::run(ctx).await,
            ProbeKind::Inventory => inventory::run(ctx).await,
            ProbeKind::Logging => logging::run(ctx).await,
        }
    }
}

/// Assemble a finding with the rule's static score and title.
pub(crate) fn finding(
    rule: RuleId,
    endpoint: &str,
    method: &str,
    description: &str,
    evidence: Evidence,
) -> Finding {
    let (s, severity) = score(rule);
    Finding {
        rule,
        title: rule.title().to_string(),
        severity,
        score: s,
        endpoint: endpoint.to_string(),
        method: method.to_string(),
        description: description.to_string(),
        evidence,
    }
}

/// Success statuses for read probes.
pub(crate) const READ_OK: [u16; 2] = [200, 206];

/// Success statuses for action probes (BFLA, inventory).
pub(crate) const ACTION_OK: [u16; 4] = [200, 201, 202, 204];
