//! Common types and utilities shared across Sweep crates.
//!
//! This crate defines the finding model, the rule table, risk scoring,
//! evidence capture, observability helpers, and the shared error taxonomy
//! used throughout the Sweep workspace. It is intentionally lightweight
//! and dependency‑minimal so that all crates can depend on it without
//! introducing heavy transitive costs.
//!
//! # Overview
//!
//! - [`RuleId`] and [`Severity`]: the OWASP API Top 10 rule vocabulary
//! - [`Finding`]: one endpoint exhibiting one rule's behavioural signal
//! - [`score`]: static likelihood × impact scoring
//! - [`evidence`]: structured request/response evidence with redacted
//!   curl reproductions
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`ScanError`] and [`Result`]: shared error handling

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod evidence;
pub mod observability;
pub mod score;

pub use evidence::Evidence;

/// OWASP API Security Top 10 rule identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleId {
    #[serde(rename = "API1")]
    Api1,
    #[serde(rename = "API2")]
    Api2,
    #[serde(rename = "API3")]
    Api3,
    #[serde(rename = "API4")]
    Api4,
    #[serde(rename = "API5")]
    Api5,
    #[serde(rename = "API6")]
    Api6,
    #[serde(rename = "API7")]
    Api7,
    #[serde(rename = "API8")]
    Api8,
    #[serde(rename = "API9")]
    Api9,
    #[serde(rename = "API10")]
    Api10,
}

impl RuleId {
    pub const ALL: [RuleId; 10] = [
        RuleId::Api1,
        RuleId::Api2,
        RuleId::Api3,
        RuleId::Api4,
        RuleId::Api5,
        RuleId::Api6,
        RuleId::Api7,
        RuleId::Api8,
        RuleId::Api9,
        RuleId::Api10,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::Api1 => "API1",
            RuleId::Api2 => "API2",
            RuleId::Api3 => "API3",
            RuleId::Api4 => "API4",
            RuleId::Api5 => "API5",
            RuleId::Api6 => "API6",
            RuleId::Api7 => "API7",
            RuleId::Api8 => "API8",
            RuleId::Api9 => "API9",
            RuleId::Api10 => "API10",
        }
    }

    /// Canonical rule title as it appears in finding records.
    pub fn title(&self) -> &'static str {
        match self {
            RuleId::Api1 => "Broken Object Level Authorization (BOLA)",
            RuleId::Api2 => "Broken Authentication",
            RuleId::Api3 => "Excessive Data Exposure",
            RuleId::Api4 => "Lack of Rate Limiting",
            RuleId::Api5 => "Broken Function Level Authorization (BFLA)",
            RuleId::Api6 => "Mass Assignment",
            RuleId::Api7 => "Security Misconfiguration",
            RuleId::Api8 => "Injection",
            RuleId::Api9 => "Improper Assets Management",
            RuleId::Api10 => "Insufficient Logging & Monitoring",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity bucket derived from the numeric score (see [`score::severity_for`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Info => "Info",
        };
        f.write_str(s)
    }
}

/// A structured record asserting that one endpoint exhibits one rule's
/// behavioural signal.
///
/// The `(rule, endpoint, method)` triple is the finding's identity when
/// merged result sets are deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule: RuleId,
    pub title: String,
    pub severity: Severity,
    pub score: f64,
    pub endpoint: String,
    pub method: String,
    pub description: String,
    pub evidence: Evidence,
}

impl Finding {
    pub fn fingerprint(&self) -> (RuleId, &str, &str) {
        (self.rule, self.endpoint.as_str(), self.method.as_str())
    }
}

/// Error taxonomy shared across the Sweep workspace.
///
/// `BudgetExhausted` and `Cancelled` are expected termination conditions
/// for a chunk sweep, not failures; workers translate them into terminal
/// job statuses rather than error reports.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The spec document failed OpenAPI validation.
    #[error("spec failed validation: {0}")]
    SpecInvalid(String),

    /// The spec document could not be fetched or read.
    #[error("spec could not be loaded: {0}")]
    SpecUnreachable(String),

    /// The per-client request budget was spent; the sweep stops cleanly.
    #[error("request budget exhausted")]
    BudgetExhausted,

    /// Cooperative cancellation was observed at a checkpoint.
    #[error("scan cancelled")]
    Cancelled,

    /// Unexpected failure inside a probe; the sweep continues with the
    /// next probe.
    #[error("probe error: {0}")]
    Probe(String),

    /// The queue backend was unreachable or rejected an operation.
    #[error("queue backend error: {0}")]
    Queue(String),

    /// Invalid scan parameters (rate or budget out of range).
    #[error("invalid scan parameters: {0}")]
    InvalidParams(String),
}

/// Convenient alias for results that use [`ScanError`].
pub type Result<T> = std::result::Result<T, ScanError>;
