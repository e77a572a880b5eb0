//! Static risk scoring: rule → (likelihood, impact) → score + severity.

use crate::{RuleId, Severity};

/// Default (likelihood, impact) weights per rule.
const DEFAULT_WEIGHTS: [(RuleId, f64, f64); 10] = [
    (RuleId::Api1, 0.9, 0.9),
    (RuleId::Api2, 0.8, 0.9),
    (RuleId::Api3, 0.6, 0.7),
    (RuleId::Api4, 0.5, 0.6),
    (RuleId::Api5, 0.8, 0.9),
    (RuleId::Api6, 0.7, 0.8),
    (RuleId::Api7, 0.6, 0.8),
    (RuleId::Api8, 0.6, 0.8),
    (RuleId::Api9, 0.5, 0.6),
    (RuleId::Api10, 0.4, 0.5),
];

pub fn weights(rule: RuleId) -> (f64, f64) {
    DEFAULT_WEIGHTS
        .iter()
        .find(|(r, _, _)| *r == rule)
        .map(|(_, l, i)| (*l, *i))
        .unwrap_or((0.4, 0.4))
}

/// Severity bucket for a numeric score (score ≥ threshold wins).
pub fn severity_for(score: f64) -> Severity {
    if score >= 9.0 {
        Severity::Critical
    } else if score >= 7.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else if score >= 1.0 {
        Severity::Low
    } else {
        Severity::Info
    }
}

/// Score a rule with its default weights.
///
/// ```
/// use sweep_common::{score::score, Severity};
/// use sweep_common::RuleId;
///
/// let (s, sev) = score(RuleId::Api1);
/// assert_eq!(s, 8.1);
/// assert_eq!(sev, Severity::High);
/// ```
pub fn score(rule: RuleId) -> (f64, Severity) {
    score_with(rule, None, None)
}

/// Score with optional overrides for likelihood/impact.
pub fn score_with(rule: RuleId, likelihood: Option<f64>, impact: Option<f64>) -> (f64, Severity) {
    let (dl, di) = weights(rule);
    let l = likelihood.unwrap_or(dl);
    let i = impact.unwrap_or(di);
    let s = (l * i * 100.0).round() / 10.0;
    (s, severity_for(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_table() {
        assert_eq!(score(RuleId::Api1), (8.1, Severity::High));
        assert_eq!(score(RuleId::Api2), (7.2, Severity::High));
        assert_eq!(score(RuleId::Api3), (4.2, Severity::Medium));
        assert_eq!(score(RuleId::Api4), (3.0, Severity::Low));
        assert_eq!(score(RuleId::Api10), (2.0, Severity::Low));
    }

    #[test]
    fn buckets_are_inclusive_at_thresholds() {
        assert_eq!(severity_for(9.0), Severity::Critical);
        assert_eq!(severity_for(8.9), Severity::High);
        assert_eq!(severity_for(7.0), Severity::High);
        assert_eq!(severity_for(4.0), Severity::Medium);
        assert_eq!(severity_for(1.0), Severity::Low);
        assert_eq!(severity_for(0.9), Severity::Info);
    }

    #[test]
    fn overrides_replace_defaults() {
        let (s, sev) = score_with(RuleId::Api10, Some(1.0), Some(1.0));
        assert_eq!(s, 10.0);
        assert_eq!(sev, Severity::Critical);
    }
}
