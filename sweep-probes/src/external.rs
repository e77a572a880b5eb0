//! Pluggable external-scanner contract.
//!
//! Third-party engines (ZAP, Nuclei, …) integrate by implementing
//! [`ExternalScanner`]; the worker runs every registered scanner after
//! the built-in suite and merges its findings into the job result. No
//! concrete integration ships with the core.

use async_trait::async_trait;
use std::sync::Arc;

use sweep_common::{Finding, Result};
use sweep_spec::SpecSnapshot;

#[async_trait]
pub trait ExternalScanner: Send + Sync {
    /// Stable name used in logs and evidence.
    fn name(&self) -> &str;

    /// Run the scanner against the snapshot; contributions are ordinary
    /// findings. Implementations are expected to honour their own rate
    /// limits; the shared client budget does not cover them.
    async fn scan(&self, spec: &SpecSnapshot, server_url: &str) -> Result<Vec<Finding>>;
}

/// The set of scanners a worker runs after the built-in probes.
#[derive(Clone, Default)]
pub struct ExternalScannerSet {
    scanners: Vec<Arc<dyn ExternalScanner>>,
}

impl ExternalScannerSet {
    pub fn register(&mut self, scanner: Arc<dyn ExternalScanner>) {
        self.scanners.push(scanner);
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ExternalScanner>> {
        self.scanners.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_common::evidence::RequestRecord;
    use sweep_common::{Evidence, RuleId};

    struct StubScanner;

    #[async_trait]
    impl ExternalScanner for StubScanner {
        fn name(&self) -> &str {
            "stub"
        }

        async fn scan(&self, _spec: &SpecSnapshot, server_url: &str) -> Result<Vec<Finding>> {
            let request = RequestRecord {
                method: "GET".into(),
                url: server_url.into(),
                ..Default::default()
            };
            Ok(vec![crate::finding(
                RuleId::Api7,
                "/",
                "GET",
                "stub contribution",
                Evidence::capture(request, None, "stub"),
            )])
        }
    }

    #[tokio::test]
    async fn registered_scanners_contribute_findings() {
        let mut set = ExternalScannerSet::default();
        assert!(set.is_empty());
        set.register(Arc::new(StubScanner));

        let spec = SpecSnapshot {
            title: "t".into(),
            version: "1".into(),
            servers: vec![],
            global_security: None,
            security_schemes: Default::default(),
            endpoints: vec![],
        };
        let mut findings = Vec::new();
        for scanner in set.iter() {
            findings.extend(scanner.scan(&spec, "http://t.local").await.unwrap());
        }
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, RuleId::Api7);
    }
}
