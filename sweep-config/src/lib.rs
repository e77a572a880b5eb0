//! Loader for scanner configuration with YAML + environment overlays.
//!
//! `sweep.yaml` holds defaults for a deployment; `SWEEP_`-prefixed
//! environment variables override individual fields, and `${VAR}`
//! placeholders inside values are expanded recursively. CLI flags are
//! merged on top by the binary.

use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::Path;

/// Caller-facing bounds for scan parameters.
pub const RATE_RANGE: RangeInclusive<f64> = 0.1..=10.0;
pub const BUDGET_RANGE: RangeInclusive<u32> = 1..=500;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("configuration load failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Everything `sweep.yaml` may set; all fields optional so the overlay
/// chain (file < env < CLI) composes cleanly.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SweepConfig {
    pub server_url: Option<String>,
    pub spec: Option<String>,
    pub rate: Option<f64>,
    pub request_budget: Option<u32>,
    pub dangerous: Option<bool>,
    pub fuzz_auth: Option<bool>,
    pub workers: Option<usize>,
    pub chunk_size: Option<usize>,
    pub job_ttl_hours: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub job_timeout_secs: Option<u64>,
}

pub fn validate_rate(rate: f64) -> Result<f64, ConfigError> {
    if RATE_RANGE.contains(&rate) {
        Ok(rate)
    } else {
        Err(ConfigError::Invalid {
            field: "rate",
            message: format!(
                "{rate} outside [{}, {}]",
                RATE_RANGE.start(),
                RATE_RANGE.end()
            ),
        })
    }
}

pub fn validate_budget(budget: u32) -> Result<u32, ConfigError> {
    if BUDGET_RANGE.contains(&budget) {
        Ok(budget)
    } else {
        Err(ConfigError::Invalid {
            field: "request_budget",
            message: format!(
                "{budget} outside [{}, {}]",
                BUDGET_RANGE.start(),
                BUDGET_RANGE.end()
            ),
        })
    }
}

/// Expand `${VAR}` placeholders in every string of the merged config
/// tree. Variables may reference other variables; expansion reruns until
/// the string stops changing, and a set of already-seen intermediate
/// strings breaks reference cycles.
fn expand_placeholders(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = expand_string(s);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(expand_placeholders),
        Value::Object(map) => map.values_mut().for_each(expand_placeholders),
        _ => {}
    }
}

fn expand_string(raw: &str) -> String {
    let mut seen = HashSet::new();
    let mut current = raw.to_string();
    while seen.insert(current.clone()) {
        let next = match shellexpand::env(&current) {
            Ok(cow) => cow.into_owned(),
            // unset variables stay as-is so the typed error points at the
            // field, not the placeholder
            Err(_) => break,
        };
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Builder hiding the `config` crate wiring (YAML + env overrides).
pub struct SweepConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for SweepConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepConfigLoader {
    /// Start with the defaults: `SWEEP_` env overrides, nothing else.
    ///
    /// ```
    /// use sweep_config::SweepConfigLoader;
    ///
    /// let cfg = SweepConfigLoader::new()
    ///     .with_yaml_str("rate: 2.5\nworkers: 3")
    ///     .load()
    ///     .expect("valid config");
    /// assert_eq!(cfg.rate, Some(2.5));
    /// assert_eq!(cfg.workers, Some(3));
    /// ```
    pub fn new() -> Self {
        let builder =
            Config::builder().add_source(Environment::with_prefix("SWEEP").separator("__"));
        Self { builder }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources, expanding
    /// `${VAR}` placeholders before materialising the typed struct.
    pub fn load(self) -> Result<SweepConfig, ConfigError> {
        let cfg = self.builder.build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_placeholders(&mut v);

        let typed: SweepConfig = serde_json::from_value(v)
            .map_err(|e| ConfigError::Load(config::ConfigError::Message(e.to_string())))?;
        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("SWEEP_TEST_FOO", Some("bar"), || {
            let mut v = json!("prefix-${SWEEP_TEST_FOO}-suffix");
            expand_placeholders(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_chained_references_to_a_fixpoint() {
        temp_env::with_vars(
            [
                ("SWEEP_TEST_BAZ", Some("qux")),
                ("SWEEP_TEST_BAR", Some("mid-${SWEEP_TEST_BAZ}")),
                ("SWEEP_TEST_TOP", Some("start-${SWEEP_TEST_BAR}-end")),
            ],
            || {
                let mut v = json!("X=${SWEEP_TEST_TOP}");
                expand_placeholders(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn reference_cycles_terminate() {
        temp_env::with_vars(
            [
                ("SWEEP_TEST_A", Some("${SWEEP_TEST_B}")),
                ("SWEEP_TEST_B", Some("${SWEEP_TEST_A}")),
            ],
            || {
                // the seen-set breaks the A->B->A loop; whichever form the
                // walk stopped on still carries an unresolved placeholder
                let mut v = json!("x=${SWEEP_TEST_A}-y");
                expand_placeholders(&mut v);
                let s = v.as_str().unwrap();
                assert!(s.starts_with("x=") && s.ends_with("-y"));
                assert!(s.contains("${"));
            },
        );
    }

    #[test]
    fn walks_arrays_and_objects() {
        temp_env::with_var("SWEEP_TEST_HOST", Some("api.internal"), || {
            let mut v = json!({
                "server_url": "http://${SWEEP_TEST_HOST}:8080",
                "extra": ["${SWEEP_TEST_HOST}", 42, null],
            });
            expand_placeholders(&mut v);
            assert_eq!(v["server_url"], json!("http://api.internal:8080"));
            assert_eq!(v["extra"], json!(["api.internal", 42, null]));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST_ANYWHERE}");
        expand_placeholders(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST_ANYWHERE}"));
    }

    #[test]
    fn rate_and_budget_bounds() {
        assert!(validate_rate(0.1).is_ok());
        assert!(validate_rate(10.0).is_ok());
        assert!(validate_rate(0.05).is_err());
        assert!(validate_rate(11.0).is_err());

        assert!(validate_budget(1).is_ok());
        assert!(validate_budget(500).is_ok());
        assert!(validate_budget(0).is_err());
        assert!(validate_budget(501).is_err());
    }
}
