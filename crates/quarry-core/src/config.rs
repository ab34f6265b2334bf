//! Core configuration
//!
//! The narrow set of host-supplied options the core consumes. Everything is
//! read through this struct; nothing else in the workspace reaches for
//! process-wide state.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Feature flags consumed by the core.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    /// When false, secure-tunnel specs are rejected at validation time.
    pub ssh_tunneling: bool,
    /// When false, template rendering is a passthrough.
    pub enable_template_processing: bool,
    /// When true, non-allowlisted drivers cannot be configured except
    /// through the permission-bypass seed path.
    pub prevent_unsafe_db_connections: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            ssh_tunneling: false,
            enable_template_processing: true,
            prevent_unsafe_db_connections: true,
        }
    }
}

/// Host-supplied configuration for the portability and validation core.
#[derive(Debug, Clone)]
pub struct QuarryConfig {
    /// Connection string substituted for the `__SQLALCHEMY_EXAMPLES_URI__`
    /// placeholder in bundled example content.
    pub sqlalchemy_examples_uri: Option<String>,
    /// Engine tag → name of the static SQL validator to invoke.
    pub sql_validators_by_engine: HashMap<String, String>,
    /// Upper bound on a single SQL validation run.
    pub sqllab_validation_timeout: Duration,
    /// Engine tag → function names forbidden in user SQL.
    pub disallowed_sql_functions: HashMap<String, HashSet<String>>,
    /// Upper bound on sample-row responses; enforced by the sample-fetch
    /// collaborator, carried here so callers agree on the limit.
    pub samples_row_limit: usize,
    /// Extra time grains merged into the built-in enumeration, keyed by
    /// grain name with a `{col}` expression template per engine.
    pub time_grain_addons: HashMap<String, String>,
    /// Drivers allowed when `prevent_unsafe_db_connections` is on.
    pub allowed_drivers: HashSet<String>,
    /// Symmetric key for encrypted-extra at-rest encryption (32 bytes).
    pub secret_key: Option<[u8; 32]>,
    pub feature_flags: FeatureFlags,
}

impl Default for QuarryConfig {
    fn default() -> Self {
        Self {
            sqlalchemy_examples_uri: None,
            sql_validators_by_engine: HashMap::new(),
            sqllab_validation_timeout: Duration::from_secs(10),
            disallowed_sql_functions: HashMap::new(),
            samples_row_limit: 1000,
            time_grain_addons: HashMap::new(),
            allowed_drivers: HashSet::new(),
            secret_key: None,
            feature_flags: FeatureFlags::default(),
        }
    }
}

impl QuarryConfig {
    /// Whether user SQL on this engine may call the given function.
    pub fn is_function_allowed(&self, engine: &str, function: &str) -> bool {
        self.disallowed_sql_functions
            .get(engine)
            .map(|set| !set.contains(&function.to_lowercase()))
            .unwrap_or(true)
    }

    /// Whether the driver may be configured outside the seed path.
    pub fn is_driver_allowed(&self, driver: &str) -> bool {
        if !self.feature_flags.prevent_unsafe_db_connections {
            return true;
        }
        self.allowed_drivers.is_empty() || self.allowed_drivers.contains(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallowed_functions_are_engine_scoped() {
        let mut config = QuarryConfig::default();
        config
            .disallowed_sql_functions
            .insert("postgresql".to_string(), HashSet::from(["version".to_string()]));
        assert!(!config.is_function_allowed("postgresql", "VERSION"));
        assert!(config.is_function_allowed("postgresql", "now"));
        assert!(config.is_function_allowed("mysql", "version"));
    }

    #[test]
    fn driver_allowlist_only_applies_when_flag_set() {
        let mut config = QuarryConfig::default();
        config.allowed_drivers.insert("psycopg2".to_string());
        assert!(config.is_driver_allowed("psycopg2"));
        assert!(!config.is_driver_allowed("mystery"));
        config.feature_flags.prevent_unsafe_db_connections = false;
        assert!(config.is_driver_allowed("mystery"));
    }
}
