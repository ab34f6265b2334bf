//! Engine spec registry
//!
//! Maps engine tags to shared spec instances. Lookups that miss fall back to
//! a generic spec so an unknown backend still gets quoting, limits, and
//! error translation, just without dialect-specific behavior.

use crate::gsheets::GsheetsSpec;
use crate::mysql::MysqlSpec;
use crate::postgres::PostgresSpec;
use crate::presto::PrestoSpec;
use crate::spec::EngineSpec;
use crate::sqlite::SqliteSpec;
use crate::time_grain::TimeGrain;
use crate::uri::SqlaUri;
use indexmap::IndexMap;
use std::sync::Arc;

/// Spec used when no engine matches: ANSI quoting, no time grains.
#[derive(Debug, Default)]
pub struct GenericSpec;

impl EngineSpec for GenericSpec {
    fn engine(&self) -> &'static str {
        "generic"
    }

    fn engine_name(&self) -> &'static str {
        "Generic"
    }

    fn default_driver(&self) -> &'static str {
        ""
    }

    fn time_grain_templates(&self) -> Vec<(TimeGrain, &'static str)> {
        Vec::new()
    }
}

pub struct EngineRegistry {
    specs: IndexMap<&'static str, Arc<dyn EngineSpec>>,
    fallback: Arc<dyn EngineSpec>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            specs: IndexMap::new(),
            fallback: Arc::new(GenericSpec),
        }
    }

    /// Registry preloaded with every built-in engine.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SqliteSpec));
        registry.register(Arc::new(PostgresSpec));
        registry.register(Arc::new(MysqlSpec));
        registry.register(Arc::new(PrestoSpec));
        registry.register(Arc::new(GsheetsSpec));
        registry
    }

    pub fn register(&mut self, spec: Arc<dyn EngineSpec>) {
        let engine = spec.engine();
        if self.specs.insert(engine, spec).is_some() {
            tracing::warn!(engine, "engine spec re-registered, replacing previous");
        } else {
            tracing::debug!(engine, "registered engine spec");
        }
    }

    /// Exact lookup; `None` when the engine is unknown.
    pub fn get(&self, engine: &str) -> Option<Arc<dyn EngineSpec>> {
        self.specs.get(engine).cloned()
    }

    /// Lookup that always yields a usable spec.
    pub fn get_or_generic(&self, engine: &str) -> Arc<dyn EngineSpec> {
        match self.specs.get(engine) {
            Some(spec) => Arc::clone(spec),
            None => {
                tracing::debug!(engine, "no engine spec registered, using generic");
                Arc::clone(&self.fallback)
            }
        }
    }

    /// Spec for a connection URI, keyed on its engine tag.
    pub fn for_uri(&self, uri: &str) -> Option<Arc<dyn EngineSpec>> {
        let parsed = SqlaUri::parse(uri).ok()?;
        self.get(parsed.engine())
    }

    pub fn engines(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.keys().copied()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
