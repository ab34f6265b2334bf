//! SQL validation command
//!
//! Checks a statement against a database without running it: templating is
//! rendered first, then a static validator (resolved from configuration per
//! engine) inspects the SQL under a timeout and returns positioned
//! annotations instead of a pass/fail bit.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use quarry_core::command::{Command, CommandError};
use quarry_core::config::QuarryConfig;
use quarry_core::dao::MetadataStore;
use quarry_core::error::{ErrorKind, ErrorLevel, QuarryError};
use quarry_core::model::Database;
use quarry_engines::{EngineRegistry, EngineSpec};
use quarry_templates::{TemplateError, TemplateRenderer};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Raw driver failures that embed an HTTP 4xx status are client faults.
static HTTP_4XX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b4\d{2}\b").expect("static regex must compile"));

static LINE_COL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"line (\d+):(\d+):\s*(.+)").expect("static regex must compile"));

/// One finding from a static validator, positioned in the submitted SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlAnnotation {
    pub line_number: Option<u32>,
    pub start_column: Option<u32>,
    pub end_column: Option<u32>,
    pub message: String,
    pub severity: String,
}

/// Executes statements against a live database on behalf of a validator.
/// Injected so validators stay driver-agnostic and testable.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run_query(
        &self,
        database: &Database,
        sql: &str,
        catalog: Option<&str>,
        schema: Option<&str>,
    ) -> anyhow::Result<Vec<Value>>;
}

/// A static SQL checker for one engine family.
#[async_trait]
pub trait SqlValidator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn validate(
        &self,
        sql: &str,
        catalog: Option<&str>,
        schema: Option<&str>,
        database: &Database,
    ) -> anyhow::Result<Vec<SqlAnnotation>>;

    /// Best-effort engine-side cancellation after a timeout.
    async fn cancel_running(
        &self,
        _database: &Database,
        _spec: &dyn EngineSpec,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Validates by asking the engine to plan the statement without running it.
pub struct PrestoSqlValidator {
    runner: Arc<dyn QueryRunner>,
}

impl PrestoSqlValidator {
    pub fn new(runner: Arc<dyn QueryRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl SqlValidator for PrestoSqlValidator {
    fn name(&self) -> &'static str {
        "PrestoSqlValidator"
    }

    async fn validate(
        &self,
        sql: &str,
        catalog: Option<&str>,
        schema: Option<&str>,
        database: &Database,
    ) -> anyhow::Result<Vec<SqlAnnotation>> {
        let statement = format!("EXPLAIN (TYPE VALIDATE) {}", sql.trim().trim_end_matches(';'));
        match self
            .runner
            .run_query(database, &statement, catalog, schema)
            .await
        {
            Ok(_) => Ok(Vec::new()),
            Err(err) => {
                let raw = err.to_string();
                // Planner failures carry a position; anything else is not a
                // finding about the SQL and propagates as-is.
                let Some(caps) = LINE_COL_RE.captures(&raw) else {
                    return Err(err);
                };
                Ok(vec![SqlAnnotation {
                    line_number: caps[1].parse().ok(),
                    start_column: caps[2].parse().ok(),
                    end_column: None,
                    message: caps[3].to_string(),
                    severity: "error".to_string(),
                }])
            }
        }
    }

    async fn cancel_running(
        &self,
        database: &Database,
        spec: &dyn EngineSpec,
    ) -> anyhow::Result<()> {
        let Some(id_sql) = spec.get_cancel_query_id_sql() else {
            return Ok(());
        };
        let rows = self.runner.run_query(database, id_sql, None, None).await?;
        let Some(query_id) = rows
            .first()
            .and_then(|row| row.get("query_id"))
            .and_then(Value::as_str)
        else {
            return Ok(());
        };
        if let Some(cancel) = spec.cancel_query_sql(query_id) {
            self.runner.run_query(database, &cancel, None, None).await?;
        }
        Ok(())
    }
}

fn client_fault(message: impl Into<String>) -> CommandError {
    CommandError::Domain(
        QuarryError::new(ErrorKind::GenericCommand, message).with_level(ErrorLevel::Warning),
    )
}

fn system_fault(message: impl Into<String>) -> CommandError {
    CommandError::Domain(QuarryError::new(ErrorKind::GenericCommand, message))
}

/// Validate one SQL statement against a registered database.
pub struct ValidateSqlCommand<'a> {
    store: &'a dyn MetadataStore,
    config: &'a QuarryConfig,
    registry: &'a EngineRegistry,
    validators: &'a HashMap<String, Arc<dyn SqlValidator>>,
    model_id: i64,
    sql: String,
    catalog: Option<String>,
    schema: Option<String>,
    template_params: HashMap<String, Value>,
}

impl<'a> ValidateSqlCommand<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        config: &'a QuarryConfig,
        registry: &'a EngineRegistry,
        validators: &'a HashMap<String, Arc<dyn SqlValidator>>,
        model_id: i64,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            store,
            config,
            registry,
            validators,
            model_id,
            sql: sql.into(),
            catalog: None,
            schema: None,
            template_params: HashMap::new(),
        }
    }

    pub fn catalog(mut self, catalog: Option<String>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn template_params(mut self, params: HashMap<String, Value>) -> Self {
        self.template_params = params;
        self
    }

    fn lookup_database(&self) -> Result<Database, CommandError> {
        let mut session = self.store.begin();
        let database = session.databases().find_by_id(self.model_id);
        session.rollback();
        database.ok_or(CommandError::NotFound {
            kind: "Database",
            name: self.model_id.to_string(),
        })
    }

    fn resolve_validator(&self, engine: &str) -> Result<Arc<dyn SqlValidator>, CommandError> {
        let name = self
            .config
            .sql_validators_by_engine
            .get(engine)
            .ok_or_else(|| system_fault(format!("no SQL validator is configured for {engine}")))?;
        self.validators.get(name).cloned().ok_or_else(|| {
            system_fault(format!(
                "No validator named {name} found (configured for the {engine} engine)"
            ))
        })
    }
}

#[async_trait]
impl Command for ValidateSqlCommand<'_> {
    type Output = Vec<SqlAnnotation>;

    fn validate(&mut self) -> Result<(), CommandError> {
        let database = self.lookup_database()?;
        let engine = database.engine().unwrap_or("");
        self.resolve_validator(engine)?;
        Ok(())
    }

    async fn run(&mut self) -> Result<Vec<SqlAnnotation>, CommandError> {
        let database = self.lookup_database()?;
        let engine = database.engine().unwrap_or("").to_string();
        let spec = self.registry.get_or_generic(&engine);
        let validator = self.resolve_validator(&engine)?;

        let renderer = TemplateRenderer::new();
        let rendered = match renderer.render_if_enabled(
            &self.sql,
            &self.template_params,
            self.config.feature_flags.enable_template_processing,
        ) {
            Ok(sql) => sql,
            Err(TemplateError::Syntax(message)) => return Err(client_fault(message)),
            Err(TemplateError::Processing(message)) => {
                return Err(client_fault(format!(
                    "The template processing failed: {message}"
                )))
            }
        };

        let outcome = tokio::time::timeout(
            self.config.sqllab_validation_timeout,
            validator.validate(
                &rendered,
                self.catalog.as_deref(),
                self.schema.as_deref(),
                &database,
            ),
        )
        .await;

        match outcome {
            Ok(Ok(annotations)) => {
                tracing::debug!(
                    database_id = self.model_id,
                    findings = annotations.len(),
                    "sql validation finished"
                );
                Ok(annotations)
            }
            Ok(Err(err)) => {
                let raw = err.to_string();
                if HTTP_4XX_RE.is_match(&raw) {
                    Err(client_fault(raw))
                } else {
                    Err(system_fault(format!(
                        "{} was unable to check your query: {raw}",
                        validator.name()
                    )))
                }
            }
            Err(_elapsed) => {
                if spec.supports_cancellation() {
                    if let Err(err) = validator.cancel_running(&database, spec.as_ref()).await {
                        tracing::warn!(
                            engine = %engine,
                            error = %err,
                            "could not cancel the timed-out validation query"
                        );
                    }
                }
                Err(CommandError::Domain(QuarryError::new(
                    ErrorKind::BackendTimeout,
                    format!(
                        "SQL validation timed out after {} seconds",
                        self.config.sqllab_validation_timeout.as_secs()
                    ),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use quarry_core::memstore::MemStore;
    use serde_json::json;
    use std::time::Duration;

    struct RecordingValidator {
        seen: Arc<Mutex<Option<String>>>,
        outcome: Result<Vec<SqlAnnotation>, String>,
    }

    #[async_trait]
    impl SqlValidator for RecordingValidator {
        fn name(&self) -> &'static str {
            "RecordingValidator"
        }

        async fn validate(
            &self,
            sql: &str,
            _catalog: Option<&str>,
            _schema: Option<&str>,
            _database: &Database,
        ) -> anyhow::Result<Vec<SqlAnnotation>> {
            *self.seen.lock() = Some(sql.to_string());
            match &self.outcome {
                Ok(annotations) => Ok(annotations.clone()),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }
    }

    struct SleepyValidator;

    #[async_trait]
    impl SqlValidator for SleepyValidator {
        fn name(&self) -> &'static str {
            "SleepyValidator"
        }

        async fn validate(
            &self,
            _sql: &str,
            _catalog: Option<&str>,
            _schema: Option<&str>,
            _database: &Database,
        ) -> anyhow::Result<Vec<SqlAnnotation>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    fn seeded_store() -> (MemStore, i64) {
        let store = MemStore::new();
        let mut session = store.begin();
        let db = session
            .databases()
            .upsert(Database::new("local", "sqlite:///t.db"))
            .unwrap();
        let id = db.id.unwrap();
        session.commit().unwrap();
        (store, id)
    }

    fn config_with_validator() -> QuarryConfig {
        let mut config = QuarryConfig::default();
        config
            .sql_validators_by_engine
            .insert("sqlite".to_string(), "recording".to_string());
        config
    }

    fn validators(
        validator: Arc<dyn SqlValidator>,
    ) -> HashMap<String, Arc<dyn SqlValidator>> {
        HashMap::from([("recording".to_string(), validator)])
    }

    #[tokio::test]
    async fn renders_templates_before_validating() {
        let (store, id) = seeded_store();
        let config = config_with_validator();
        let registry = EngineRegistry::with_defaults();
        let seen = Arc::new(Mutex::new(None));
        let validators = validators(Arc::new(RecordingValidator {
            seen: Arc::clone(&seen),
            outcome: Ok(Vec::new()),
        }));
        let annotations = ValidateSqlCommand::new(
            &store,
            &config,
            &registry,
            &validators,
            id,
            "SELECT * FROM t WHERE x = '{{ p }}'",
        )
        .template_params(HashMap::from([("p".to_string(), json!("v"))]))
        .run()
        .await
        .unwrap();
        assert_eq!(annotations, Vec::new());
        assert_eq!(
            seen.lock().as_deref(),
            Some("SELECT * FROM t WHERE x = 'v'")
        );
    }

    #[tokio::test]
    async fn undefined_template_variable_never_reaches_the_validator() {
        let (store, id) = seeded_store();
        let config = config_with_validator();
        let registry = EngineRegistry::with_defaults();
        let seen = Arc::new(Mutex::new(None));
        let validators = validators(Arc::new(RecordingValidator {
            seen: Arc::clone(&seen),
            outcome: Ok(Vec::new()),
        }));
        let err = ValidateSqlCommand::new(
            &store,
            &config,
            &registry,
            &validators,
            id,
            "SELECT '{{ missing }}'",
        )
        .run()
        .await
        .unwrap_err();
        let CommandError::Domain(domain) = err else {
            panic!("expected a domain error");
        };
        assert!(domain.message.contains("'missing' is undefined"));
        // Client-correctable, so no internal-failure prefix.
        assert!(!domain.message.contains("The template processing failed"));
        assert_eq!(domain.status(), 400);
        assert_eq!(*seen.lock(), None);
    }

    #[tokio::test]
    async fn unknown_database_is_not_found() {
        let store = MemStore::new();
        let config = config_with_validator();
        let registry = EngineRegistry::with_defaults();
        let validators = validators(Arc::new(RecordingValidator {
            seen: Arc::new(Mutex::new(None)),
            outcome: Ok(Vec::new()),
        }));
        let err = ValidateSqlCommand::new(&store, &config, &registry, &validators, 99, "SELECT 1")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotFound { kind: "Database", .. }));
    }

    #[tokio::test]
    async fn missing_validator_config_is_a_system_fault() {
        let (store, id) = seeded_store();
        let config = QuarryConfig::default();
        let registry = EngineRegistry::with_defaults();
        let validators = HashMap::new();
        let err = ValidateSqlCommand::new(&store, &config, &registry, &validators, id, "SELECT 1")
            .run()
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("no SQL validator is configured for sqlite"));
    }

    #[tokio::test]
    async fn http_4xx_failures_surface_as_client_faults() {
        let (store, id) = seeded_store();
        let config = config_with_validator();
        let registry = EngineRegistry::with_defaults();
        let validators = validators(Arc::new(RecordingValidator {
            seen: Arc::new(Mutex::new(None)),
            outcome: Err("HTTP 401: credentials rejected".to_string()),
        }));
        let err = ValidateSqlCommand::new(&store, &config, &registry, &validators, id, "SELECT 1")
            .run()
            .await
            .unwrap_err();
        let CommandError::Domain(domain) = err else {
            panic!("expected a domain error");
        };
        assert_eq!(domain.status(), 400);
        assert!(domain.message.contains("401"));
    }

    #[tokio::test]
    async fn slow_validators_hit_the_configured_timeout() {
        let (store, id) = seeded_store();
        let mut config = config_with_validator();
        config.sqllab_validation_timeout = Duration::from_millis(20);
        let registry = EngineRegistry::with_defaults();
        let validators: HashMap<String, Arc<dyn SqlValidator>> =
            HashMap::from([("recording".to_string(), Arc::new(SleepyValidator) as _)]);
        let err = ValidateSqlCommand::new(&store, &config, &registry, &validators, id, "SELECT 1")
            .run()
            .await
            .unwrap_err();
        let CommandError::Domain(domain) = err else {
            panic!("expected a domain error");
        };
        assert_eq!(domain.error_type, ErrorKind::BackendTimeout);
    }

    struct ScriptedRunner {
        statements: Arc<Mutex<Vec<String>>>,
        error: Option<String>,
    }

    #[async_trait]
    impl QueryRunner for ScriptedRunner {
        async fn run_query(
            &self,
            _database: &Database,
            sql: &str,
            _catalog: Option<&str>,
            _schema: Option<&str>,
        ) -> anyhow::Result<Vec<Value>> {
            self.statements.lock().push(sql.to_string());
            match &self.error {
                Some(message) => Err(anyhow::anyhow!(message.clone())),
                None => Ok(Vec::new()),
            }
        }
    }

    #[tokio::test]
    async fn presto_validator_plans_without_running() {
        let statements = Arc::new(Mutex::new(Vec::new()));
        let validator = PrestoSqlValidator::new(Arc::new(ScriptedRunner {
            statements: Arc::clone(&statements),
            error: None,
        }));
        let database = Database::new("lake", "presto://h:8080/hive");
        let annotations = validator
            .validate("SELECT 1;", None, None, &database)
            .await
            .unwrap();
        assert_eq!(annotations, Vec::new());
        assert_eq!(
            statements.lock().as_slice(),
            ["EXPLAIN (TYPE VALIDATE) SELECT 1"]
        );
    }

    #[tokio::test]
    async fn presto_planner_errors_become_positioned_annotations() {
        let validator = PrestoSqlValidator::new(Arc::new(ScriptedRunner {
            statements: Arc::new(Mutex::new(Vec::new())),
            error: Some("line 3:10: mismatched input 'FORM'".to_string()),
        }));
        let database = Database::new("lake", "presto://h:8080/hive");
        let annotations = validator
            .validate("SELECT 1 FORM t", None, None, &database)
            .await
            .unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].line_number, Some(3));
        assert_eq!(annotations[0].start_column, Some(10));
        assert_eq!(annotations[0].message, "mismatched input 'FORM'");
        assert_eq!(annotations[0].severity, "error");
    }
}
