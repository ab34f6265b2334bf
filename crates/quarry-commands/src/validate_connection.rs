//! Connection validation
//!
//! Two commands over the same properties map. The parameters command checks
//! the payload shape (engine parameters, name uniqueness, tunnel structure)
//! and accumulates every fault into one failure; the test-connection command
//! recomposes a full URI, merges stored secrets over their masks, and probes
//! the database through an injected [`ConnectionProbe`].

use async_trait::async_trait;
use quarry_core::command::{Command, CommandError};
use quarry_core::config::QuarryConfig;
use quarry_core::dao::MetadataStore;
use quarry_core::error::{ErrorKind, ErrorLevel, QuarryError};
use quarry_core::model::Database;
use quarry_core::secrets::PASSWORD_MASK;
use quarry_engines::{ConnectionContext, EngineRegistry, EngineSpec, SqlaUri};
use serde_json::{json, Value};
use std::sync::Arc;

/// Engines whose connections can only be exercised at create time; parameter
/// validation short-circuits to the name-uniqueness check for these.
const BYPASS_VALIDATION_ENGINES: &[&str] = &["sqlite"];

/// Opens a connection and pings it through the host's driver layer.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// `Ok(true)` means the database answered, `Ok(false)` means the dialect
    /// reported it unreachable, `Err` carries the raw driver failure.
    async fn do_ping(&self, uri: &str, encrypted_extra: Option<&str>) -> anyhow::Result<bool>;
}

fn str_field<'v>(properties: &'v Value, key: &str) -> Option<&'v str> {
    properties.get(key).and_then(Value::as_str)
}

fn field_present(value: &Value, key: &str) -> bool {
    value
        .get(key)
        .map(|v| !v.is_null() && v.as_str() != Some(""))
        .unwrap_or(false)
}

fn name_conflict(store: &dyn MetadataStore, name: &str, id: Option<i64>) -> Option<QuarryError> {
    let mut session = store.begin();
    let existing = session.databases().find_by_name(name);
    session.rollback();
    match existing {
        // On update the row may legitimately be itself.
        Some(db) if id.is_none() || db.id != id => Some(
            QuarryError::new(
                ErrorKind::GenericCommand,
                "A database with the same name already exists.",
            )
            .with_level(ErrorLevel::Warning)
            .with_extra("invalid", json!(["database_name"])),
        ),
        _ => None,
    }
}

fn tunnel_errors(tunnel: &Value) -> Vec<QuarryError> {
    let mut errors = Vec::new();
    let mut missing: Vec<&str> = ["server_address", "server_port", "username"]
        .into_iter()
        .filter(|field| !field_present(tunnel, field))
        .collect();

    let has_password = field_present(tunnel, "password");
    let has_key = field_present(tunnel, "private_key");
    if !has_password && !has_key {
        errors.push(
            QuarryError::new(
                ErrorKind::GenericCommand,
                "Must provide credentials for the SSH Tunnel",
            )
            .with_level(ErrorLevel::Warning),
        );
    }
    if has_password && has_key {
        errors.push(
            QuarryError::new(
                ErrorKind::GenericCommand,
                "Cannot have multiple credentials for the SSH Tunnel",
            )
            .with_level(ErrorLevel::Warning),
        );
    }
    if has_key && !field_present(tunnel, "private_key_password") {
        missing.push("private_key_password");
    }

    if !missing.is_empty() {
        errors.insert(
            0,
            QuarryError::new(
                ErrorKind::ConnectionMissingParameters,
                format!(
                    "One or more parameters are missing: {}",
                    missing.join(", ")
                ),
            )
            .with_level(ErrorLevel::Warning)
            .with_extra("missing", json!(missing)),
        );
    }
    errors
}

/// Validate a database-connection properties map without touching the
/// network. Every fault is accumulated and surfaced in one
/// [`CommandError::Validation`].
pub struct ValidateDatabaseParametersCommand<'a> {
    store: &'a dyn MetadataStore,
    config: &'a QuarryConfig,
    registry: &'a EngineRegistry,
    properties: Value,
}

impl<'a> ValidateDatabaseParametersCommand<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        config: &'a QuarryConfig,
        registry: &'a EngineRegistry,
        properties: Value,
    ) -> Self {
        Self {
            store,
            config,
            registry,
            properties,
        }
    }

    fn tunnel_feature_check(&self) -> Result<(), CommandError> {
        let present = self
            .properties
            .get("ssh_tunnel")
            .map(|v| !v.is_null())
            .unwrap_or(false);
        if present && !self.config.feature_flags.ssh_tunneling {
            return Err(CommandError::Domain(
                QuarryError::new(ErrorKind::GenericCommand, "SSH Tunneling is not enabled")
                    .with_level(ErrorLevel::Warning),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Command for ValidateDatabaseParametersCommand<'_> {
    type Output = ();

    fn validate(&mut self) -> Result<(), CommandError> {
        let Some(engine) = str_field(&self.properties, "engine") else {
            return Err(CommandError::invalid(
                "Invalid connection parameters",
                "engine",
                "Missing data for required field.",
            ));
        };
        let Some(spec) = self.registry.get(engine) else {
            return Err(CommandError::invalid(
                "Invalid connection parameters",
                "engine",
                format!("Engine \"{engine}\" is not supported."),
            ));
        };

        let id = self.properties.get("id").and_then(Value::as_i64);
        let name = str_field(&self.properties, "database_name");

        if BYPASS_VALIDATION_ENGINES.contains(&engine) {
            if let Some(name) = name {
                if let Some(err) = name_conflict(self.store, name, id) {
                    return Err(CommandError::Validation(vec![err]));
                }
            }
            return Ok(());
        }

        self.tunnel_feature_check()?;

        let mut errors = spec.validate_parameters(&self.properties);
        if let Some(driver) = str_field(&self.properties, "driver") {
            if !self.config.is_driver_allowed(driver) {
                errors.push(
                    QuarryError::new(
                        ErrorKind::GenericCommand,
                        format!("Driver \"{driver}\" is not allowed."),
                    )
                    .with_level(ErrorLevel::Warning)
                    .with_extra("invalid", json!(["driver"])),
                );
            }
        }
        if let Some(name) = name {
            errors.extend(name_conflict(self.store, name, id));
        }
        if let Some(tunnel) = self.properties.get("ssh_tunnel").filter(|v| !v.is_null()) {
            errors.extend(tunnel_errors(tunnel));
        }

        if !errors.is_empty() {
            return Err(CommandError::Validation(errors));
        }
        Ok(())
    }

    async fn run(&mut self) -> Result<(), CommandError> {
        self.validate()
    }
}

/// Recompose a full connection URI from the properties map and probe the
/// database through the injected driver seam.
pub struct TestConnectionCommand<'a> {
    store: &'a dyn MetadataStore,
    config: &'a QuarryConfig,
    registry: &'a EngineRegistry,
    probe: &'a dyn ConnectionProbe,
    properties: Value,
}

impl<'a> TestConnectionCommand<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        config: &'a QuarryConfig,
        registry: &'a EngineRegistry,
        probe: &'a dyn ConnectionProbe,
        properties: Value,
    ) -> Self {
        Self {
            store,
            config,
            registry,
            probe,
            properties,
        }
    }

    fn stored_database(&self) -> Option<Database> {
        let id = self.properties.get("id").and_then(Value::as_i64)?;
        let mut session = self.store.begin();
        let database = session.databases().find_by_id(id);
        session.rollback();
        database
    }

    fn resolve_spec(&self) -> Arc<dyn EngineSpec> {
        if let Some(engine) = str_field(&self.properties, "engine") {
            return self.registry.get_or_generic(engine);
        }
        str_field(&self.properties, "sqlalchemy_uri")
            .and_then(|uri| self.registry.for_uri(uri))
            .unwrap_or_else(|| self.registry.get_or_generic(""))
    }

    /// The URI under test, with the stored password spliced over the mask
    /// when the caller is re-testing a persisted connection.
    fn resolve_uri(&self, spec: &Arc<dyn EngineSpec>) -> Result<SqlaUri, CommandError> {
        let raw = match str_field(&self.properties, "sqlalchemy_uri") {
            Some(uri) => uri.to_string(),
            None => {
                let parameters = self
                    .properties
                    .get("parameters")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                spec.build_sqlalchemy_uri(&parameters, str_field(&self.properties, "encrypted_extra"))
                    .map_err(|err| {
                        CommandError::invalid(
                            "Could not build a connection URI",
                            "parameters",
                            err.to_string(),
                        )
                    })?
            }
        };
        let mut uri = SqlaUri::parse(&raw).map_err(|err| {
            CommandError::invalid("Invalid connection string", "sqlalchemy_uri", err.to_string())
        })?;
        if uri.password.as_deref() == Some(PASSWORD_MASK) {
            if let Some(stored) = self.stored_database() {
                if let Ok(stored_uri) = SqlaUri::parse(&stored.sqlalchemy_uri) {
                    uri.password = stored_uri.password;
                }
            }
        }
        Ok(uri)
    }

    fn merged_encrypted_extra(&self, spec: &Arc<dyn EngineSpec>) -> Option<String> {
        let new = str_field(&self.properties, "encrypted_extra");
        let old = self.stored_database().and_then(|db| db.encrypted_extra);
        spec.unmask_encrypted_extra(old.as_deref(), new)
    }

    fn has_oauth2_config(&self) -> bool {
        for key in ["encrypted_extra", "extra"] {
            if let Some(text) = str_field(&self.properties, key) {
                if let Ok(value) = serde_json::from_str::<Value>(text) {
                    if value.get("oauth2_client_info").is_some() {
                        return true;
                    }
                }
            }
        }
        self.stored_database()
            .and_then(|db| db.extra)
            .and_then(|text| serde_json::from_str::<Value>(&text).ok())
            .map(|value| value.get("oauth2_client_info").is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Command for TestConnectionCommand<'_> {
    type Output = ();

    fn validate(&mut self) -> Result<(), CommandError> {
        if str_field(&self.properties, "sqlalchemy_uri").is_none()
            && self.properties.get("parameters").is_none()
        {
            return Err(CommandError::invalid(
                "Could not test the connection",
                "sqlalchemy_uri",
                "Must provide a connection URI or parameters.",
            ));
        }
        let tunnel_present = self
            .properties
            .get("ssh_tunnel")
            .map(|v| !v.is_null())
            .unwrap_or(false);
        if tunnel_present && !self.config.feature_flags.ssh_tunneling {
            return Err(CommandError::Domain(
                QuarryError::new(ErrorKind::GenericCommand, "SSH Tunneling is not enabled")
                    .with_level(ErrorLevel::Warning),
            ));
        }
        Ok(())
    }

    async fn run(&mut self) -> Result<(), CommandError> {
        self.validate()?;
        let spec = self.resolve_spec();
        let uri = self.resolve_uri(&spec)?;
        let encrypted_extra = self.merged_encrypted_extra(&spec);
        let context = ConnectionContext::from_uri(&uri);

        match self
            .probe
            .do_ping(&uri.to_uri_string(), encrypted_extra.as_deref())
            .await
        {
            Ok(true) => {
                tracing::info!(uri = %uri.masked(), "connection test succeeded");
                Ok(())
            }
            Ok(false) => Err(CommandError::Domain(QuarryError::new(
                ErrorKind::GenericDbEngine,
                "The database is offline.",
            ))),
            Err(err) => {
                let raw = err.to_string();
                if spec.supports_oauth2() && spec.needs_oauth2(&raw) && self.has_oauth2_config() {
                    // A later interactive run triggers the authorization flow.
                    tracing::info!(
                        engine = spec.engine(),
                        "connection needs an OAuth2 grant; deferring to the interactive flow"
                    );
                    return Ok(());
                }
                Err(CommandError::Validation(spec.extract_errors(&raw, &context)))
            }
        }
    }
}
