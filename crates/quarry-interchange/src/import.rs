//! Bundle importer
//!
//! `ImportBundleCommand` takes the flat `filename → YAML` mapping, validates
//! every document, resolves the dependency DAG, and materializes entities in
//! dependency order inside one transaction. Version dispatch walks an
//! ordered adapter list: an adapter that rejects the bundle's declared
//! version steps aside for the next one; a bundle rejected by every adapter
//! is malformed.

use crate::document::{
    BundleContents, ChartDoc, DashboardDoc, DatabaseDoc, DatasetDoc, EntityKind, SavedQueryDoc,
    METADATA_FILE_NAME,
};
use crate::importers::{
    import_chart, import_dashboard, import_database, import_dataset, import_saved_query,
    ImportContext,
};
use crate::schema::{self, MetadataError};
use quarry_core::auth::AuthorizationGate;
use quarry_core::command::{Command, CommandError, CommandInvalid};
use quarry_core::dao::MetadataStore;
use quarry_core::model::Database;
use quarry_core::secrets::PASSWORD_MASK;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Entity counts materialized by a successful import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub databases: usize,
    pub datasets: usize,
    pub charts: usize,
    pub dashboards: usize,
    pub saved_queries: usize,
}

/// Side-channel credentials, keyed by bundle filename. Secrets ride here so
/// they never appear in the YAML documents themselves.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BundleCredentials {
    #[serde(default)]
    pub passwords: HashMap<String, String>,
    #[serde(default)]
    pub ssh_tunnel_passwords: HashMap<String, String>,
    #[serde(default)]
    pub ssh_tunnel_private_keys: HashMap<String, String>,
    #[serde(default)]
    pub ssh_tunnel_priv_key_passwords: HashMap<String, String>,
}

struct ParsedBundle {
    databases: Vec<(String, DatabaseDoc)>,
    datasets: Vec<(String, DatasetDoc)>,
    charts: Vec<(String, ChartDoc)>,
    dashboards: Vec<(String, DashboardDoc)>,
    queries: Vec<(String, SavedQueryDoc)>,
}

enum AdapterError {
    /// The adapter does not speak this bundle's version; try the next one.
    WrongVersion,
    Invalid(CommandInvalid),
}

impl From<AdapterError> for CommandError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::WrongVersion => CommandError::Invalid(CommandInvalid::new(
                "Could not find a valid command to import file",
            )),
            AdapterError::Invalid(invalid) => CommandError::Invalid(invalid),
        }
    }
}

/// Chart UUIDs a dashboard layout references.
fn chart_uuids_in_position(position: &Value) -> Vec<Uuid> {
    let mut uuids = Vec::new();
    if let Some(components) = position.as_object() {
        for component in components.values() {
            if component.get("type").and_then(Value::as_str) != Some("CHART") {
                continue;
            }
            if let Some(uuid) = component
                .get("meta")
                .and_then(|m| m.get("uuid"))
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                uuids.push(uuid);
            }
        }
    }
    uuids
}

/// The `1.0.0` bundle adapter.
struct ImportV1;

impl ImportV1 {
    fn parse(
        &self,
        contents: &BundleContents,
        credentials: &BundleCredentials,
    ) -> Result<ParsedBundle, AdapterError> {
        let mut invalid = CommandInvalid::new("Error importing bundle");

        let Some(metadata_text) = contents.get(METADATA_FILE_NAME) else {
            invalid.add(METADATA_FILE_NAME, "Missing data for required field.");
            return Err(AdapterError::Invalid(invalid));
        };
        let metadata_value = match schema::parse_document(metadata_text) {
            Ok(value) => value,
            Err(message) => {
                invalid.add(METADATA_FILE_NAME, message);
                return Err(AdapterError::Invalid(invalid));
            }
        };
        match schema::validate_metadata(&metadata_value) {
            Ok(_) => {}
            Err(MetadataError::IncorrectVersion { .. }) => return Err(AdapterError::WrongVersion),
            Err(MetadataError::Invalid(fields)) => {
                for (field, messages) in fields {
                    for message in messages {
                        invalid.add(format!("{METADATA_FILE_NAME}.{field}"), message);
                    }
                }
                return Err(AdapterError::Invalid(invalid));
            }
        }

        let mut bundle = ParsedBundle {
            databases: Vec::new(),
            datasets: Vec::new(),
            charts: Vec::new(),
            dashboards: Vec::new(),
            queries: Vec::new(),
        };

        for (filename, text) in contents {
            let Some(kind) = EntityKind::from_filename(filename) else {
                continue;
            };
            let value = match schema::parse_document(text) {
                Ok(value) => value,
                Err(message) => {
                    invalid.add(filename.clone(), message);
                    continue;
                }
            };
            let messages = match kind {
                EntityKind::Database => schema::validate_database(&value),
                EntityKind::Dataset => schema::validate_dataset(&value),
                EntityKind::Chart => schema::validate_chart(&value),
                EntityKind::Dashboard => schema::validate_dashboard(&value),
                EntityKind::SavedQuery => schema::validate_saved_query(&value),
            };
            if !messages.is_empty() {
                for (field, msgs) in messages {
                    for message in msgs {
                        invalid.add(format!("{filename}.{field}"), message);
                    }
                }
                continue;
            }
            match kind {
                EntityKind::Database => {
                    match serde_json::from_value::<DatabaseDoc>(value) {
                        Ok(mut doc) => {
                            self.merge_credentials(filename, &mut doc, credentials, &mut invalid);
                            bundle.databases.push((filename.clone(), doc));
                        }
                        Err(err) => invalid.add(filename.clone(), err.to_string()),
                    }
                }
                EntityKind::Dataset => match serde_json::from_value::<DatasetDoc>(value) {
                    Ok(doc) => bundle.datasets.push((filename.clone(), doc)),
                    Err(err) => invalid.add(filename.clone(), err.to_string()),
                },
                EntityKind::Chart => match serde_json::from_value::<ChartDoc>(value) {
                    Ok(doc) => bundle.charts.push((filename.clone(), doc)),
                    Err(err) => invalid.add(filename.clone(), err.to_string()),
                },
                EntityKind::Dashboard => match serde_json::from_value::<DashboardDoc>(value) {
                    Ok(doc) => bundle.dashboards.push((filename.clone(), doc)),
                    Err(err) => invalid.add(filename.clone(), err.to_string()),
                },
                EntityKind::SavedQuery => match serde_json::from_value::<SavedQueryDoc>(value) {
                    Ok(doc) => bundle.queries.push((filename.clone(), doc)),
                    Err(err) => invalid.add(filename.clone(), err.to_string()),
                },
            }
        }

        if !invalid.is_empty() {
            return Err(AdapterError::Invalid(invalid));
        }

        // Deterministic import order within each kind.
        bundle.databases.sort_by_key(|(_, doc)| doc.uuid);
        bundle.datasets.sort_by_key(|(_, doc)| doc.uuid);
        bundle.charts.sort_by_key(|(_, doc)| doc.uuid);
        bundle.dashboards.sort_by_key(|(_, doc)| doc.uuid);
        bundle.queries.sort_by_key(|(_, doc)| doc.uuid);
        Ok(bundle)
    }

    /// Merge side-channel secrets into a database document and reject masked
    /// sentinels that have no side-channel replacement.
    fn merge_credentials(
        &self,
        filename: &str,
        doc: &mut DatabaseDoc,
        credentials: &BundleCredentials,
        invalid: &mut CommandInvalid,
    ) {
        if let Some(password) = credentials.passwords.get(filename) {
            doc.password = Some(password.clone());
        } else if doc.password.as_deref() == Some(PASSWORD_MASK) {
            invalid.add(
                format!("{filename}.password"),
                "Must provide a password for the database.",
            );
        }
        let Some(tunnel) = &mut doc.ssh_tunnel else {
            return;
        };
        if let Some(password) = credentials.ssh_tunnel_passwords.get(filename) {
            tunnel.password = Some(password.clone());
        } else if tunnel.password.as_deref() == Some(PASSWORD_MASK) {
            invalid.add(
                format!("{filename}.ssh_tunnel.password"),
                "Must provide a password for the ssh tunnel.",
            );
        }
        if let Some(key) = credentials.ssh_tunnel_private_keys.get(filename) {
            tunnel.private_key = Some(key.clone());
        } else if tunnel.private_key.as_deref() == Some(PASSWORD_MASK) {
            invalid.add(
                format!("{filename}.ssh_tunnel.private_key"),
                "Must provide a private key for the ssh tunnel.",
            );
        }
        if let Some(password) = credentials.ssh_tunnel_priv_key_passwords.get(filename) {
            tunnel.private_key_password = Some(password.clone());
        } else if tunnel.private_key_password.as_deref() == Some(PASSWORD_MASK) {
            invalid.add(
                format!("{filename}.ssh_tunnel.private_key_password"),
                "Must provide a private key password for the ssh tunnel.",
            );
        }
    }

    /// Materialize a parsed bundle in dependency order.
    fn import(
        &self,
        ctx: &mut ImportContext<'_>,
        bundle_type: &str,
        bundle: ParsedBundle,
    ) -> Result<ImportSummary, CommandError> {
        let mut summary = ImportSummary::default();

        // Dependency closure: which databases, datasets and charts are
        // actually needed. Root-kind documents are always in scope.
        let chart_uuids_needed: HashSet<Uuid> = bundle
            .dashboards
            .iter()
            .flat_map(|(_, doc)| {
                doc.position
                    .as_ref()
                    .map(chart_uuids_in_position)
                    .unwrap_or_default()
            })
            .collect();
        let charts_in_scope: Vec<&(String, ChartDoc)> = bundle
            .charts
            .iter()
            .filter(|(_, doc)| bundle_type == "Slice" || chart_uuids_needed.contains(&doc.uuid))
            .collect();
        let dataset_uuids_needed: HashSet<Uuid> = charts_in_scope
            .iter()
            .map(|(_, doc)| doc.dataset_uuid)
            .collect();
        let datasets_in_scope: Vec<&(String, DatasetDoc)> = bundle
            .datasets
            .iter()
            .filter(|(_, doc)| {
                bundle_type == "SqlaTable" || dataset_uuids_needed.contains(&doc.uuid)
            })
            .collect();
        let database_uuids_needed: HashSet<Uuid> = datasets_in_scope
            .iter()
            .map(|(_, doc)| doc.database_uuid)
            .chain(bundle.queries.iter().map(|(_, doc)| doc.database_uuid))
            .collect();

        let mut databases_by_uuid: HashMap<Uuid, Database> = HashMap::new();
        for (filename, doc) in &bundle.databases {
            if bundle_type != "Database" && !database_uuids_needed.contains(&doc.uuid) {
                continue;
            }
            tracing::debug!(filename = %filename, uuid = %doc.uuid, "importing database");
            let database = import_database(ctx, doc.clone())?;
            databases_by_uuid.insert(doc.uuid, database);
            summary.databases += 1;
        }

        let mut datasets_by_uuid = HashMap::new();
        for (filename, doc) in datasets_in_scope {
            let database = match databases_by_uuid.get(&doc.database_uuid) {
                Some(database) => database.clone(),
                None => ctx
                    .session
                    .databases()
                    .find_by_uuid(doc.database_uuid)
                    .ok_or_else(|| {
                        CommandError::invalid(
                            "Error importing bundle",
                            filename.clone(),
                            format!("Database {} not found", doc.database_uuid),
                        )
                    })?,
            };
            tracing::debug!(filename = %filename, uuid = %doc.uuid, "importing dataset");
            let dataset = import_dataset(ctx, doc.clone(), &database)?;
            datasets_by_uuid.insert(doc.uuid, dataset);
            summary.datasets += 1;
        }

        let mut chart_ids_by_uuid: HashMap<Uuid, i64> = HashMap::new();
        for (filename, doc) in charts_in_scope {
            let dataset = match datasets_by_uuid.get(&doc.dataset_uuid) {
                Some(dataset) => dataset.clone(),
                None => ctx
                    .session
                    .datasets()
                    .find_all_by_uuid(doc.dataset_uuid)
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        CommandError::invalid(
                            "Error importing bundle",
                            filename.clone(),
                            format!("Dataset {} not found", doc.dataset_uuid),
                        )
                    })?,
            };
            tracing::debug!(filename = %filename, uuid = %doc.uuid, "importing chart");
            let chart = import_chart(ctx, doc.clone(), &dataset)?;
            if let Some(id) = chart.id {
                chart_ids_by_uuid.insert(doc.uuid, id);
            }
            summary.charts += 1;
        }

        let mut links: Vec<(i64, i64)> = Vec::new();
        for (filename, doc) in &bundle.dashboards {
            tracing::debug!(filename = %filename, uuid = %doc.uuid, "importing dashboard");
            let imported = import_dashboard(ctx, doc.clone(), &chart_ids_by_uuid)?;
            if let Some(dashboard_id) = imported.dashboard.id {
                links.extend(imported.chart_ids.iter().map(|&c| (dashboard_id, c)));
            }
            summary.dashboards += 1;
        }
        // Join rows go in after every entity exists; `link_chart` skips pairs
        // already present so repeated imports stay idempotent.
        for (dashboard_id, chart_id) in links {
            ctx.session
                .dashboards()
                .link_chart(dashboard_id, chart_id)
                .map_err(|err| CommandError::Exception(err.into()))?;
        }

        for (filename, doc) in &bundle.queries {
            let database = match databases_by_uuid.get(&doc.database_uuid) {
                Some(database) => database.clone(),
                None => ctx
                    .session
                    .databases()
                    .find_by_uuid(doc.database_uuid)
                    .ok_or_else(|| {
                        CommandError::invalid(
                            "Error importing bundle",
                            filename.clone(),
                            format!("Database {} not found", doc.database_uuid),
                        )
                    })?,
            };
            import_saved_query(ctx, doc.clone(), &database)?;
            summary.saved_queries += 1;
        }

        Ok(summary)
    }
}

/// Import a bundle of exported content into the local instance.
pub struct ImportBundleCommand<'a> {
    store: &'a dyn MetadataStore,
    gate: &'a dyn AuthorizationGate,
    contents: BundleContents,
    overwrite: bool,
    credentials: BundleCredentials,
    ignore_permissions: bool,
    expected_kind: Option<EntityKind>,
}

impl<'a> ImportBundleCommand<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        gate: &'a dyn AuthorizationGate,
        contents: BundleContents,
    ) -> Self {
        Self {
            store,
            gate,
            contents,
            overwrite: false,
            credentials: BundleCredentials::default(),
            ignore_permissions: false,
            expected_kind: None,
        }
    }

    /// Restrict the bundle to one root kind, as the per-kind import surfaces
    /// do. The generic assets path leaves this unset.
    pub fn expect_kind(mut self, kind: EntityKind) -> Self {
        self.expected_kind = Some(kind);
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn credentials(mut self, credentials: BundleCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Seed-content path; threads through every sub-importer.
    pub fn ignore_permissions(mut self, ignore: bool) -> Self {
        self.ignore_permissions = ignore;
        self
    }

    fn bundle_type(&self) -> String {
        self.contents
            .get(METADATA_FILE_NAME)
            .and_then(|text| schema::parse_document(text).ok())
            .and_then(|value| {
                value
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }

    fn adapters(&self) -> Vec<ImportV1> {
        vec![ImportV1]
    }

    fn check_bundle_type(&self) -> Result<(), CommandError> {
        let Some(expected) = self.expected_kind else {
            return Ok(());
        };
        let found = self.bundle_type();
        if found != expected.metadata_type() {
            return Err(CommandError::invalid(
                "Error importing bundle",
                format!("{METADATA_FILE_NAME}.type"),
                format!("Must be equal to {}.", expected.metadata_type()),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Command for ImportBundleCommand<'_> {
    type Output = ImportSummary;

    fn validate(&mut self) -> Result<(), CommandError> {
        self.check_bundle_type()?;
        for adapter in self.adapters() {
            match adapter.parse(&self.contents, &self.credentials) {
                Ok(_) => return Ok(()),
                Err(AdapterError::WrongVersion) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(AdapterError::WrongVersion.into())
    }

    async fn run(&mut self) -> Result<ImportSummary, CommandError> {
        self.check_bundle_type()?;
        let bundle_type = self.bundle_type();
        for adapter in self.adapters() {
            let bundle = match adapter.parse(&self.contents, &self.credentials) {
                Ok(bundle) => bundle,
                Err(AdapterError::WrongVersion) => continue,
                Err(err) => return Err(err.into()),
            };

            let mut session = self.store.begin();
            let mut ctx = ImportContext {
                session: session.as_mut(),
                gate: self.gate,
                overwrite: self.overwrite,
                ignore_permissions: self.ignore_permissions,
            };
            return match adapter.import(&mut ctx, &bundle_type, bundle) {
                Ok(summary) => {
                    session
                        .commit()
                        .map_err(|err| CommandError::Exception(err.into()))?;
                    tracing::info!(
                        databases = summary.databases,
                        datasets = summary.datasets,
                        charts = summary.charts,
                        dashboards = summary.dashboards,
                        saved_queries = summary.saved_queries,
                        "bundle imported"
                    );
                    Ok(summary)
                }
                Err(err) => {
                    // Atomicity: a half-imported bundle must never be
                    // visible.
                    session.rollback();
                    Err(err)
                }
            };
        }
        Err(AdapterError::WrongVersion.into())
    }
}
