//! Quarry command-line interface
//!
//! Thin collaborator boundary over the command layer: bundle import/export
//! against a JSON-backed reference store, connection testing, and static SQL
//! validation. Exit codes: 0 success, 1 user-input fault, 3 authorization
//! denial, 2 anything else.

use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use quarry_commands::{
    ConnectionProbe, SqlAnnotation, SqlValidator, TestConnectionCommand,
    ValidateDatabaseParametersCommand, ValidateSqlCommand,
};
use quarry_core::auth::AllowAllGate;
use quarry_core::command::{Command, CommandError};
use quarry_core::config::QuarryConfig;
use quarry_core::memstore::MemStore;
use quarry_core::model::Database;
use quarry_engines::{EngineRegistry, SqlaUri};
use quarry_interchange::{
    BundleContents, BundleCredentials, EntityKind, ExportBundleCommand, ImportBundleCommand,
    METADATA_FILE_NAME,
};
use regex::Regex;
use serde_json::Value;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "quarry",
    version,
    about = "Content portability and SQL validation toolkit"
)]
struct Cli {
    /// JSON-backed metadata store read and written by every subcommand.
    #[arg(long, env = "QUARRY_STORE", global = true, default_value = "quarry-store.json")]
    store: PathBuf,

    /// Verbose logging (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a bundle directory into the store.
    ImportBundle {
        /// Directory holding metadata.yaml and the entity documents.
        path: PathBuf,

        /// Replace entities that already exist (matched by UUID).
        #[arg(long)]
        overwrite: bool,

        /// JSON side-channel for secrets, keyed by bundle filename. Either a
        /// flat filename-to-password map or the full credentials object.
        #[arg(long)]
        passwords_file: Option<PathBuf>,
    },

    /// Export entities and their dependencies as a bundle directory.
    Export {
        /// Root entity kind: database, dataset, chart, dashboard, saved-query.
        kind: String,

        /// Local ids of the roots.
        #[arg(required = true)]
        ids: Vec<i64>,

        #[arg(long, default_value = "bundle")]
        output: PathBuf,
    },

    /// Validate connection properties and probe the database.
    TestDb {
        /// JSON properties map: {engine, parameters?, sqlalchemy_uri?, ...}.
        params: String,
    },

    /// Statically validate a SQL statement against a registered database.
    ValidateSql {
        db_id: i64,
        sql: String,

        /// Jinja template bindings, repeatable: --param name=value.
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got \"{raw}\""))
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn exit_code(err: &CommandError) -> i32 {
    match err {
        CommandError::Invalid(_) | CommandError::Validation(_) | CommandError::NotFound { .. } => 1,
        CommandError::Forbidden(_) => 3,
        CommandError::Domain(e) if e.status() < 500 => 1,
        _ => 2,
    }
}

fn report(err: &CommandError) {
    match serde_json::to_string_pretty(&err.to_envelope()) {
        Ok(body) => eprintln!("{body}"),
        Err(_) => eprintln!("Error: {err}"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = match load_store(&cli.store) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(&cli, &store).await {
        report(&err);
        std::process::exit(exit_code(&err));
    }

    if let Err(err) = save_store(&cli.store, &store) {
        eprintln!("Error: {err}");
        std::process::exit(2);
    }
}

async fn run(cli: &Cli, store: &MemStore) -> Result<(), CommandError> {
    let gate = AllowAllGate::default();
    let registry = EngineRegistry::with_defaults();

    match &cli.command {
        Commands::ImportBundle {
            path,
            overwrite,
            passwords_file,
        } => {
            let contents = read_bundle(path).map_err(CommandError::Exception)?;
            let credentials = match passwords_file {
                Some(path) => read_credentials(path).map_err(CommandError::Exception)?,
                None => BundleCredentials::default(),
            };
            let summary = ImportBundleCommand::new(store, &gate, contents)
                .overwrite(*overwrite)
                .credentials(credentials)
                .run()
                .await?;
            println!(
                "imported {} databases, {} datasets, {} charts, {} dashboards, {} saved queries",
                summary.databases,
                summary.datasets,
                summary.charts,
                summary.dashboards,
                summary.saved_queries,
            );
            Ok(())
        }

        Commands::Export { kind, ids, output } => {
            let kind = parse_kind(kind)?;
            let files = ExportBundleCommand::new(store, &gate, &registry, kind, ids.clone())
                .run()
                .await?;
            for (filename, document) in &files {
                let target = output.join(filename);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|err| CommandError::Exception(err.into()))?;
                }
                fs::write(&target, document).map_err(|err| CommandError::Exception(err.into()))?;
                println!("{}", target.display());
            }
            Ok(())
        }

        Commands::TestDb { params } => {
            let properties: Value = serde_json::from_str(params).map_err(|err| {
                CommandError::invalid("Could not parse the properties map", "params", err.to_string())
            })?;
            let config = QuarryConfig::default();
            ValidateDatabaseParametersCommand::new(store, &config, &registry, properties.clone())
                .run()
                .await?;
            let probe = LocalProbe;
            TestConnectionCommand::new(store, &config, &registry, &probe, properties)
                .run()
                .await?;
            println!("connection OK");
            Ok(())
        }

        Commands::ValidateSql { db_id, sql, params } => {
            let mut config = QuarryConfig::default();
            for engine in registry.engines() {
                config
                    .sql_validators_by_engine
                    .insert(engine.to_string(), "parse".to_string());
            }
            let validators: HashMap<String, Arc<dyn SqlValidator>> =
                HashMap::from([("parse".to_string(), Arc::new(ParseValidator) as _)]);
            let template_params: HashMap<String, Value> = params
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            let annotations =
                ValidateSqlCommand::new(store, &config, &registry, &validators, *db_id, sql.as_str())
                    .template_params(template_params)
                    .run()
                    .await?;
            if annotations.is_empty() {
                println!("no issues found");
            } else {
                let body = serde_json::to_string_pretty(&annotations)
                    .map_err(|err| CommandError::Exception(err.into()))?;
                println!("{body}");
            }
            Ok(())
        }
    }
}

fn load_store(path: &Path) -> anyhow::Result<MemStore> {
    if !path.exists() {
        return Ok(MemStore::new());
    }
    let text = fs::read_to_string(path)?;
    let snapshot = serde_json::from_str(&text)?;
    Ok(MemStore::from_snapshot(snapshot))
}

fn save_store(path: &Path, store: &MemStore) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(&store.snapshot())?;
    fs::write(path, body)?;
    Ok(())
}

/// Read every file under `root` into a filename-keyed map, with paths
/// normalized to forward slashes. Archives exported elsewhere often nest
/// everything under one top-level directory; that prefix is stripped so
/// `metadata.yaml` sits at the root of the map.
fn read_bundle(root: &Path) -> anyhow::Result<BundleContents> {
    let mut contents = BundleContents::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = entry
            .path()
            .strip_prefix(root)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        contents.insert(key, fs::read_to_string(entry.path())?);
    }

    if !contents.contains_key(METADATA_FILE_NAME) {
        let nested_prefix = contents.keys().find_map(|key| {
            key.strip_suffix(&format!("/{METADATA_FILE_NAME}"))
                .map(str::to_string)
        });
        if let Some(prefix) = nested_prefix {
            contents = contents
                .into_iter()
                .filter_map(|(key, text)| {
                    key.strip_prefix(&format!("{prefix}/"))
                        .map(|stripped| (stripped.to_string(), text))
                })
                .collect();
        }
    }
    Ok(contents)
}

fn read_credentials(path: &Path) -> anyhow::Result<BundleCredentials> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    // A flat map of strings is shorthand for database passwords.
    if value
        .as_object()
        .map(|map| !map.is_empty() && map.values().all(Value::is_string))
        .unwrap_or(false)
    {
        let passwords = serde_json::from_value(value)?;
        return Ok(BundleCredentials {
            passwords,
            ..Default::default()
        });
    }
    Ok(serde_json::from_value(value)?)
}

fn parse_kind(kind: &str) -> Result<EntityKind, CommandError> {
    match kind {
        "database" => Ok(EntityKind::Database),
        "dataset" => Ok(EntityKind::Dataset),
        "chart" => Ok(EntityKind::Chart),
        "dashboard" => Ok(EntityKind::Dashboard),
        "saved-query" | "saved_query" | "query" => Ok(EntityKind::SavedQuery),
        other => Err(CommandError::invalid(
            "Could not export",
            "kind",
            format!("Unknown entity kind \"{other}\"."),
        )),
    }
}

/// Probe for the drivers this binary actually bundles. File-backed SQLite
/// databases can be checked directly; everything else reports that no driver
/// is available and flows through the engine's error extraction.
struct LocalProbe;

#[async_trait::async_trait]
impl ConnectionProbe for LocalProbe {
    async fn do_ping(&self, uri: &str, _encrypted_extra: Option<&str>) -> anyhow::Result<bool> {
        let parsed = SqlaUri::parse(uri)?;
        match parsed.engine() {
            "sqlite" => Ok(parsed
                .database
                .as_deref()
                .map(|path| Path::new(path).exists())
                .unwrap_or(false)),
            engine => anyhow::bail!("no {engine} driver is bundled with this binary"),
        }
    }
}

static PARSE_LOC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Line: (\d+), Column:? (\d+)").expect("static regex must compile"));

/// Offline validator: parses the statement and reports the first syntax
/// fault with its position.
struct ParseValidator;

#[async_trait::async_trait]
impl SqlValidator for ParseValidator {
    fn name(&self) -> &'static str {
        "ParseValidator"
    }

    async fn validate(
        &self,
        sql: &str,
        _catalog: Option<&str>,
        _schema: Option<&str>,
        _database: &Database,
    ) -> anyhow::Result<Vec<SqlAnnotation>> {
        match SqlParser::parse_sql(&GenericDialect {}, sql) {
            Ok(_) => Ok(Vec::new()),
            Err(err) => {
                let message = err.to_string();
                let caps = PARSE_LOC_RE.captures(&message);
                Ok(vec![SqlAnnotation {
                    line_number: caps.as_ref().and_then(|c| c[1].parse().ok()),
                    start_column: caps.as_ref().and_then(|c| c[2].parse().ok()),
                    end_column: None,
                    message,
                    severity: "error".to_string(),
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_args_split_once() {
        assert_eq!(
            parse_key_value("ds=2024-01-05").unwrap(),
            ("ds".to_string(), "2024-01-05".to_string())
        );
        assert_eq!(
            parse_key_value("expr=a=b").unwrap(),
            ("expr".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("no-equals").is_err());
    }

    #[test]
    fn bundle_reading_strips_a_single_top_level_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dashboard_export");
        fs::create_dir_all(root.join("databases")).unwrap();
        fs::write(root.join(METADATA_FILE_NAME), "version: \"1.0.0\"\n").unwrap();
        fs::write(root.join("databases/db.yaml"), "database_name: x\n").unwrap();

        let contents = read_bundle(dir.path()).unwrap();
        assert!(contents.contains_key(METADATA_FILE_NAME));
        assert!(contents.contains_key("databases/db.yaml"));
    }

    #[test]
    fn flat_password_files_fill_the_password_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwords.json");
        fs::write(&path, r#"{"databases/db.yaml": "hunter2"}"#).unwrap();
        let credentials = read_credentials(&path).unwrap();
        assert_eq!(
            credentials.passwords.get("databases/db.yaml").map(String::as_str),
            Some("hunter2")
        );
        assert!(credentials.ssh_tunnel_passwords.is_empty());
    }

    #[tokio::test]
    async fn parse_validator_positions_syntax_faults() {
        let database = Database::new("local", "sqlite:///t.db");
        let annotations = ParseValidator
            .validate("SELECT * FORM t", None, None, &database)
            .await
            .unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].severity, "error");
        assert!(annotations[0].message.contains("FORM"));
    }
}
