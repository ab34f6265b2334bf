//! Bundle layout and document shapes
//!
//! A bundle is a flat `filename → YAML text` mapping. Filenames carry stable
//! prefixes per entity kind, and `metadata.yaml` describes the bundle as a
//! whole. The document structs here are the exact YAML shapes; their field
//! declaration order is the export order, which is part of the format's
//! diff-stability guarantee.

use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const METADATA_FILE_NAME: &str = "metadata.yaml";
pub const BUNDLE_VERSION: &str = "1.0.0";

/// Filename-keyed bundle contents, in insertion order.
pub type BundleContents = IndexMap<String, String>;

/// Entity kind encoded in a bundle filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Database,
    Dataset,
    Chart,
    Dashboard,
    SavedQuery,
}

impl EntityKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let prefix = filename.split('/').next()?;
        match prefix {
            "databases" => Some(EntityKind::Database),
            "datasets" => Some(EntityKind::Dataset),
            "charts" => Some(EntityKind::Chart),
            "dashboards" => Some(EntityKind::Dashboard),
            "queries" => Some(EntityKind::SavedQuery),
            _ => None,
        }
    }

    /// The `type` value carried in bundle metadata.
    pub fn metadata_type(self) -> &'static str {
        match self {
            EntityKind::Database => "Database",
            EntityKind::Dataset => "SqlaTable",
            EntityKind::Chart => "Slice",
            EntityKind::Dashboard => "Dashboard",
            EntityKind::SavedQuery => "SavedQuery",
        }
    }
}

/// Filename-safe slug: lowercase alphanumerics with `_` separators.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// `metadata.yaml` contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub version: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub timestamp: String,
}

impl BundleMetadata {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            version: BUNDLE_VERSION.to_string(),
            type_: kind.metadata_type().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshTunnelDoc {
    pub server_address: String,
    pub server_port: u16,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_password: Option<String>,
}

/// `databases/<slug>.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseDoc {
    pub database_name: String,
    pub sqlalchemy_uri: String,
    /// Side-channel or masked; never exported with a real value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub cache_timeout: Option<i64>,
    #[serde(default)]
    pub expose_in_sqllab: bool,
    #[serde(default)]
    pub allow_run_async: bool,
    #[serde(default)]
    pub allow_ctas: bool,
    #[serde(default)]
    pub allow_cvas: bool,
    #[serde(default)]
    pub allow_dml: bool,
    #[serde(default)]
    pub allow_file_upload: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_extra: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_tunnel: Option<SshTunnelDoc>,
    pub uuid: Uuid,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnDoc {
    pub column_name: String,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub is_dttm: bool,
    pub is_active: bool,
    pub groupby: bool,
    pub filterable: bool,
    pub expression: Option<String>,
    pub python_date_format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricDoc {
    pub metric_name: String,
    pub expression: String,
    pub metric_type: Option<String>,
    pub d3format: Option<String>,
    pub extra: Option<Value>,
}

/// `datasets/<db_slug>/<table>.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDoc {
    pub table_name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_params: Option<Value>,
    #[serde(default)]
    pub columns: Vec<ColumnDoc>,
    #[serde(default)]
    pub metrics: Vec<MetricDoc>,
    pub uuid: Uuid,
    pub version: String,
    pub database_uuid: Uuid,
    /// Dialect the virtual SQL was authored against; drives transpilation
    /// when the target database runs a different engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_db_engine: Option<String>,
}

/// `charts/<slug>_<id>.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartDoc {
    pub slice_name: String,
    pub viz_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_context: Option<Value>,
    #[serde(default)]
    pub cache_timeout: Option<i64>,
    pub uuid: Uuid,
    pub version: String,
    pub dataset_uuid: Uuid,
}

/// `dashboards/<slug>.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardDoc {
    pub dashboard_title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub uuid: Uuid,
    pub version: String,
}

/// `queries/<db_slug>/<schema>/<label>.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedQueryDoc {
    pub label: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub sql: String,
    pub uuid: Uuid,
    pub version: String,
    pub database_uuid: Uuid,
}
