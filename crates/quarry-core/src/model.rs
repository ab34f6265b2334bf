//! Logical analytics entities
//!
//! These are the in-memory shapes the portability core works with. The host
//! application persists them through the DAO seams in [`crate::dao`]; this
//! crate never prescribes their storage schema.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A principal associated with entities as a non-exclusive owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_admin: false,
        }
    }

    pub fn admin(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_admin: true,
        }
    }
}

/// Optional pre-connection hop used to reach databases inside private
/// networks. Exactly one of password or private key authenticates the hop;
/// the exclusivity is enforced at validation time, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SshTunnel {
    pub id: Option<i64>,
    pub database_id: Option<i64>,
    pub server_address: String,
    pub server_port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub private_key_password: Option<String>,
}

/// A registered database connection.
///
/// The connection URI is the authoritative persisted representation; engine
/// specs convert between the URI and a parameters dict where the engine
/// supports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub database_name: String,
    pub sqlalchemy_uri: String,
    /// JSON-encoded extras (engine params, metadata cache config, ...).
    pub extra: Option<String>,
    /// JSON-encoded secrets, encrypted at rest per engine-spec field list.
    pub encrypted_extra: Option<String>,
    pub allow_dml: bool,
    pub allow_ctas: bool,
    pub allow_cvas: bool,
    pub allow_run_async: bool,
    pub allow_file_upload: bool,
    pub ssh_tunnel: Option<SshTunnel>,
    pub owners: Vec<i64>,
}

impl Database {
    pub fn new(database_name: impl Into<String>, sqlalchemy_uri: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            database_name: database_name.into(),
            sqlalchemy_uri: sqlalchemy_uri.into(),
            extra: None,
            encrypted_extra: None,
            allow_dml: false,
            allow_ctas: false,
            allow_cvas: false,
            allow_run_async: false,
            allow_file_upload: false,
            ssh_tunnel: None,
            owners: Vec::new(),
        }
    }

    /// Engine tag parsed from the URI scheme (`postgresql+psycopg2` → `postgresql`).
    pub fn engine(&self) -> Option<&str> {
        let scheme = self.sqlalchemy_uri.split("://").next()?;
        Some(scheme.split('+').next().unwrap_or(scheme))
    }

    /// Driver tag parsed from the URI scheme, when present.
    pub fn driver(&self) -> Option<&str> {
        let scheme = self.sqlalchemy_uri.split("://").next()?;
        scheme.split_once('+').map(|(_, driver)| driver)
    }
}

/// Dataset source mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Backed by a physical table in the parent database.
    Physical,
    /// Backed by user-authored SQL.
    Virtual,
}

/// A column owned by a dataset. `column_name` is unique within the dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
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

/// A named metric owned by a dataset. `metric_name` is unique within the
/// dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_name: String,
    pub expression: String,
    pub metric_type: Option<String>,
    pub d3format: Option<String>,
    pub extra: Option<String>,
}

/// A dataset: a physical table or a virtual SQL statement exposed to charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub table_name: String,
    pub schema: Option<String>,
    pub database_id: Option<i64>,
    /// Present only for virtual datasets.
    pub sql: Option<String>,
    pub columns: Vec<Column>,
    pub metrics: Vec<Metric>,
    /// JSON-encoded params.
    pub params: Option<String>,
    /// JSON-encoded template params for SQL templating.
    pub template_params: Option<String>,
    pub owners: Vec<i64>,
}

impl Dataset {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            table_name: table_name.into(),
            schema: None,
            database_id: None,
            sql: None,
            columns: Vec::new(),
            metrics: Vec::new(),
            params: None,
            template_params: None,
            owners: Vec::new(),
        }
    }

    pub fn kind(&self) -> DatasetKind {
        match self.sql {
            Some(_) => DatasetKind::Virtual,
            None => DatasetKind::Physical,
        }
    }
}

/// A chart (slice) referencing one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub slice_name: String,
    pub viz_type: String,
    /// JSON-encoded params; includes the `datasource` reference.
    pub params: Option<String>,
    /// JSON-encoded query context.
    pub query_context: Option<String>,
    pub cache_timeout: Option<i64>,
    pub datasource_id: Option<i64>,
    pub datasource_type: String,
    pub owners: Vec<i64>,
}

impl Chart {
    pub fn new(slice_name: impl Into<String>, viz_type: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            slice_name: slice_name.into(),
            viz_type: viz_type.into(),
            params: None,
            query_context: None,
            cache_timeout: None,
            datasource_id: None,
            datasource_type: "table".to_string(),
            owners: Vec::new(),
        }
    }
}

/// A dashboard: a layout tree over charts, related to them many-to-many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub dashboard_title: String,
    pub slug: Option<String>,
    /// JSON-encoded layout tree rooted at `ROOT_ID`.
    pub position_json: Option<String>,
    /// JSON-encoded metadata (filter scopes, color schemes, ...).
    pub json_metadata: Option<String>,
    pub published: bool,
    /// Local ids of charts placed on this dashboard (the join relation).
    pub slices: Vec<i64>,
    pub owners: Vec<i64>,
}

impl Dashboard {
    pub fn new(dashboard_title: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            dashboard_title: dashboard_title.into(),
            slug: None,
            position_json: None,
            json_metadata: None,
            published: false,
            slices: Vec::new(),
            owners: Vec::new(),
        }
    }
}

/// A saved SQL Lab query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedQuery {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub label: String,
    pub schema: Option<String>,
    pub sql: String,
    pub db_id: Option<i64>,
}

impl SavedQuery {
    pub fn new(label: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            label: label.into(),
            schema: None,
            sql: sql.into(),
            db_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_and_driver_from_uri() {
        let db = Database::new("analytics", "postgresql+psycopg2://u:p@h:5432/db");
        assert_eq!(db.engine(), Some("postgresql"));
        assert_eq!(db.driver(), Some("psycopg2"));

        let db = Database::new("local", "sqlite:///tmp/t.db");
        assert_eq!(db.engine(), Some("sqlite"));
        assert_eq!(db.driver(), None);
    }

    #[test]
    fn dataset_kind_follows_sql_presence() {
        let mut ds = Dataset::new("events");
        assert_eq!(ds.kind(), DatasetKind::Physical);
        ds.sql = Some("SELECT 1".to_string());
        assert_eq!(ds.kind(), DatasetKind::Virtual);
    }
}
