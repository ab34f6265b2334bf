//! DAO seams and the transactional session
//!
//! The relational object model is external; the core consumes it through
//! these narrow interfaces. A [`MetadataSession`] scopes all entity access in
//! one transaction: either every write inside the session commits, or none
//! are visible.

use crate::model::{Chart, Dashboard, Database, Dataset, SavedQuery};
use thiserror::Error;
use uuid::Uuid;

/// Persistence-layer error surface.
#[derive(Debug, Error)]
pub enum DaoError {
    #[error("{kind} with id {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Internal(String),
}

pub type DaoResult<T> = Result<T, DaoError>;

pub trait DatabaseDao {
    fn find_by_uuid(&self, uuid: Uuid) -> Option<Database>;
    fn find_by_id(&self, id: i64) -> Option<Database>;
    fn find_by_name(&self, name: &str) -> Option<Database>;
    /// Insert when `id` is unset, update the matching row otherwise. Returns
    /// the persisted entity with its local id stamped.
    fn upsert(&mut self, database: Database) -> DaoResult<Database>;
    fn all(&self) -> Vec<Database>;
}

pub trait DatasetDao {
    /// All rows matching a UUID. Historical data may hold more than one row
    /// per UUID (schema-NULL twins); callers decide how to disambiguate.
    fn find_all_by_uuid(&self, uuid: Uuid) -> Vec<Dataset>;
    fn find_by_id(&self, id: i64) -> Option<Dataset>;
    fn upsert(&mut self, dataset: Dataset) -> DaoResult<Dataset>;
    fn all(&self) -> Vec<Dataset>;
}

pub trait ChartDao {
    fn find_by_uuid(&self, uuid: Uuid) -> Option<Chart>;
    fn find_by_id(&self, id: i64) -> Option<Chart>;
    fn upsert(&mut self, chart: Chart) -> DaoResult<Chart>;
    fn all(&self) -> Vec<Chart>;
    /// Sever join rows referencing these charts, then delete the set.
    fn delete_many(&mut self, ids: &[i64]) -> DaoResult<()>;
}

pub trait DashboardDao {
    fn find_by_uuid(&self, uuid: Uuid) -> Option<Dashboard>;
    fn find_by_id(&self, id: i64) -> Option<Dashboard>;
    fn upsert(&mut self, dashboard: Dashboard) -> DaoResult<Dashboard>;
    fn all(&self) -> Vec<Dashboard>;
    /// Materialize one dashboard↔chart join row. Returns `false` when the
    /// pair already exists, keeping repeated imports idempotent.
    fn link_chart(&mut self, dashboard_id: i64, chart_id: i64) -> DaoResult<bool>;
    /// Sever chart links first to break referential cycles, then delete.
    fn delete_many(&mut self, ids: &[i64]) -> DaoResult<()>;
}

pub trait SavedQueryDao {
    fn find_by_uuid(&self, uuid: Uuid) -> Option<SavedQuery>;
    fn upsert(&mut self, query: SavedQuery) -> DaoResult<SavedQuery>;
    fn all(&self) -> Vec<SavedQuery>;
}

/// Request-scoped transactional access to every DAO.
pub trait MetadataSession {
    fn databases(&mut self) -> &mut dyn DatabaseDao;
    fn datasets(&mut self) -> &mut dyn DatasetDao;
    fn charts(&mut self) -> &mut dyn ChartDao;
    fn dashboards(&mut self) -> &mut dyn DashboardDao;
    fn saved_queries(&mut self) -> &mut dyn SavedQueryDao;

    /// Publish every write made in this session atomically.
    fn commit(self: Box<Self>) -> DaoResult<()>;

    /// Discard every write made in this session.
    fn rollback(self: Box<Self>);
}

/// Handle to the persistence layer; opens transactional sessions.
pub trait MetadataStore: Send + Sync {
    fn begin(&self) -> Box<dyn MetadataSession + '_>;
}
