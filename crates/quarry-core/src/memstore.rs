//! In-memory metadata store
//!
//! Reference implementation of the DAO seams. Sessions snapshot the shared
//! state on begin and swap it back on commit, which gives the same
//! all-or-nothing visibility the host's relational transaction provides.
//! Used by the test suite and the CLI demo paths.

use crate::dao::{
    ChartDao, DaoError, DaoResult, DashboardDao, DatabaseDao, DatasetDao, MetadataSession,
    MetadataStore, SavedQueryDao,
};
use crate::model::{Chart, Dashboard, Database, Dataset, SavedQuery};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct StoreState {
    databases: Vec<Database>,
    datasets: Vec<Dataset>,
    charts: Vec<Chart>,
    dashboards: Vec<Dashboard>,
    saved_queries: Vec<SavedQuery>,
    next_id: i64,
}

impl StoreState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Serializable image of a [`MemStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub databases: Vec<Database>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub charts: Vec<Chart>,
    #[serde(default)]
    pub dashboards: Vec<Dashboard>,
    #[serde(default)]
    pub saved_queries: Vec<SavedQuery>,
    #[serde(default)]
    pub next_id: i64,
}

/// Shared in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializable image of the current contents. Lets callers persist the
    /// reference store between process runs.
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.lock();
        StoreSnapshot {
            databases: state.databases.clone(),
            datasets: state.datasets.clone(),
            charts: state.charts.clone(),
            dashboards: state.dashboards.clone(),
            saved_queries: state.saved_queries.clone(),
            next_id: state.next_id,
        }
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                databases: snapshot.databases,
                datasets: snapshot.datasets,
                charts: snapshot.charts,
                dashboards: snapshot.dashboards,
                saved_queries: snapshot.saved_queries,
                next_id: snapshot.next_id,
            })),
        }
    }

    /// Row counts per entity kind, for assertions on idempotency.
    pub fn counts(&self) -> (usize, usize, usize, usize, usize) {
        let state = self.state.lock();
        (
            state.databases.len(),
            state.datasets.len(),
            state.charts.len(),
            state.dashboards.len(),
            state.saved_queries.len(),
        )
    }
}

impl MetadataStore for MemStore {
    fn begin(&self) -> Box<dyn MetadataSession + '_> {
        let working = self.state.lock().clone();
        Box::new(MemSession {
            store: self,
            working,
        })
    }
}

/// One transaction over a [`MemStore`].
pub struct MemSession<'a> {
    store: &'a MemStore,
    working: StoreState,
}

impl MetadataSession for MemSession<'_> {
    fn databases(&mut self) -> &mut dyn DatabaseDao {
        self
    }

    fn datasets(&mut self) -> &mut dyn DatasetDao {
        self
    }

    fn charts(&mut self) -> &mut dyn ChartDao {
        self
    }

    fn dashboards(&mut self) -> &mut dyn DashboardDao {
        self
    }

    fn saved_queries(&mut self) -> &mut dyn SavedQueryDao {
        self
    }

    fn commit(self: Box<Self>) -> DaoResult<()> {
        *self.store.state.lock() = self.working;
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        tracing::debug!("rolling back in-memory session");
    }
}

impl DatabaseDao for MemSession<'_> {
    fn find_by_uuid(&self, uuid: Uuid) -> Option<Database> {
        self.working.databases.iter().find(|d| d.uuid == uuid).cloned()
    }

    fn find_by_id(&self, id: i64) -> Option<Database> {
        self.working.databases.iter().find(|d| d.id == Some(id)).cloned()
    }

    fn find_by_name(&self, name: &str) -> Option<Database> {
        self.working
            .databases
            .iter()
            .find(|d| d.database_name == name)
            .cloned()
    }

    fn upsert(&mut self, mut database: Database) -> DaoResult<Database> {
        match database.id {
            Some(id) => {
                let slot = self
                    .working
                    .databases
                    .iter_mut()
                    .find(|d| d.id == Some(id))
                    .ok_or(DaoError::NotFound {
                        kind: "Database",
                        id,
                    })?;
                *slot = database.clone();
            }
            None => {
                database.id = Some(self.working.allocate_id());
                if let Some(tunnel) = database.ssh_tunnel.as_mut() {
                    tunnel.database_id = database.id;
                }
                self.working.databases.push(database.clone());
            }
        }
        Ok(database)
    }

    fn all(&self) -> Vec<Database> {
        self.working.databases.clone()
    }
}

impl DatasetDao for MemSession<'_> {
    fn find_all_by_uuid(&self, uuid: Uuid) -> Vec<Dataset> {
        self.working
            .datasets
            .iter()
            .filter(|d| d.uuid == uuid)
            .cloned()
            .collect()
    }

    fn find_by_id(&self, id: i64) -> Option<Dataset> {
        self.working.datasets.iter().find(|d| d.id == Some(id)).cloned()
    }

    fn upsert(&mut self, mut dataset: Dataset) -> DaoResult<Dataset> {
        match dataset.id {
            Some(id) => {
                let slot = self
                    .working
                    .datasets
                    .iter_mut()
                    .find(|d| d.id == Some(id))
                    .ok_or(DaoError::NotFound {
                        kind: "Dataset",
                        id,
                    })?;
                *slot = dataset.clone();
            }
            None => {
                dataset.id = Some(self.working.allocate_id());
                self.working.datasets.push(dataset.clone());
            }
        }
        Ok(dataset)
    }

    fn all(&self) -> Vec<Dataset> {
        self.working.datasets.clone()
    }
}

impl ChartDao for MemSession<'_> {
    fn find_by_uuid(&self, uuid: Uuid) -> Option<Chart> {
        self.working.charts.iter().find(|c| c.uuid == uuid).cloned()
    }

    fn find_by_id(&self, id: i64) -> Option<Chart> {
        self.working.charts.iter().find(|c| c.id == Some(id)).cloned()
    }

    fn upsert(&mut self, mut chart: Chart) -> DaoResult<Chart> {
        match chart.id {
            Some(id) => {
                let slot = self
                    .working
                    .charts
                    .iter_mut()
                    .find(|c| c.id == Some(id))
                    .ok_or(DaoError::NotFound { kind: "Chart", id })?;
                *slot = chart.clone();
            }
            None => {
                chart.id = Some(self.working.allocate_id());
                self.working.charts.push(chart.clone());
            }
        }
        Ok(chart)
    }

    fn all(&self) -> Vec<Chart> {
        self.working.charts.clone()
    }

    fn delete_many(&mut self, ids: &[i64]) -> DaoResult<()> {
        for dashboard in self.working.dashboards.iter_mut() {
            dashboard.slices.retain(|id| !ids.contains(id));
        }
        self.working
            .charts
            .retain(|c| c.id.map(|id| !ids.contains(&id)).unwrap_or(true));
        Ok(())
    }
}

impl DashboardDao for MemSession<'_> {
    fn find_by_uuid(&self, uuid: Uuid) -> Option<Dashboard> {
        self.working.dashboards.iter().find(|d| d.uuid == uuid).cloned()
    }

    fn find_by_id(&self, id: i64) -> Option<Dashboard> {
        self.working
            .dashboards
            .iter()
            .find(|d| d.id == Some(id))
            .cloned()
    }

    fn upsert(&mut self, mut dashboard: Dashboard) -> DaoResult<Dashboard> {
        match dashboard.id {
            Some(id) => {
                let slot = self
                    .working
                    .dashboards
                    .iter_mut()
                    .find(|d| d.id == Some(id))
                    .ok_or(DaoError::NotFound {
                        kind: "Dashboard",
                        id,
                    })?;
                // Join rows are managed through link_chart, keep them.
                dashboard.slices = slot.slices.clone();
                *slot = dashboard.clone();
            }
            None => {
                dashboard.id = Some(self.working.allocate_id());
                self.working.dashboards.push(dashboard.clone());
            }
        }
        Ok(dashboard)
    }

    fn all(&self) -> Vec<Dashboard> {
        self.working.dashboards.clone()
    }

    fn link_chart(&mut self, dashboard_id: i64, chart_id: i64) -> DaoResult<bool> {
        let dashboard = self
            .working
            .dashboards
            .iter_mut()
            .find(|d| d.id == Some(dashboard_id))
            .ok_or(DaoError::NotFound {
                kind: "Dashboard",
                id: dashboard_id,
            })?;
        if dashboard.slices.contains(&chart_id) {
            return Ok(false);
        }
        dashboard.slices.push(chart_id);
        Ok(true)
    }

    fn delete_many(&mut self, ids: &[i64]) -> DaoResult<()> {
        // Sever the join relation before deleting the set.
        for dashboard in self.working.dashboards.iter_mut() {
            if dashboard.id.map(|id| ids.contains(&id)).unwrap_or(false) {
                dashboard.slices.clear();
            }
        }
        self.working
            .dashboards
            .retain(|d| d.id.map(|id| !ids.contains(&id)).unwrap_or(true));
        Ok(())
    }
}

impl SavedQueryDao for MemSession<'_> {
    fn find_by_uuid(&self, uuid: Uuid) -> Option<SavedQuery> {
        self.working
            .saved_queries
            .iter()
            .find(|q| q.uuid == uuid)
            .cloned()
    }

    fn upsert(&mut self, mut query: SavedQuery) -> DaoResult<SavedQuery> {
        match query.id {
            Some(id) => {
                let slot = self
                    .working
                    .saved_queries
                    .iter_mut()
                    .find(|q| q.id == Some(id))
                    .ok_or(DaoError::NotFound {
                        kind: "SavedQuery",
                        id,
                    })?;
                *slot = query.clone();
            }
            None => {
                query.id = Some(self.working.allocate_id());
                self.working.saved_queries.push(query.clone());
            }
        }
        Ok(query)
    }

    fn all(&self) -> Vec<SavedQuery> {
        self.working.saved_queries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Database;

    #[test]
    fn commit_publishes_writes() {
        let store = MemStore::new();
        let mut session = store.begin();
        session
            .databases()
            .upsert(Database::new("a", "sqlite://"))
            .unwrap();
        session.commit().unwrap();
        assert_eq!(store.counts().0, 1);
    }

    #[test]
    fn rollback_discards_writes() {
        let store = MemStore::new();
        let mut session = store.begin();
        session
            .databases()
            .upsert(Database::new("a", "sqlite://"))
            .unwrap();
        session.rollback();
        assert_eq!(store.counts().0, 0);
    }

    #[test]
    fn link_chart_is_idempotent() {
        let store = MemStore::new();
        let mut session = store.begin();
        let dash = session
            .dashboards()
            .upsert(Dashboard::new("board"))
            .unwrap();
        let chart = session.charts().upsert(Chart::new("c", "table")).unwrap();
        let dash_id = dash.id.unwrap();
        let chart_id = chart.id.unwrap();
        assert!(session.dashboards().link_chart(dash_id, chart_id).unwrap());
        assert!(!session.dashboards().link_chart(dash_id, chart_id).unwrap());
        session.commit().unwrap();
        let mut check = store.begin();
        assert_eq!(check.dashboards().find_by_id(dash_id).unwrap().slices, vec![chart_id]);
    }

    #[test]
    fn delete_many_severs_join_rows_first() {
        let store = MemStore::new();
        let mut session = store.begin();
        let dash = session.dashboards().upsert(Dashboard::new("board")).unwrap();
        let chart = session.charts().upsert(Chart::new("c", "table")).unwrap();
        session
            .dashboards()
            .link_chart(dash.id.unwrap(), chart.id.unwrap())
            .unwrap();
        session.charts().delete_many(&[chart.id.unwrap()]).unwrap();
        let remaining = session.dashboards().find_by_id(dash.id.unwrap()).unwrap();
        assert!(remaining.slices.is_empty());
        assert!(session.charts().all().is_empty());
        session.commit().unwrap();
    }
}
