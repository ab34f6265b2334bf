//! Bulk deletion commands
//!
//! Set-deletes run in one transaction: every id must exist and pass the
//! ownership check before anything is removed, so a partial failure never
//! leaves half the set deleted.

use async_trait::async_trait;
use quarry_core::auth::{raise_for_ownership, AuthorizationGate};
use quarry_core::command::{Command, CommandError};
use quarry_core::dao::{MetadataSession, MetadataStore};

/// Delete a set of dashboards, severing their chart links first.
pub struct BulkDeleteDashboardsCommand<'a> {
    store: &'a dyn MetadataStore,
    gate: &'a dyn AuthorizationGate,
    ids: Vec<i64>,
}

impl<'a> BulkDeleteDashboardsCommand<'a> {
    pub fn new(store: &'a dyn MetadataStore, gate: &'a dyn AuthorizationGate, ids: Vec<i64>) -> Self {
        Self { store, gate, ids }
    }

    fn check(&self, session: &mut dyn MetadataSession) -> Result<(), CommandError> {
        for id in &self.ids {
            let dashboard = session.dashboards().find_by_id(*id).ok_or(CommandError::NotFound {
                kind: "Dashboard",
                name: id.to_string(),
            })?;
            raise_for_ownership(self.gate, &dashboard.owners).map_err(CommandError::Forbidden)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Command for BulkDeleteDashboardsCommand<'_> {
    type Output = ();

    fn validate(&mut self) -> Result<(), CommandError> {
        let mut session = self.store.begin();
        let result = self.check(session.as_mut());
        session.rollback();
        result
    }

    async fn run(&mut self) -> Result<(), CommandError> {
        let mut session = self.store.begin();
        if let Err(err) = self.check(session.as_mut()) {
            session.rollback();
            return Err(err);
        }
        if let Err(err) = session.dashboards().delete_many(&self.ids) {
            session.rollback();
            return Err(CommandError::Exception(err.into()));
        }
        session.commit().map_err(|err| CommandError::Exception(err.into()))?;
        tracing::info!(deleted = self.ids.len(), "dashboards deleted");
        Ok(())
    }
}

/// Delete a set of charts, severing their dashboard links first.
pub struct BulkDeleteChartsCommand<'a> {
    store: &'a dyn MetadataStore,
    gate: &'a dyn AuthorizationGate,
    ids: Vec<i64>,
}

impl<'a> BulkDeleteChartsCommand<'a> {
    pub fn new(store: &'a dyn MetadataStore, gate: &'a dyn AuthorizationGate, ids: Vec<i64>) -> Self {
        Self { store, gate, ids }
    }

    fn check(&self, session: &mut dyn MetadataSession) -> Result<(), CommandError> {
        for id in &self.ids {
            let chart = session.charts().find_by_id(*id).ok_or(CommandError::NotFound {
                kind: "Chart",
                name: id.to_string(),
            })?;
            raise_for_ownership(self.gate, &chart.owners).map_err(CommandError::Forbidden)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Command for BulkDeleteChartsCommand<'_> {
    type Output = ();

    fn validate(&mut self) -> Result<(), CommandError> {
        let mut session = self.store.begin();
        let result = self.check(session.as_mut());
        session.rollback();
        result
    }

    async fn run(&mut self) -> Result<(), CommandError> {
        let mut session = self.store.begin();
        if let Err(err) = self.check(session.as_mut()) {
            session.rollback();
            return Err(err);
        }
        if let Err(err) = session.charts().delete_many(&self.ids) {
            session.rollback();
            return Err(CommandError::Exception(err.into()));
        }
        session.commit().map_err(|err| CommandError::Exception(err.into()))?;
        tracing::info!(deleted = self.ids.len(), "charts deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::auth::AllowAllGate;
    use quarry_core::memstore::MemStore;
    use quarry_core::model::{Chart, Dashboard, User};

    struct MemberGate {
        user: User,
    }

    impl AuthorizationGate for MemberGate {
        fn can_access(&self, _verb: &str, _object_kind: &str) -> bool {
            true
        }

        fn current_user(&self) -> Option<User> {
            Some(self.user.clone())
        }
    }

    fn seeded_dashboards(owners: Vec<i64>) -> (MemStore, i64, i64) {
        let store = MemStore::new();
        let mut session = store.begin();
        let chart = session
            .charts()
            .upsert(Chart::new("c", "table"))
            .unwrap();
        let chart_id = chart.id.unwrap();
        let mut dashboard = Dashboard::new("d");
        dashboard.owners = owners;
        let dashboard = session.dashboards().upsert(dashboard).unwrap();
        let dashboard_id = dashboard.id.unwrap();
        session.dashboards().link_chart(dashboard_id, chart_id).unwrap();
        session.commit().unwrap();
        (store, dashboard_id, chart_id)
    }

    #[tokio::test]
    async fn deletes_dashboards_and_their_links() {
        let (store, dashboard_id, chart_id) = seeded_dashboards(Vec::new());
        let gate = AllowAllGate::default();
        BulkDeleteDashboardsCommand::new(&store, &gate, vec![dashboard_id])
            .run()
            .await
            .unwrap();

        let mut session = store.begin();
        assert!(session.dashboards().find_by_id(dashboard_id).is_none());
        // The chart itself survives; only the join rows go.
        assert!(session.charts().find_by_id(chart_id).is_some());
        session.rollback();
    }

    #[tokio::test]
    async fn missing_ids_abort_the_whole_set() {
        let (store, dashboard_id, _) = seeded_dashboards(Vec::new());
        let gate = AllowAllGate::default();
        let err = BulkDeleteDashboardsCommand::new(&store, &gate, vec![dashboard_id, 999])
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotFound { kind: "Dashboard", .. }));

        let mut session = store.begin();
        assert!(session.dashboards().find_by_id(dashboard_id).is_some());
        session.rollback();
    }

    #[tokio::test]
    async fn non_owners_cannot_delete() {
        let (store, dashboard_id, _) = seeded_dashboards(vec![1]);
        let gate = MemberGate {
            user: User::new(7, "intruder"),
        };
        let err = BulkDeleteDashboardsCommand::new(&store, &gate, vec![dashboard_id])
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Forbidden(_)));
    }

    #[tokio::test]
    async fn owners_can_delete_their_charts() {
        let store = MemStore::new();
        let mut session = store.begin();
        let mut chart = Chart::new("mine", "table");
        chart.owners = vec![7];
        let chart = session.charts().upsert(chart).unwrap();
        let chart_id = chart.id.unwrap();
        session.commit().unwrap();

        let gate = MemberGate {
            user: User::new(7, "owner"),
        };
        BulkDeleteChartsCommand::new(&store, &gate, vec![chart_id])
            .run()
            .await
            .unwrap();

        let mut session = store.begin();
        assert!(session.charts().find_by_id(chart_id).is_none());
        session.rollback();
    }
}
