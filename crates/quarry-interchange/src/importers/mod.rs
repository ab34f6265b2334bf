//! Per-entity importers
//!
//! Each importer follows the same shape: look up by UUID, short-circuit or
//! stamp the local id depending on `overwrite`, check create permission
//! unless `ignore_permissions`, JSON-stamp nested fields, and persist through
//! the session. Parent-id resolution and cross-document rewiring belong to
//! the bundle importer, which calls these in dependency order.

mod chart;
mod dashboard;
mod database;
mod dataset;
mod saved_query;

pub use chart::import_chart;
pub use dashboard::{import_dashboard, DashboardImport};
pub use database::import_database;
pub use dataset::import_dataset;
pub use saved_query::import_saved_query;

use quarry_core::auth::AuthorizationGate;
use quarry_core::command::CommandError;
use quarry_core::dao::MetadataSession;
use quarry_core::error::{ErrorKind, QuarryError};
use serde_json::Value;

/// Shared importer state for one bundle import.
pub struct ImportContext<'a> {
    pub session: &'a mut dyn MetadataSession,
    pub gate: &'a dyn AuthorizationGate,
    pub overwrite: bool,
    /// Seed-content path: skip every create-permission check.
    pub ignore_permissions: bool,
}

impl ImportContext<'_> {
    /// Create-capability check for a new entity of the given kind.
    pub(crate) fn check_can_create(&self, object_kind: &'static str) -> Result<(), CommandError> {
        if self.ignore_permissions || self.gate.can_access("can_write", object_kind) {
            return Ok(());
        }
        let kind = match object_kind {
            "Database" => ErrorKind::DatabaseSecurityAccess,
            _ => ErrorKind::DatasourceSecurityAccess,
        };
        Err(CommandError::Forbidden(QuarryError::new(
            kind,
            format!("You do not have permission to create a {object_kind}"),
        )))
    }

    /// Owner list for an imported entity: existing owners, plus the current
    /// user when one is in scope.
    pub(crate) fn stamp_owner(&self, mut owners: Vec<i64>) -> Vec<i64> {
        if let Some(user) = self.gate.current_user() {
            if !owners.contains(&user.id) {
                owners.push(user.id);
            }
        }
        owners
    }
}

/// JSON-stamp a nested document field into the string form the persistence
/// layer expects.
pub(crate) fn stamp_json(value: &Option<Value>) -> Result<Option<String>, CommandError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        // Already stringified upstream; keep as-is.
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(value) => serde_json::to_string(value)
            .map(Some)
            .map_err(|err| CommandError::Exception(err.into())),
    }
}
