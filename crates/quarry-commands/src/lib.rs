//! Validation and lifecycle commands
//!
//! Commands over registered databases that do not belong to the interchange
//! layer: connection parameter validation and probing, static SQL
//! validation, and bulk deletion.

pub mod delete;
pub mod validate_connection;
pub mod validate_sql;

pub use delete::{BulkDeleteChartsCommand, BulkDeleteDashboardsCommand};
pub use validate_connection::{
    ConnectionProbe, TestConnectionCommand, ValidateDatabaseParametersCommand,
};
pub use validate_sql::{
    PrestoSqlValidator, QueryRunner, SqlAnnotation, SqlValidator, ValidateSqlCommand,
};
