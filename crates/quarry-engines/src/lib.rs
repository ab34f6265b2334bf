//! Per-backend engine specs: dialect quirks, URI handling, parameter
//! schemas, raw-error translation, and the registry that serves them.

pub mod basic;
pub mod gsheets;
pub mod mysql;
pub mod postgres;
pub mod presto;
pub mod registry;
pub mod spec;
pub mod sqlite;
pub mod time_grain;
pub mod uri;

pub use gsheets::GsheetsSpec;
pub use mysql::MysqlSpec;
pub use postgres::PostgresSpec;
pub use presto::PrestoSpec;
pub use registry::{EngineRegistry, GenericSpec};
pub use spec::{
    ConnectionContext, EngineError, EngineSpec, ErrorPattern, ParamField, ParamType,
    ParametersSchema,
};
pub use sqlite::SqliteSpec;
pub use time_grain::TimeGrain;
pub use uri::{SqlaUri, UriError};
