//! Error taxonomy shared by every Quarry subsystem
//!
//! Errors surfaced to external callers follow a uniform envelope:
//! `{message, error_type, level, extra}`. The `error_type` values form a
//! closed enumeration with stable wire names, and each kind maps to one or
//! more numeric issue codes that point users at documented remediation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Severity attached to a surfaced error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Info,
    Warning,
    Error,
}

/// Closed enumeration of error kinds with stable wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    // Generic faults
    #[serde(rename = "GENERIC_BACKEND_ERROR")]
    GenericBackend,
    #[serde(rename = "GENERIC_COMMAND_ERROR")]
    GenericCommand,
    #[serde(rename = "GENERIC_DB_ENGINE_ERROR")]
    GenericDbEngine,

    // Connection faults
    #[serde(rename = "CONNECTION_INVALID_USERNAME_ERROR")]
    ConnectionInvalidUsername,
    #[serde(rename = "CONNECTION_INVALID_PASSWORD_ERROR")]
    ConnectionInvalidPassword,
    #[serde(rename = "CONNECTION_INVALID_HOSTNAME_ERROR")]
    ConnectionInvalidHostname,
    #[serde(rename = "CONNECTION_PORT_CLOSED_ERROR")]
    ConnectionPortClosed,
    #[serde(rename = "CONNECTION_INVALID_PORT_ERROR")]
    ConnectionInvalidPort,
    #[serde(rename = "CONNECTION_HOST_DOWN_ERROR")]
    ConnectionHostDown,
    #[serde(rename = "CONNECTION_ACCESS_DENIED_ERROR")]
    ConnectionAccessDenied,
    #[serde(rename = "CONNECTION_UNKNOWN_DATABASE_ERROR")]
    ConnectionUnknownDatabase,
    #[serde(rename = "CONNECTION_DATABASE_PERMISSIONS_ERROR")]
    ConnectionDatabasePermissions,
    #[serde(rename = "CONNECTION_MISSING_PARAMETERS_ERROR")]
    ConnectionMissingParameters,
    #[serde(rename = "CONNECTION_DATABASE_TIMEOUT")]
    ConnectionDatabaseTimeout,

    // Query faults
    #[serde(rename = "SYNTAX_ERROR")]
    Syntax,
    #[serde(rename = "COLUMN_DOES_NOT_EXIST_ERROR")]
    ColumnDoesNotExist,
    #[serde(rename = "TABLE_DOES_NOT_EXIST_ERROR")]
    TableDoesNotExist,
    #[serde(rename = "SCHEMA_DOES_NOT_EXIST_ERROR")]
    SchemaDoesNotExist,
    #[serde(rename = "OBJECT_DOES_NOT_EXIST_ERROR")]
    ObjectDoesNotExist,
    #[serde(rename = "DML_NOT_ALLOWED_ERROR")]
    DmlNotAllowed,
    #[serde(rename = "ADHOC_SUBQUERY_NOT_ALLOWED_ERROR")]
    AdhocSubqueryNotAllowed,
    #[serde(rename = "DISALLOWED_SQL_FUNCTION_ERROR")]
    DisallowedSqlFunction,

    // Payload faults
    #[serde(rename = "INVALID_PAYLOAD_FORMAT_ERROR")]
    InvalidPayloadFormat,
    #[serde(rename = "INVALID_PAYLOAD_SCHEMA_ERROR")]
    InvalidPayloadSchema,

    // Security faults
    #[serde(rename = "DATASOURCE_SECURITY_ACCESS_ERROR")]
    DatasourceSecurityAccess,
    #[serde(rename = "DATABASE_SECURITY_ACCESS_ERROR")]
    DatabaseSecurityAccess,
    #[serde(rename = "TABLE_SECURITY_ACCESS_ERROR")]
    TableSecurityAccess,
    #[serde(rename = "QUERY_SECURITY_ACCESS_ERROR")]
    QuerySecurityAccess,
    #[serde(rename = "MISSING_OWNERSHIP_ERROR")]
    MissingOwnership,

    // Workflow faults
    #[serde(rename = "OAUTH2_REDIRECT")]
    Oauth2Redirect,
    #[serde(rename = "RESULTS_BACKEND_NOT_CONFIGURED_ERROR")]
    ResultsBackendNotConfigured,
    #[serde(rename = "ASYNC_WORKERS_ERROR")]
    AsyncWorkers,
    #[serde(rename = "BACKEND_TIMEOUT_ERROR")]
    BackendTimeout,
    #[serde(rename = "REPORT_NOTIFICATION_ERROR")]
    ReportNotification,
}

impl ErrorKind {
    /// Stable issue codes attached to every error of this kind.
    pub fn issue_codes(self) -> &'static [u32] {
        use ErrorKind::*;
        match self {
            GenericBackend => &[1000],
            GenericCommand => &[1000],
            GenericDbEngine => &[1002],
            ConnectionInvalidUsername => &[1007, 1014],
            ConnectionInvalidPassword => &[1008, 1014],
            ConnectionInvalidHostname => &[1009],
            ConnectionPortClosed => &[1010],
            ConnectionInvalidPort => &[1012],
            ConnectionHostDown => &[1011],
            ConnectionAccessDenied => &[1014, 1015],
            ConnectionUnknownDatabase => &[1016],
            ConnectionDatabasePermissions => &[1015],
            ConnectionMissingParameters => &[1013],
            ConnectionDatabaseTimeout => &[1001, 1017],
            Syntax => &[1003],
            ColumnDoesNotExist => &[1004],
            TableDoesNotExist => &[1005],
            SchemaDoesNotExist => &[1006],
            ObjectDoesNotExist => &[1005, 1006],
            DmlNotAllowed => &[1027],
            AdhocSubqueryNotAllowed => &[1028],
            DisallowedSqlFunction => &[1029],
            InvalidPayloadFormat => &[1020],
            InvalidPayloadSchema => &[1021],
            DatasourceSecurityAccess => &[1022],
            DatabaseSecurityAccess => &[1023],
            TableSecurityAccess => &[1024],
            QuerySecurityAccess => &[1025],
            MissingOwnership => &[1026],
            Oauth2Redirect => &[1030],
            ResultsBackendNotConfigured => &[1018],
            AsyncWorkers => &[1019],
            BackendTimeout => &[1001, 1017],
            ReportNotification => &[1031],
        }
    }

    /// Default severity for this kind.
    pub fn default_level(self) -> ErrorLevel {
        use ErrorKind::*;
        match self {
            Oauth2Redirect => ErrorLevel::Warning,
            _ => ErrorLevel::Error,
        }
    }

    /// HTTP-style status used when this kind heads an envelope.
    pub fn status(self) -> u16 {
        use ErrorKind::*;
        match self {
            DatasourceSecurityAccess | DatabaseSecurityAccess | TableSecurityAccess
            | QuerySecurityAccess | MissingOwnership | ConnectionAccessDenied => 403,
            ObjectDoesNotExist => 404,
            Oauth2Redirect => 302,
            Syntax
            | ColumnDoesNotExist
            | TableDoesNotExist
            | SchemaDoesNotExist
            | DmlNotAllowed
            | AdhocSubqueryNotAllowed
            | DisallowedSqlFunction
            | InvalidPayloadFormat
            | InvalidPayloadSchema
            | ConnectionInvalidUsername
            | ConnectionInvalidPassword
            | ConnectionInvalidHostname
            | ConnectionPortClosed
            | ConnectionInvalidPort
            | ConnectionHostDown
            | ConnectionUnknownDatabase
            | ConnectionDatabasePermissions
            | ConnectionMissingParameters => 400,
            ConnectionDatabaseTimeout | BackendTimeout => 504,
            GenericBackend | GenericCommand | GenericDbEngine | ResultsBackendNotConfigured
            | AsyncWorkers | ReportNotification => 500,
        }
    }

    /// The wire name of this kind (`GENERIC_BACKEND_ERROR` etc.).
    pub fn wire_name(self) -> String {
        match serde_json::to_value(self) {
            Ok(Value::String(s)) => s,
            _ => String::from("GENERIC_BACKEND_ERROR"),
        }
    }
}

/// One-line remediation text per issue code, mirroring the public docs.
pub fn issue_code_message(code: u32) -> &'static str {
    match code {
        1000 => "An unexpected backend error occurred.",
        1001 => "The database is currently unreachable.",
        1002 => "The database returned an unexpected error.",
        1003 => "There is a syntax error in the submitted query.",
        1004 => "The column referenced by the query does not exist.",
        1005 => "The table referenced by the query does not exist.",
        1006 => "The schema referenced by the query does not exist.",
        1007 => "The username provided when connecting is invalid.",
        1008 => "The password provided when connecting is invalid.",
        1009 => "The hostname provided cannot be resolved.",
        1010 => "The port is closed or not reachable.",
        1011 => "The host may be down and cannot be reached.",
        1012 => "The port provided is invalid.",
        1013 => "Required connection parameters are missing.",
        1014 => "Either the username or the password is incorrect.",
        1015 => "The user lacks permission to access the database.",
        1016 => "The database being referenced does not exist.",
        1017 => "The operation exceeded the configured timeout.",
        1018 => "The results backend is not configured.",
        1019 => "Asynchronous query workers are unavailable.",
        1020 => "The submitted payload has an invalid format.",
        1021 => "The submitted payload does not match the expected schema.",
        1022 => "Access to the requested datasource was denied.",
        1023 => "Access to the requested database was denied.",
        1024 => "Access to the requested table was denied.",
        1025 => "Access to the requested query was denied.",
        1026 => "The user is not an owner of the object being modified.",
        1027 => "DML statements are not allowed on this database.",
        1028 => "Ad-hoc subqueries are not allowed on this database.",
        1029 => "The query uses a SQL function that is disallowed here.",
        1030 => "OAuth2 authorization is required to access the database.",
        1031 => "A report notification could not be delivered.",
        _ => "Unknown issue code.",
    }
}

/// A single error in the uniform envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarryError {
    pub message: String,
    pub error_type: ErrorKind,
    pub level: ErrorLevel,
    pub extra: Map<String, Value>,
}

impl QuarryError {
    /// Create an error with the kind's default severity. `extra.issue_codes`
    /// is populated from the static issue-code map during construction.
    pub fn new(error_type: ErrorKind, message: impl Into<String>) -> Self {
        let mut extra = Map::new();
        let codes: Vec<Value> = error_type
            .issue_codes()
            .iter()
            .map(|&code| json!({ "code": code, "message": issue_code_message(code) }))
            .collect();
        extra.insert("issue_codes".to_string(), Value::Array(codes));
        Self {
            message: message.into(),
            error_type,
            level: error_type.default_level(),
            extra,
        }
    }

    pub fn with_level(mut self, level: ErrorLevel) -> Self {
        self.level = level;
        self
    }

    /// Attach an additional key to `extra`. `issue_codes` is reserved.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// HTTP-style status derived from kind and level. Warning-level errors
    /// are client-correctable even when the kind itself maps higher.
    pub fn status(&self) -> u16 {
        match self.level {
            ErrorLevel::Warning if self.error_type != ErrorKind::Oauth2Redirect => 400,
            _ => self.error_type.status(),
        }
    }
}

impl std::fmt::Display for QuarryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type.wire_name(), self.message)
    }
}

impl std::error::Error for QuarryError {}

/// Wire envelope: `{"errors": [...]}` plus a derived status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub errors: Vec<QuarryError>,
}

impl ErrorEnvelope {
    pub fn new(errors: Vec<QuarryError>) -> Self {
        Self { errors }
    }

    pub fn single(error: QuarryError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// The envelope status is the highest status among member errors,
    /// except that a lone OAuth2 redirect keeps its 302.
    pub fn status(&self) -> u16 {
        self.errors.iter().map(QuarryError::status).max().unwrap_or(500)
    }
}

/// Build an OAuth2 redirect envelope carrying the interactive flow context.
pub fn oauth2_redirect_error(url: &str, tab_id: &str, redirect_uri: &str) -> QuarryError {
    QuarryError::new(
        ErrorKind::Oauth2Redirect,
        "Authorization is required to connect to the database.",
    )
    .with_extra("url", json!(url))
    .with_extra("tab_id", json!(tab_id))
    .with_extra("redirect_uri", json!(redirect_uri))
}

/// Composite validation report keyed by field path, used by `validate()`
/// implementations that accumulate every recoverable fault before raising.
pub type FieldMessages = IndexMap<String, Vec<String>>;
