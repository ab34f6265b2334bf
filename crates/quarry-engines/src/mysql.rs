//! MySQL engine spec

use crate::basic;
use crate::spec::{ConnectionContext, EngineError, EngineSpec, ErrorPattern, ParametersSchema};
use crate::time_grain::TimeGrain;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use quarry_core::error::ErrorKind;
use serde_json::Value;

static ERROR_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        ErrorPattern::new(
            r"Access denied for user '(.*?)'",
            ErrorKind::ConnectionAccessDenied,
            "Either the username \"{1}\" or the password is incorrect.",
        ),
        ErrorPattern::new(
            r"Unknown MySQL server host '(.*?)'",
            ErrorKind::ConnectionInvalidHostname,
            "Unknown MySQL server host \"{1}\".",
        ),
        ErrorPattern::new(
            r"Can't connect to MySQL server on '(.*?)'",
            ErrorKind::ConnectionHostDown,
            "The host \"{1}\" might be down, and cannot be reached.",
        ),
        ErrorPattern::new(
            r"Unknown database '(.*?)'",
            ErrorKind::ConnectionUnknownDatabase,
            "Unable to connect to database \"{1}\".",
        ),
        ErrorPattern::new(
            r"Unknown column '(.*?)' in",
            ErrorKind::ColumnDoesNotExist,
            "The column \"{1}\" does not exist.",
        ),
        ErrorPattern::new(
            r"Table '(.*?)' doesn't exist",
            ErrorKind::TableDoesNotExist,
            "The table \"{1}\" does not exist.",
        ),
        ErrorPattern::new(
            r"check the manual that corresponds to your MySQL server version for the right syntax",
            ErrorKind::Syntax,
            "There is a syntax error in the query.",
        ),
    ]
});

#[derive(Debug, Default)]
pub struct MysqlSpec;

impl EngineSpec for MysqlSpec {
    fn engine(&self) -> &'static str {
        "mysql"
    }

    fn engine_name(&self) -> &'static str {
        "MySQL"
    }

    fn default_driver(&self) -> &'static str {
        "mysqldb"
    }

    fn time_grain_templates(&self) -> Vec<(TimeGrain, &'static str)> {
        vec![
            (TimeGrain::Second, "DATE_ADD(DATE({col}), INTERVAL (HOUR({col})*60*60 + MINUTE({col})*60 + SECOND({col})) SECOND)"),
            (TimeGrain::Minute, "DATE_ADD(DATE({col}), INTERVAL (HOUR({col})*60 + MINUTE({col})) MINUTE)"),
            (TimeGrain::Hour, "DATE_ADD(DATE({col}), INTERVAL HOUR({col}) HOUR)"),
            (TimeGrain::Day, "DATE({col})"),
            (TimeGrain::Week, "DATE(DATE_SUB({col}, INTERVAL DAYOFWEEK({col}) - 1 DAY))"),
            (TimeGrain::Month, "DATE(DATE_SUB({col}, INTERVAL DAYOFMONTH({col}) - 1 DAY))"),
            (TimeGrain::Quarter, "MAKEDATE(YEAR({col}), 1) + INTERVAL QUARTER({col}) QUARTER - INTERVAL 1 QUARTER"),
            (TimeGrain::Year, "DATE(DATE_SUB({col}, INTERVAL DAYOFYEAR({col}) - 1 DAY))"),
        ]
    }

    fn convert_dttm(&self, target_type: &str, dttm: &NaiveDateTime) -> Option<String> {
        match target_type.to_uppercase().as_str() {
            "DATE" => Some(format!("STR_TO_DATE('{}', '%Y-%m-%d')", dttm.format("%Y-%m-%d"))),
            "DATETIME" | "TIMESTAMP" => Some(format!(
                "STR_TO_DATE('{}', '%Y-%m-%d %H:%i:%s.%f')",
                dttm.format("%Y-%m-%d %H:%M:%S%.6f")
            )),
            _ => None,
        }
    }

    fn parameters_schema(&self) -> Option<ParametersSchema> {
        Some(basic::basic_parameters_schema())
    }

    fn build_sqlalchemy_uri(
        &self,
        parameters: &Value,
        _encrypted_extra: Option<&str>,
    ) -> Result<String, EngineError> {
        basic::build_uri("mysql+mysqldb", parameters)
    }

    fn get_parameters_from_uri(
        &self,
        uri: &str,
        _encrypted_extra: Option<&str>,
    ) -> Result<Value, EngineError> {
        basic::parameters_from_uri(uri)
    }

    fn error_patterns(&self) -> &[ErrorPattern] {
        &ERROR_PATTERNS
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{ident}`")
    }

    fn max_label_length(&self) -> Option<usize> {
        Some(64)
    }
}
