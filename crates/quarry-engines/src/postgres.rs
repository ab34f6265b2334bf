//! PostgreSQL engine spec

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
            r#"password authentication failed for user "(.*?)""#,
            ErrorKind::ConnectionInvalidPassword,
            "The password provided for username \"{1}\" is incorrect.",
        ),
        ErrorPattern::new(
            r#"could not translate host name "(.*?)" to address"#,
            ErrorKind::ConnectionInvalidHostname,
            "The hostname \"{1}\" cannot be resolved.",
        ),
        ErrorPattern::new(
            r"Connection refused",
            ErrorKind::ConnectionPortClosed,
            "Port {port} on hostname \"{hostname}\" refused the connection.",
        ),
        ErrorPattern::new(
            r"timeout expired",
            ErrorKind::ConnectionHostDown,
            "The host \"{hostname}\" might be down, and cannot be reached on port {port}.",
        ),
        ErrorPattern::new(
            r#"database "(.*?)" does not exist"#,
            ErrorKind::ConnectionUnknownDatabase,
            "Unable to connect to database \"{1}\".",
        ),
        ErrorPattern::new(
            r#"column "(.*?)" does not exist"#,
            ErrorKind::ColumnDoesNotExist,
            "The column \"{1}\" does not exist.",
        ),
        ErrorPattern::new(
            r#"relation "(.*?)" does not exist"#,
            ErrorKind::TableDoesNotExist,
            "The table \"{1}\" does not exist.",
        ),
        ErrorPattern::new(
            r#"syntax error at or near "(.*?)""#,
            ErrorKind::Syntax,
            "There is a syntax error at or near \"{1}\".",
        ),
    ]
});

#[derive(Debug, Default)]
pub struct PostgresSpec;

impl EngineSpec for PostgresSpec {
    fn engine(&self) -> &'static str {
        "postgresql"
    }

    fn engine_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn default_driver(&self) -> &'static str {
        "psycopg2"
    }

    fn time_grain_templates(&self) -> Vec<(TimeGrain, &'static str)> {
        vec![
            (TimeGrain::Second, "DATE_TRUNC('second', {col})"),
            (TimeGrain::Minute, "DATE_TRUNC('minute', {col})"),
            (TimeGrain::Hour, "DATE_TRUNC('hour', {col})"),
            (TimeGrain::Day, "DATE_TRUNC('day', {col})"),
            (TimeGrain::Week, "DATE_TRUNC('week', {col})"),
            (TimeGrain::Month, "DATE_TRUNC('month', {col})"),
            (TimeGrain::Quarter, "DATE_TRUNC('quarter', {col})"),
            (TimeGrain::Year, "DATE_TRUNC('year', {col})"),
        ]
    }

    fn convert_dttm(&self, target_type: &str, dttm: &NaiveDateTime) -> Option<String> {
        match target_type.to_uppercase().as_str() {
            "DATE" => Some(format!("TO_DATE('{}', 'YYYY-MM-DD')", dttm.format("%Y-%m-%d"))),
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" | "DATETIME" => Some(format!(
                "TO_TIMESTAMP('{}', 'YYYY-MM-DD HH24:MI:SS.US')",
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
        basic::build_uri("postgresql+psycopg2", parameters)
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

    fn max_label_length(&self) -> Option<usize> {
        Some(63)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bad_password_interpolates_captured_username() {
        let context = ConnectionContext {
            hostname: Some("db.local".into()),
            port: Some(5432),
            username: Some("app".into()),
            ..Default::default()
        };
        let errors = PostgresSpec.extract_errors(
            "FATAL: password authentication failed for user \"app\"",
            &context,
        );
        assert_eq!(errors[0].error_type, ErrorKind::ConnectionInvalidPassword);
        assert_eq!(
            errors[0].message,
            "The password provided for username \"app\" is incorrect."
        );
    }

    #[test]
    fn connection_refused_interpolates_context() {
        let context = ConnectionContext {
            hostname: Some("db.local".into()),
            port: Some(5432),
            ..Default::default()
        };
        let errors = PostgresSpec.extract_errors("Connection refused", &context);
        assert_eq!(errors[0].error_type, ErrorKind::ConnectionPortClosed);
        assert_eq!(
            errors[0].message,
            "Port 5432 on hostname \"db.local\" refused the connection."
        );
    }

    #[test]
    fn validates_required_basic_parameters() {
        let errors = PostgresSpec.validate_parameters(&json!({
            "parameters": {"host": "db.local", "port": 5432},
        }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ErrorKind::ConnectionMissingParameters);
        assert_eq!(errors[0].extra["missing"], json!(["username", "database"]));
    }

    #[test]
    fn long_labels_fit_the_63_char_limit() {
        let label = "m".repeat(80);
        let compatible = PostgresSpec.make_label_compatible(&label);
        assert!(compatible.len() <= 63);
    }

    #[test]
    fn long_multibyte_labels_truncate_on_a_char_boundary() {
        let label = "é".repeat(60);
        let compatible = PostgresSpec.make_label_compatible(&label);
        assert!(compatible.len() <= 63);
        assert!(compatible.chars().all(|c| c == 'é' || c == '_' || c.is_ascii_hexdigit()));
    }
}
