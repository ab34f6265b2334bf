//! SQLite engine spec

use crate::spec::{ConnectionContext, EngineSpec, ErrorPattern};
use crate::time_grain::TimeGrain;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use quarry_core::error::ErrorKind;

static ERROR_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        ErrorPattern::new(
            r"no such table: (\S+)",
            ErrorKind::TableDoesNotExist,
            "The table \"{1}\" does not exist.",
        ),
        ErrorPattern::new(
            r"no such column: (\S+)",
            ErrorKind::ColumnDoesNotExist,
            "The column \"{1}\" does not exist.",
        ),
        ErrorPattern::new(
            r"syntax error",
            ErrorKind::Syntax,
            "There is a syntax error in the query.",
        ),
    ]
});

#[derive(Debug, Default)]
pub struct SqliteSpec;

impl EngineSpec for SqliteSpec {
    fn engine(&self) -> &'static str {
        "sqlite"
    }

    fn engine_name(&self) -> &'static str {
        "SQLite"
    }

    fn default_driver(&self) -> &'static str {
        "pysqlite"
    }

    fn sqlalchemy_uri_placeholder(&self) -> &'static str {
        "sqlite:///path/to/file.db"
    }

    fn time_grain_templates(&self) -> Vec<(TimeGrain, &'static str)> {
        vec![
            (TimeGrain::Second, "DATETIME(STRFTIME('%Y-%m-%dT%H:%M:%S', {col}))"),
            (TimeGrain::Minute, "DATETIME(STRFTIME('%Y-%m-%dT%H:%M:00', {col}))"),
            (TimeGrain::Hour, "DATETIME(STRFTIME('%Y-%m-%dT%H:00:00', {col}))"),
            (TimeGrain::Day, "DATETIME({col}, 'start of day')"),
            (
                TimeGrain::Week,
                "DATETIME({col}, 'start of day', '-6 days', 'weekday 1')",
            ),
            (TimeGrain::Month, "DATETIME({col}, 'start of month')"),
            (
                TimeGrain::Quarter,
                "DATETIME({col}, 'start of month', PRINTF('-%d month', (STRFTIME('%m', {col}) - 1) % 3))",
            ),
            (TimeGrain::Year, "DATETIME({col}, 'start of year')"),
        ]
    }

    fn convert_dttm(&self, target_type: &str, dttm: &NaiveDateTime) -> Option<String> {
        match target_type.to_uppercase().as_str() {
            "TEXT" | "DATETIME" | "TIMESTAMP" => {
                Some(format!("'{}'", dttm.format("%Y-%m-%d %H:%M:%S")))
            }
            "DATE" => Some(format!("'{}'", dttm.format("%Y-%m-%d"))),
            _ => None,
        }
    }

    fn error_patterns(&self) -> &[ErrorPattern] {
        &ERROR_PATTERNS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::error::ErrorLevel;

    #[test]
    fn missing_table_is_translated() {
        let errors = SqliteSpec.extract_errors(
            "no such table: flights",
            &ConnectionContext::default(),
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ErrorKind::TableDoesNotExist);
        assert_eq!(errors[0].message, "The table \"flights\" does not exist.");
        assert_eq!(errors[0].level, ErrorLevel::Error);
    }

    #[test]
    fn datetime_literal_is_quoted() {
        let dttm = NaiveDateTime::parse_from_str("2024-01-05 10:20:30", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            SqliteSpec.convert_dttm("TEXT", &dttm).as_deref(),
            Some("'2024-01-05 10:20:30'")
        );
        assert_eq!(SqliteSpec.convert_dttm("BLOB", &dttm), None);
    }

    #[test]
    fn day_grain_uses_start_of_day() {
        assert_eq!(
            SqliteSpec.get_time_grain_expr(TimeGrain::Day, "ts").as_deref(),
            Some("DATETIME(ts, 'start of day')")
        );
    }
}
