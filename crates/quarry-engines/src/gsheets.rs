//! Google Sheets engine spec
//!
//! Connections carry no password; instead the catalog maps sheet names to
//! spreadsheet URLs and the service account keypair lives in
//! `encrypted_extra`. Expired or missing grants surface as OAuth2 redirects.

use crate::spec::{ConnectionContext, EngineError, EngineSpec, ErrorPattern, ParamField, ParamType, ParametersSchema};
use crate::time_grain::TimeGrain;
use once_cell::sync::Lazy;
use quarry_core::error::{ErrorKind, ErrorLevel, QuarryError};
use serde_json::{json, Map, Value};
use url::Url;

static ERROR_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![ErrorPattern::new(
        r"Unsupported table: (\S+)",
        ErrorKind::TableDoesNotExist,
        "The URL could not be identified: \"{1}\".",
    )]
});

#[derive(Debug, Default)]
pub struct GsheetsSpec;

impl GsheetsSpec {
    fn catalog_of(properties: &Value) -> Option<&Map<String, Value>> {
        properties
            .get("catalog")
            .or_else(|| properties.get("parameters").and_then(|p| p.get("catalog")))
            .and_then(Value::as_object)
    }
}

impl EngineSpec for GsheetsSpec {
    fn engine(&self) -> &'static str {
        "gsheets"
    }

    fn engine_name(&self) -> &'static str {
        "Google Sheets"
    }

    fn default_driver(&self) -> &'static str {
        "apsw"
    }

    fn sqlalchemy_uri_placeholder(&self) -> &'static str {
        "gsheets://"
    }

    fn time_grain_templates(&self) -> Vec<(TimeGrain, &'static str)> {
        vec![
            (TimeGrain::Second, "DATETIME({col})"),
            (TimeGrain::Minute, "DATETIME(YEAR({col}), MONTH({col}), DAY({col}), HOUR({col}), MINUTE({col}), 0)"),
            (TimeGrain::Hour, "DATETIME(YEAR({col}), MONTH({col}), DAY({col}), HOUR({col}), 0, 0)"),
            (TimeGrain::Day, "DATE({col})"),
            (TimeGrain::Week, "DATE(YEAR({col}), MONTH({col}), DAY({col}) - WEEKDAY({col}) + 1)"),
            (TimeGrain::Month, "DATE(YEAR({col}), MONTH({col}), 1)"),
            (TimeGrain::Quarter, "DATE(YEAR({col}), 1 + 3 * (QUARTER({col}) - 1), 1)"),
            (TimeGrain::Year, "DATE(YEAR({col}), 1, 1)"),
        ]
    }

    fn parameters_schema(&self) -> Option<ParametersSchema> {
        Some(ParametersSchema {
            fields: vec![
                ParamField::new(
                    "catalog",
                    ParamType::Object,
                    "Sheet name to spreadsheet URL mapping",
                ),
                ParamField::new(
                    "service_account_info",
                    ParamType::Object,
                    "Contents of the service account keyfile",
                ),
            ],
        })
    }

    /// Each catalog entry needs both a sheet name and a well-formed URL; an
    /// empty catalog gets a single warning pointing at the first row.
    fn validate_parameters(&self, properties: &Value) -> Vec<QuarryError> {
        let mut errors = Vec::new();
        let catalog = Self::catalog_of(properties);
        if catalog.map(Map::is_empty).unwrap_or(true) {
            errors.push(
                QuarryError::new(ErrorKind::ConnectionMissingParameters, "Sheet name is required")
                    .with_level(ErrorLevel::Warning)
                    .with_extra("catalog", json!({"idx": 0, "name": true})),
            );
            return errors;
        }
        for (idx, (name, url)) in catalog.into_iter().flatten().enumerate() {
            if name.trim().is_empty() {
                errors.push(
                    QuarryError::new(ErrorKind::ConnectionMissingParameters, "Sheet name is required")
                        .with_level(ErrorLevel::Warning)
                        .with_extra("catalog", json!({"idx": idx, "name": true})),
                );
                continue;
            }
            let valid_url = url
                .as_str()
                .map(|u| Url::parse(u).is_ok())
                .unwrap_or(false);
            if !valid_url {
                errors.push(
                    QuarryError::new(
                        ErrorKind::ConnectionMissingParameters,
                        "The URL could not be identified",
                    )
                    .with_level(ErrorLevel::Warning)
                    .with_extra("catalog", json!({"idx": idx, "url": true})),
                );
            }
        }
        errors
    }

    fn build_sqlalchemy_uri(
        &self,
        _parameters: &Value,
        _encrypted_extra: Option<&str>,
    ) -> Result<String, EngineError> {
        Ok("gsheets://".to_string())
    }

    fn get_parameters_from_uri(
        &self,
        _uri: &str,
        encrypted_extra: Option<&str>,
    ) -> Result<Value, EngineError> {
        let service_account_info = match encrypted_extra {
            Some(extra) => serde_json::from_str::<Value>(extra)?
                .get("service_account_info")
                .cloned()
                .unwrap_or(Value::Null),
            None => Value::Null,
        };
        Ok(json!({
            "catalog": {},
            "service_account_info": service_account_info,
        }))
    }

    fn error_patterns(&self) -> &[ErrorPattern] {
        &ERROR_PATTERNS
    }

    fn encrypted_extra_sensitive_fields(&self) -> &'static [&'static str] {
        &["service_account_info.private_key"]
    }

    fn supports_oauth2(&self) -> bool {
        true
    }

    fn needs_oauth2(&self, raw_error: &str) -> bool {
        raw_error.contains("access_denied")
            || raw_error.contains("Invalid Credentials")
            || raw_error.contains("invalid_grant")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn well_formed_catalog_passes() {
        let errors = GsheetsSpec.validate_parameters(&json!({
            "catalog": {"test": "https://example.org/"},
        }));
        assert_eq!(errors.len(), 0);
    }

    #[test]
    fn empty_catalog_warns_about_first_row() {
        let errors = GsheetsSpec.validate_parameters(&json!({"catalog": {}}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ErrorKind::ConnectionMissingParameters);
        assert_eq!(errors[0].level, ErrorLevel::Warning);
        assert_eq!(errors[0].extra["catalog"]["idx"], 0);
        assert_eq!(errors[0].extra["catalog"]["name"], true);
    }

    #[test]
    fn malformed_url_is_flagged_with_row_index() {
        let errors = GsheetsSpec.validate_parameters(&json!({
            "catalog": {"first": "https://example.org/", "second": "not a url"},
        }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].extra["catalog"]["idx"], 1);
        assert_eq!(errors[0].extra["catalog"]["url"], true);
    }

    #[test]
    fn private_key_is_a_sensitive_field() {
        assert_eq!(
            GsheetsSpec.encrypted_extra_sensitive_fields(),
            &["service_account_info.private_key"]
        );
    }

    #[test]
    fn stale_credentials_need_oauth2() {
        assert!(GsheetsSpec.needs_oauth2("HttpError 401: Invalid Credentials"));
        assert!(!GsheetsSpec.needs_oauth2("no such table: x"));
    }
}
