//! Declarative document validation
//!
//! Two levels: bundle metadata (with `IncorrectVersion` kept distinguishable
//! so the importer can try the next version adapter) and per-entity document
//! schemas. Validators never bail on the first fault; every message is
//! accumulated per field so the caller surfaces them all at once. Unknown
//! fields pass through untouched.

use crate::document::{BundleMetadata, BUNDLE_VERSION};
use quarry_core::error::FieldMessages;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

const MAX_NAME_LENGTH: usize = 250;

#[derive(Debug, Error)]
pub enum MetadataError {
    /// The bundle declares a version this adapter does not speak. Importers
    /// treat this as "try the next adapter", not as a malformed bundle.
    #[error("Unsupported bundle version: {found}")]
    IncorrectVersion { found: String },

    #[error("Invalid bundle metadata")]
    Invalid(FieldMessages),
}

pub fn parse_document(text: &str) -> Result<Value, String> {
    serde_yaml::from_str(text).map_err(|err| format!("Not valid YAML: {err}"))
}

fn add(messages: &mut FieldMessages, field: &str, message: impl Into<String>) {
    messages.entry(field.to_string()).or_default().push(message.into());
}

fn require_string(value: &Value, field: &str, messages: &mut FieldMessages) -> Option<String> {
    match value.get(field) {
        None | Some(Value::Null) => {
            add(messages, field, "Missing data for required field.");
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            add(messages, field, "Length must be between 1 and 250.");
            None
        }
        Some(Value::String(s)) if s.len() > MAX_NAME_LENGTH => {
            add(messages, field, format!("Longer than maximum length {MAX_NAME_LENGTH}."));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            add(messages, field, "Not a valid string.");
            None
        }
    }
}

fn optional_string(value: &Value, field: &str, messages: &mut FieldMessages) {
    match value.get(field) {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => add(messages, field, "Not a valid string."),
    }
}

fn require_uuid(value: &Value, field: &str, messages: &mut FieldMessages) -> Option<Uuid> {
    let raw = match value.get(field) {
        None | Some(Value::Null) => {
            add(messages, field, "Missing data for required field.");
            return None;
        }
        Some(Value::String(s)) => s,
        Some(_) => {
            add(messages, field, "Not a valid UUID.");
            return None;
        }
    };
    match Uuid::parse_str(raw) {
        Ok(uuid) => Some(uuid),
        Err(_) => {
            add(messages, field, "Not a valid UUID.");
            None
        }
    }
}

fn optional_object(value: &Value, field: &str, messages: &mut FieldMessages) {
    match value.get(field) {
        None | Some(Value::Null) | Some(Value::Object(_)) => {}
        // A JSON-encoded string is accepted when it parses as an object.
        Some(Value::String(s)) => {
            if serde_json::from_str::<serde_json::Map<String, Value>>(s).is_err() {
                add(messages, field, "Not a valid JSON object.");
            }
        }
        Some(_) => add(messages, field, "Not a valid JSON object."),
    }
}

/// Validate `metadata.yaml`. A wrong version is its own error kind.
pub fn validate_metadata(value: &Value) -> Result<BundleMetadata, MetadataError> {
    let mut messages = FieldMessages::new();
    let version = require_string(value, "version", &mut messages);
    let type_ = require_string(value, "type", &mut messages);
    let timestamp = require_string(value, "timestamp", &mut messages);
    if !messages.is_empty() {
        return Err(MetadataError::Invalid(messages));
    }
    let (version, type_, timestamp) = match (version, type_, timestamp) {
        (Some(v), Some(t), Some(ts)) => (v, t, ts),
        _ => return Err(MetadataError::Invalid(messages)),
    };
    if version != BUNDLE_VERSION {
        return Err(MetadataError::IncorrectVersion { found: version });
    }
    Ok(BundleMetadata {
        version,
        type_,
        timestamp,
    })
}

pub fn validate_database(value: &Value) -> FieldMessages {
    let mut messages = FieldMessages::new();
    require_string(value, "database_name", &mut messages);
    require_string(value, "sqlalchemy_uri", &mut messages);
    require_uuid(value, "uuid", &mut messages);
    optional_object(value, "extra", &mut messages);
    if let Some(tunnel) = value.get("ssh_tunnel").filter(|v| !v.is_null()) {
        if tunnel.is_object() {
            require_string(tunnel, "server_address", &mut messages);
            require_string(tunnel, "username", &mut messages);
            if !tunnel.get("server_port").map(Value::is_u64).unwrap_or(false) {
                add(&mut messages, "server_port", "Not a valid port.");
            }
        } else {
            add(&mut messages, "ssh_tunnel", "Not a valid mapping.");
        }
    }
    messages
}

pub fn validate_dataset(value: &Value) -> FieldMessages {
    let mut messages = FieldMessages::new();
    require_string(value, "table_name", &mut messages);
    require_uuid(value, "uuid", &mut messages);
    require_uuid(value, "database_uuid", &mut messages);
    optional_string(value, "schema", &mut messages);
    optional_string(value, "sql", &mut messages);
    optional_object(value, "params", &mut messages);
    optional_object(value, "template_params", &mut messages);

    if let Some(columns) = value.get("columns").filter(|v| !v.is_null()) {
        match columns.as_array() {
            Some(columns) => {
                for (idx, column) in columns.iter().enumerate() {
                    let mut nested = FieldMessages::new();
                    require_string(column, "column_name", &mut nested);
                    for (field, msgs) in nested {
                        messages
                            .entry(format!("columns.{idx}.{field}"))
                            .or_default()
                            .extend(msgs);
                    }
                }
            }
            None => add(&mut messages, "columns", "Not a valid list."),
        }
    }
    if let Some(metrics) = value.get("metrics").filter(|v| !v.is_null()) {
        match metrics.as_array() {
            Some(metrics) => {
                for (idx, metric) in metrics.iter().enumerate() {
                    let mut nested = FieldMessages::new();
                    require_string(metric, "metric_name", &mut nested);
                    require_string(metric, "expression", &mut nested);
                    for (field, msgs) in nested {
                        messages
                            .entry(format!("metrics.{idx}.{field}"))
                            .or_default()
                            .extend(msgs);
                    }
                }
            }
            None => add(&mut messages, "metrics", "Not a valid list."),
        }
    }
    messages
}

pub fn validate_chart(value: &Value) -> FieldMessages {
    let mut messages = FieldMessages::new();
    require_string(value, "slice_name", &mut messages);
    require_string(value, "viz_type", &mut messages);
    require_uuid(value, "uuid", &mut messages);
    require_uuid(value, "dataset_uuid", &mut messages);
    optional_object(value, "params", &mut messages);
    optional_object(value, "query_context", &mut messages);
    messages
}

pub fn validate_dashboard(value: &Value) -> FieldMessages {
    let mut messages = FieldMessages::new();
    require_string(value, "dashboard_title", &mut messages);
    require_uuid(value, "uuid", &mut messages);
    optional_string(value, "slug", &mut messages);
    optional_object(value, "position", &mut messages);
    optional_object(value, "metadata", &mut messages);
    messages
}

pub fn validate_saved_query(value: &Value) -> FieldMessages {
    let mut messages = FieldMessages::new();
    require_string(value, "label", &mut messages);
    require_string(value, "sql", &mut messages);
    require_uuid(value, "uuid", &mut messages);
    require_uuid(value, "database_uuid", &mut messages);
    optional_string(value, "schema", &mut messages);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn current_metadata_passes() {
        let metadata = validate_metadata(&json!({
            "version": "1.0.0",
            "type": "Database",
            "timestamp": "2024-01-05T00:00:00+00:00",
        }))
        .unwrap();
        assert_eq!(metadata.type_, "Database");
    }

    #[test]
    fn wrong_version_is_its_own_kind() {
        let err = validate_metadata(&json!({
            "version": "2.0.0",
            "type": "Database",
            "timestamp": "2024-01-05T00:00:00+00:00",
        }))
        .unwrap_err();
        assert!(matches!(err, MetadataError::IncorrectVersion { found } if found == "2.0.0"));
    }

    #[test]
    fn missing_metadata_fields_accumulate() {
        let err = validate_metadata(&json!({"version": "1.0.0"})).unwrap_err();
        let MetadataError::Invalid(messages) = err else {
            panic!("expected Invalid");
        };
        assert_eq!(messages.len(), 2);
        assert_eq!(messages["type"], vec!["Missing data for required field."]);
        assert_eq!(messages["timestamp"], vec!["Missing data for required field."]);
    }

    #[test]
    fn dataset_nested_faults_are_path_keyed() {
        let messages = validate_dataset(&json!({
            "table_name": "events",
            "uuid": "not-a-uuid",
            "database_uuid": "6b4b5a84-72b6-4e94-b527-d6a6cb0c5457",
            "columns": [{"column_name": "ok"}, {"type": "TEXT"}],
            "metrics": [{"metric_name": "count"}],
        }));
        assert_eq!(messages["uuid"], vec!["Not a valid UUID."]);
        assert_eq!(
            messages["columns.1.column_name"],
            vec!["Missing data for required field."]
        );
        assert_eq!(
            messages["metrics.0.expression"],
            vec!["Missing data for required field."]
        );
    }

    #[test]
    fn unknown_fields_do_not_fail_validation() {
        let messages = validate_chart(&json!({
            "slice_name": "Weekly actives",
            "viz_type": "line",
            "uuid": "6b4b5a84-72b6-4e94-b527-d6a6cb0c5457",
            "dataset_uuid": "7b4b5a84-72b6-4e94-b527-d6a6cb0c5457",
            "something_new": {"nested": true},
        }));
        assert!(messages.is_empty());
    }

    #[test]
    fn json_string_fields_must_parse_as_objects() {
        let messages = validate_dashboard(&json!({
            "dashboard_title": "KPIs",
            "uuid": "6b4b5a84-72b6-4e94-b527-d6a6cb0c5457",
            "metadata": "{not json",
        }));
        assert_eq!(messages["metadata"], vec!["Not a valid JSON object."]);
    }
}
