//! Dashboard importer
//!
//! Besides the usual UUID upsert, dashboards need their layout tree and
//! metadata rewired: both encode chart ids that were local to the exporting
//! instance and must be remapped to the ids materialized here.

use crate::document::DashboardDoc;
use crate::importers::{stamp_json, ImportContext};
use quarry_core::command::CommandError;
use quarry_core::model::Dashboard;
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// An imported dashboard plus the local chart ids its layout references,
/// which the bundle importer turns into join rows.
pub struct DashboardImport {
    pub dashboard: Dashboard,
    pub chart_ids: Vec<i64>,
}

/// Walk the layout tree, rewrite every CHART component's `chartId` through
/// the UUID map, and return `old id → new id` for the metadata pass.
fn rewrite_position(
    position: &mut Value,
    chart_ids_by_uuid: &HashMap<Uuid, i64>,
) -> (HashMap<i64, i64>, Vec<i64>) {
    let mut id_map = HashMap::new();
    let mut chart_ids = Vec::new();
    let Some(components) = position.as_object_mut() else {
        return (id_map, chart_ids);
    };
    for component in components.values_mut() {
        if component.get("type").and_then(Value::as_str) != Some("CHART") {
            continue;
        }
        let Some(meta) = component.get_mut("meta").and_then(Value::as_object_mut) else {
            continue;
        };
        let uuid = meta
            .get("uuid")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        let Some(new_id) = uuid.and_then(|u| chart_ids_by_uuid.get(&u).copied()) else {
            continue;
        };
        if let Some(old_id) = meta.get("chartId").and_then(Value::as_i64) {
            id_map.insert(old_id, new_id);
        }
        meta.insert("chartId".to_string(), Value::from(new_id));
        if !chart_ids.contains(&new_id) {
            chart_ids.push(new_id);
        }
    }
    (id_map, chart_ids)
}

fn map_id(id_map: &HashMap<i64, i64>, id: i64) -> i64 {
    id_map.get(&id).copied().unwrap_or(id)
}

fn rekey_by_id(object: &Map<String, Value>, id_map: &HashMap<i64, i64>) -> Map<String, Value> {
    object
        .iter()
        .map(|(key, value)| match key.parse::<i64>() {
            Ok(old_id) => (map_id(id_map, old_id).to_string(), value.clone()),
            Err(_) => (key.clone(), value.clone()),
        })
        .collect()
}

/// Rewrite the metadata fields that encode chart ids as keys or values.
fn rewrite_metadata(metadata: &mut Value, id_map: &HashMap<i64, i64>) {
    let Some(metadata) = metadata.as_object_mut() else {
        return;
    };

    if let Some(Value::Array(ids)) = metadata.get_mut("timed_refresh_immune_slices") {
        for id in ids.iter_mut() {
            if let Some(old_id) = id.as_i64() {
                *id = Value::from(map_id(id_map, old_id));
            }
        }
    }

    if let Some(Value::Object(expanded)) = metadata.get_mut("expanded_slices") {
        *expanded = rekey_by_id(expanded, id_map);
    }

    if let Some(Value::Object(scopes)) = metadata.get_mut("filter_scopes") {
        let mut rekeyed = rekey_by_id(scopes, id_map);
        for scope in rekeyed.values_mut() {
            let Some(fields) = scope.as_object_mut() else {
                continue;
            };
            for field_scope in fields.values_mut() {
                if let Some(Value::Array(immune)) =
                    field_scope.as_object_mut().and_then(|f| f.get_mut("immune"))
                {
                    for id in immune.iter_mut() {
                        if let Some(old_id) = id.as_i64() {
                            *id = Value::from(map_id(id_map, old_id));
                        }
                    }
                }
            }
        }
        *scopes = rekeyed;
    }

    // default_filters is a JSON object serialized into a string, keyed by
    // chart id. Unparseable content is left alone.
    if let Some(Value::String(raw)) = metadata.get_mut("default_filters") {
        if let Ok(Value::Object(filters)) = serde_json::from_str::<Value>(raw) {
            let rekeyed = rekey_by_id(&filters, id_map);
            if let Ok(stamped) = serde_json::to_string(&Value::Object(rekeyed)) {
                *raw = stamped;
            }
        }
    }
}

pub fn import_dashboard(
    ctx: &mut ImportContext<'_>,
    mut doc: DashboardDoc,
    chart_ids_by_uuid: &HashMap<Uuid, i64>,
) -> Result<DashboardImport, CommandError> {
    let existing = ctx.session.dashboards().find_by_uuid(doc.uuid);
    if let Some(existing) = &existing {
        if !ctx.overwrite {
            return Ok(DashboardImport {
                dashboard: existing.clone(),
                chart_ids: Vec::new(),
            });
        }
    } else {
        ctx.check_can_create("Dashboard")?;
    }

    let mut chart_ids = Vec::new();
    let mut id_map = HashMap::new();
    if let Some(position) = &mut doc.position {
        (id_map, chart_ids) = rewrite_position(position, chart_ids_by_uuid);
    }
    if let Some(metadata) = &mut doc.metadata {
        rewrite_metadata(metadata, &id_map);
    }

    let dashboard = Dashboard {
        id: existing.as_ref().and_then(|e| e.id),
        uuid: doc.uuid,
        dashboard_title: doc.dashboard_title,
        slug: doc.slug,
        position_json: stamp_json(&doc.position)?,
        json_metadata: stamp_json(&doc.metadata)?,
        published: doc.published,
        slices: Vec::new(),
        owners: ctx.stamp_owner(existing.map(|e| e.owners).unwrap_or_default()),
    };

    let dashboard = ctx
        .session
        .dashboards()
        .upsert(dashboard)
        .map_err(|err| CommandError::Exception(err.into()))?;

    Ok(DashboardImport {
        dashboard,
        chart_ids,
    })
}
