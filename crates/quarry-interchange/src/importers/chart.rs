//! Chart importer

use crate::document::ChartDoc;
use crate::importers::{stamp_json, ImportContext};
use quarry_core::command::CommandError;
use quarry_core::model::{Chart, Dataset};
use serde_json::Value;

/// Import one chart document against its resolved dataset. The chart's
/// `params.datasource` is rewritten to point at the locally materialized
/// dataset before the params are stamped back to a JSON string.
pub fn import_chart(
    ctx: &mut ImportContext<'_>,
    mut doc: ChartDoc,
    dataset: &Dataset,
) -> Result<Chart, CommandError> {
    let existing = ctx.session.charts().find_by_uuid(doc.uuid);
    if let Some(existing) = &existing {
        if !ctx.overwrite {
            return Ok(existing.clone());
        }
    } else {
        ctx.check_can_create("Chart")?;
    }

    if let Some(dataset_id) = dataset.id {
        if let Some(Value::Object(params)) = &mut doc.params {
            params.insert(
                "datasource".to_string(),
                Value::String(format!("{dataset_id}__table")),
            );
        }
    }

    let chart = Chart {
        id: existing.as_ref().and_then(|e| e.id),
        uuid: doc.uuid,
        slice_name: doc.slice_name,
        viz_type: doc.viz_type,
        params: stamp_json(&doc.params)?,
        query_context: stamp_json(&doc.query_context)?,
        cache_timeout: doc.cache_timeout,
        datasource_id: dataset.id,
        datasource_type: "table".to_string(),
        owners: ctx.stamp_owner(existing.map(|e| e.owners).unwrap_or_default()),
    };

    ctx.session
        .charts()
        .upsert(chart)
        .map_err(|err| CommandError::Exception(err.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{AllowAllGate, MemStore, MetadataStore};
    use serde_json::json;
    use uuid::Uuid;

    fn doc(uuid: Uuid, dataset_uuid: Uuid) -> ChartDoc {
        ChartDoc {
            slice_name: "Weekly actives".to_string(),
            viz_type: "line".to_string(),
            params: Some(json!({"datasource": "99__table", "metrics": ["count"]})),
            query_context: None,
            cache_timeout: None,
            uuid,
            version: "1.0.0".to_string(),
            dataset_uuid,
        }
    }

    #[test]
    fn datasource_reference_is_rewritten() {
        let store = MemStore::new();
        let mut session = store.begin();
        let dataset = session
            .datasets()
            .upsert(quarry_core::Dataset::new("events"))
            .unwrap();
        let gate = AllowAllGate::default();
        let mut ctx = ImportContext {
            session: session.as_mut(),
            gate: &gate,
            overwrite: false,
            ignore_permissions: false,
        };
        let chart = import_chart(&mut ctx, doc(Uuid::new_v4(), dataset.uuid), &dataset).unwrap();
        let params: serde_json::Value =
            serde_json::from_str(chart.params.as_deref().unwrap()).unwrap();
        assert_eq!(
            params["datasource"],
            json!(format!("{}__table", dataset.id.unwrap()))
        );
        assert_eq!(chart.datasource_id, dataset.id);
    }
}
