//! Dataset importer

use crate::document::{ColumnDoc, DatasetDoc, MetricDoc};
use crate::importers::{stamp_json, ImportContext};
use quarry_core::command::CommandError;
use quarry_core::model::{Column, Database, Dataset, Metric};

fn column_from_doc(doc: &ColumnDoc) -> Column {
    Column {
        column_name: doc.column_name.clone(),
        type_: doc.type_.clone(),
        is_dttm: doc.is_dttm,
        is_active: doc.is_active,
        groupby: doc.groupby,
        filterable: doc.filterable,
        expression: doc.expression.clone(),
        python_date_format: doc.python_date_format.clone(),
    }
}

fn metric_from_doc(doc: &MetricDoc) -> Result<Metric, CommandError> {
    Ok(Metric {
        metric_name: doc.metric_name.clone(),
        expression: doc.expression.clone(),
        metric_type: doc.metric_type.clone(),
        d3format: doc.d3format.clone(),
        extra: stamp_json(&doc.extra)?,
    })
}

/// Import one dataset document under its resolved parent database.
///
/// Virtual SQL authored against a different dialect (recorded in
/// `source_db_engine`) is transpiled to the parent's engine before persisting.
pub fn import_dataset(
    ctx: &mut ImportContext<'_>,
    mut doc: DatasetDoc,
    database: &Database,
) -> Result<Dataset, CommandError> {
    // "main" is the embedded-SQLite default schema; normalizing it to null
    // keeps a later explicit-schema import from creating a duplicate row.
    if doc.schema.as_deref() == Some("main") {
        doc.schema = None;
    }

    let matches = ctx.session.datasets().find_all_by_uuid(doc.uuid);
    if matches.len() > 1 {
        // Historical data can hold schema-NULL twins under one UUID; keep the
        // first row untouched rather than guessing which to update.
        tracing::warn!(
            uuid = %doc.uuid,
            count = matches.len(),
            "multiple datasets share a UUID, keeping the existing row"
        );
        return Ok(matches.into_iter().next().ok_or_else(|| {
            CommandError::Exception(anyhow::anyhow!("dataset rows disappeared mid-import"))
        })?);
    }
    let existing = matches.into_iter().next();
    if let Some(existing) = &existing {
        if !ctx.overwrite {
            return Ok(existing.clone());
        }
    } else {
        ctx.check_can_create("Dataset")?;
    }

    let mut sql = doc.sql.clone();
    if let (Some(statement), Some(source)) = (&sql, &doc.source_db_engine) {
        if let Some(target) = database.engine() {
            if source != target {
                sql = Some(quarry_transpile::transpile(statement, source, target));
            }
        }
    }

    let columns = doc.columns.iter().map(column_from_doc).collect();
    let metrics = doc
        .metrics
        .iter()
        .map(metric_from_doc)
        .collect::<Result<Vec<_>, _>>()?;

    let dataset = Dataset {
        id: existing.as_ref().and_then(|e| e.id),
        uuid: doc.uuid,
        table_name: doc.table_name,
        schema: doc.schema,
        database_id: database.id,
        sql,
        // Columns and metrics are sync lists: on overwrite the imported
        // collections fully replace the stored ones.
        columns,
        metrics,
        params: stamp_json(&doc.params)?,
        template_params: stamp_json(&doc.template_params)?,
        owners: ctx.stamp_owner(existing.map(|e| e.owners).unwrap_or_default()),
    };

    ctx.session
        .datasets()
        .upsert(dataset)
        .map_err(|err| CommandError::Exception(err.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{AllowAllGate, MemStore, MetadataStore};
    use uuid::Uuid;

    fn parent(session: &mut dyn quarry_core::MetadataSession, uri: &str) -> Database {
        session
            .databases()
            .upsert(Database::new("analytics", uri))
            .unwrap()
    }

    fn doc(uuid: Uuid, database_uuid: Uuid) -> DatasetDoc {
        DatasetDoc {
            table_name: "events".to_string(),
            schema: Some("public".to_string()),
            sql: None,
            params: None,
            template_params: None,
            columns: vec![ColumnDoc {
                column_name: "ts".to_string(),
                type_: Some("TIMESTAMP".to_string()),
                is_dttm: true,
                is_active: true,
                groupby: true,
                filterable: true,
                expression: None,
                python_date_format: None,
            }],
            metrics: vec![MetricDoc {
                metric_name: "count".to_string(),
                expression: "COUNT(*)".to_string(),
                metric_type: None,
                d3format: None,
                extra: None,
            }],
            uuid,
            version: "1.0.0".to_string(),
            database_uuid,
            source_db_engine: None,
        }
    }

    #[test]
    fn propagates_parent_database_id() {
        let store = MemStore::new();
        let mut session = store.begin();
        let db = parent(session.as_mut(), "postgresql://u@h/analytics");
        let gate = AllowAllGate::default();
        let mut ctx = ImportContext {
            session: session.as_mut(),
            gate: &gate,
            overwrite: false,
            ignore_permissions: false,
        };
        let ds = import_dataset(&mut ctx, doc(Uuid::new_v4(), db.uuid), &db).unwrap();
        assert_eq!(ds.database_id, db.id);
        assert_eq!(ds.columns.len(), 1);
        assert_eq!(ds.metrics[0].metric_name, "count");
    }

    #[test]
    fn main_schema_is_normalized_to_null() {
        let store = MemStore::new();
        let mut session = store.begin();
        let db = parent(session.as_mut(), "sqlite:///examples.db");
        let gate = AllowAllGate::default();
        let mut ctx = ImportContext {
            session: session.as_mut(),
            gate: &gate,
            overwrite: false,
            ignore_permissions: false,
        };
        let mut d = doc(Uuid::new_v4(), db.uuid);
        d.schema = Some("main".to_string());
        let ds = import_dataset(&mut ctx, d, &db).unwrap();
        assert_eq!(ds.schema, None);
    }

    #[test]
    fn duplicate_uuid_rows_select_existing_silently() {
        let store = MemStore::new();
        let mut session = store.begin();
        let db = parent(session.as_mut(), "postgresql://u@h/analytics");
        let uuid = Uuid::new_v4();

        // Seed two rows with the same UUID (the historical twin situation).
        let mut twin_a = Dataset::new("events");
        twin_a.uuid = uuid;
        twin_a.database_id = db.id;
        let twin_a = session.datasets().upsert(twin_a).unwrap();
        let mut twin_b = Dataset::new("events");
        twin_b.uuid = uuid;
        twin_b.schema = Some("public".to_string());
        twin_b.database_id = db.id;
        session.datasets().upsert(twin_b).unwrap();

        let gate = AllowAllGate::default();
        let mut ctx = ImportContext {
            session: session.as_mut(),
            gate: &gate,
            overwrite: true,
            ignore_permissions: false,
        };
        let result = import_dataset(&mut ctx, doc(uuid, db.uuid), &db).unwrap();
        assert_eq!(result.id, twin_a.id);
        assert_eq!(result.table_name, "events");
    }

    #[test]
    fn virtual_sql_is_transpiled_across_engines() {
        let store = MemStore::new();
        let mut session = store.begin();
        let db = parent(session.as_mut(), "postgresql://u@h/analytics");
        let gate = AllowAllGate::default();
        let mut ctx = ImportContext {
            session: session.as_mut(),
            gate: &gate,
            overwrite: false,
            ignore_permissions: false,
        };
        let mut d = doc(Uuid::new_v4(), db.uuid);
        d.sql = Some("SELECT `name` FROM `users`".to_string());
        d.source_db_engine = Some("mysql".to_string());
        let ds = import_dataset(&mut ctx, d, &db).unwrap();
        assert_eq!(ds.sql.as_deref(), Some("SELECT \"name\" FROM \"users\""));
    }
}
