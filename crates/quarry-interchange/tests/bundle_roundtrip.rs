//! End-to-end bundle flows over the in-memory store.

use indoc::{formatdoc, indoc};
use pretty_assertions::assert_eq;
use quarry_core::auth::AllowAllGate;
use quarry_core::command::{Command, CommandError};
use quarry_core::dao::MetadataStore;
use quarry_core::memstore::MemStore;
use quarry_core::model::{Chart, Column, Dashboard, Database, Dataset};
use quarry_engines::EngineRegistry;
use quarry_interchange::{
    BundleContents, EntityKind, ExportBundleCommand, ImportBundleCommand,
};
use serde_json::{json, Value};

const DB_UUID: &str = "b8a1c6a8-8f70-4e33-9f42-9a2c6a8afe89";
const DS_UUID: &str = "10808100-158b-42c4-842e-f32b99d88dfb";
const CHART_UUID: &str = "e7b8a1c6-1111-4e33-9f42-9a2c6a8afe89";

fn chart_bundle() -> BundleContents {
    let mut contents = BundleContents::new();
    contents.insert(
        "metadata.yaml".to_string(),
        indoc! {r#"
            version: "1.0.0"
            type: Slice
            timestamp: "2020-11-04T21:27:44Z"
        "#}
        .to_string(),
    );
    contents.insert(
        "databases/db.yaml".to_string(),
        formatdoc! {r#"
            database_name: imported
            sqlalchemy_uri: sqlite:///t.db
            uuid: {DB_UUID}
            version: "1.0.0"
        "#},
    );
    contents.insert(
        "datasets/db/ds.yaml".to_string(),
        formatdoc! {r#"
            table_name: imported
            columns:
              - column_name: cnt
                type: NUMBER
            metrics:
              - metric_name: count
                expression: count(1)
            uuid: {DS_UUID}
            version: "1.0.0"
            database_uuid: {DB_UUID}
        "#},
    );
    contents.insert(
        "charts/ch.yaml".to_string(),
        formatdoc! {r#"
            slice_name: C
            viz_type: deck_path
            params:
              datasource: 12__table
              slice_id: 43
            uuid: {CHART_UUID}
            version: "1.0.0"
            dataset_uuid: {DS_UUID}
        "#},
    );
    contents
}

#[tokio::test]
async fn chart_bundle_imports_its_dependency_chain() {
    let store = MemStore::new();
    let gate = AllowAllGate::default();
    let summary = ImportBundleCommand::new(&store, &gate, chart_bundle())
        .run()
        .await
        .unwrap();
    assert_eq!(
        (summary.databases, summary.datasets, summary.charts),
        (1, 1, 1)
    );

    let mut session = store.begin();
    let datasets = session.datasets().all();
    let dataset_id = datasets[0].id.unwrap();
    let charts = session.charts().all();
    let chart = &charts[0];
    let params: Value = serde_json::from_str(chart.params.as_deref().unwrap()).unwrap();
    assert_eq!(params["datasource"], json!(format!("{dataset_id}__table")));
    assert_eq!(chart.datasource_id, Some(dataset_id));
    session.rollback();
}

#[tokio::test]
async fn repeated_overwrite_import_is_idempotent() {
    let store = MemStore::new();
    let gate = AllowAllGate::default();
    for _ in 0..2 {
        ImportBundleCommand::new(&store, &gate, chart_bundle())
            .overwrite(true)
            .run()
            .await
            .unwrap();
    }
    assert_eq!(store.counts(), (1, 1, 1, 0, 0));

    let mut session = store.begin();
    assert_eq!(session.datasets().all()[0].columns.len(), 1);
    session.rollback();
}

#[tokio::test]
async fn missing_metadata_is_rejected() {
    let store = MemStore::new();
    let gate = AllowAllGate::default();
    let mut contents = chart_bundle();
    contents.shift_remove("metadata.yaml");
    let err = ImportBundleCommand::new(&store, &gate, contents)
        .run()
        .await
        .unwrap_err();
    let CommandError::Invalid(invalid) = err else {
        panic!("expected an invalid-bundle failure");
    };
    assert_eq!(
        invalid.normalized_messages()["metadata.yaml"],
        vec!["Missing data for required field.".to_string()]
    );
}

#[tokio::test]
async fn future_bundle_versions_are_rejected_by_every_adapter() {
    let store = MemStore::new();
    let gate = AllowAllGate::default();
    let mut contents = chart_bundle();
    contents.insert(
        "metadata.yaml".to_string(),
        indoc! {r#"
            version: "2.0.0"
            type: Slice
            timestamp: "2020-11-04T21:27:44Z"
        "#}
        .to_string(),
    );
    let err = ImportBundleCommand::new(&store, &gate, contents)
        .run()
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Could not find a valid command to import file"));
}

#[tokio::test]
async fn wrong_bundle_type_points_at_the_metadata_field() {
    let store = MemStore::new();
    let gate = AllowAllGate::default();
    let err = ImportBundleCommand::new(&store, &gate, chart_bundle())
        .expect_kind(EntityKind::Database)
        .run()
        .await
        .unwrap_err();
    let CommandError::Invalid(invalid) = err else {
        panic!("expected an invalid-bundle failure");
    };
    assert_eq!(
        invalid.normalized_messages()["metadata.yaml.type"],
        vec!["Must be equal to Database.".to_string()]
    );
}

#[tokio::test]
async fn dataset_without_table_name_fails_on_that_field() {
    let store = MemStore::new();
    let gate = AllowAllGate::default();
    let mut contents = chart_bundle();
    contents.insert(
        "datasets/db/ds.yaml".to_string(),
        formatdoc! {r#"
            schema: public
            uuid: {DS_UUID}
            version: "1.0.0"
            database_uuid: {DB_UUID}
        "#},
    );
    let err = ImportBundleCommand::new(&store, &gate, contents)
        .run()
        .await
        .unwrap_err();
    let CommandError::Invalid(invalid) = err else {
        panic!("expected an invalid-bundle failure");
    };
    assert_eq!(
        invalid.normalized_messages()["datasets/db/ds.yaml.table_name"],
        vec!["Missing data for required field.".to_string()]
    );
}

#[tokio::test]
async fn masked_password_without_side_channel_is_rejected() {
    let store = MemStore::new();
    let gate = AllowAllGate::default();
    let mut contents = chart_bundle();
    contents.insert(
        "databases/db.yaml".to_string(),
        formatdoc! {r#"
            database_name: imported
            sqlalchemy_uri: postgresql://u:XXXXXXXXXX@h:5432/d
            password: XXXXXXXXXX
            uuid: {DB_UUID}
            version: "1.0.0"
        "#},
    );
    let err = ImportBundleCommand::new(&store, &gate, contents)
        .run()
        .await
        .unwrap_err();
    let CommandError::Invalid(invalid) = err else {
        panic!("expected an invalid-bundle failure");
    };
    assert_eq!(
        invalid.normalized_messages()["databases/db.yaml.password"],
        vec!["Must provide a password for the database.".to_string()]
    );
    // Nothing from the bundle lands when one document is rejected.
    assert_eq!(store.counts(), (0, 0, 0, 0, 0));
}

/// Seed a dashboard with one chart and filter-scope metadata keyed by the
/// chart's local id, export it, and import into a fresh instance.
#[tokio::test]
async fn dashboard_round_trip_rekeys_chart_ids() {
    let source = MemStore::new();
    let mut session = source.begin();
    let db = session
        .databases()
        .upsert(Database::new("examples", "sqlite:///e.db"))
        .unwrap();
    let mut dataset = Dataset::new("wb_health_population");
    dataset.database_id = db.id;
    dataset.columns = vec![Column {
        column_name: "country".to_string(),
        ..Column::default()
    }];
    let dataset = session.datasets().upsert(dataset).unwrap();
    let mut chart = Chart::new("Growth", "line");
    chart.datasource_id = dataset.id;
    chart.params = Some(
        json!({"datasource": format!("{}__table", dataset.id.unwrap())}).to_string(),
    );
    let chart = session.charts().upsert(chart).unwrap();
    let old_chart_id = chart.id.unwrap();

    let mut dashboard = Dashboard::new("World Health");
    dashboard.position_json = Some(
        json!({
            "ROOT_ID": {"type": "ROOT", "id": "ROOT_ID", "children": ["CHART-1"]},
            "CHART-1": {
                "type": "CHART",
                "id": "CHART-1",
                "meta": {"chartId": old_chart_id, "uuid": chart.uuid},
            },
        })
        .to_string(),
    );
    dashboard.json_metadata = Some(
        json!({"timed_refresh_immune_slices": [old_chart_id]}).to_string(),
    );
    let dashboard = session.dashboards().upsert(dashboard).unwrap();
    let dashboard_id = dashboard.id.unwrap();
    session
        .dashboards()
        .link_chart(dashboard_id, old_chart_id)
        .unwrap();
    session.commit().unwrap();

    let gate = AllowAllGate::default();
    let registry = EngineRegistry::with_defaults();
    let files = ExportBundleCommand::new(
        &source,
        &gate,
        &registry,
        EntityKind::Dashboard,
        vec![dashboard_id],
    )
    .run()
    .await
    .unwrap();
    let contents: BundleContents = files.into_iter().collect();
    assert!(contents
        .keys()
        .any(|name| name.starts_with("charts/world_health/")));

    let target = MemStore::new();
    ImportBundleCommand::new(&target, &gate, contents)
        .run()
        .await
        .unwrap();
    assert_eq!(target.counts(), (1, 1, 1, 1, 0));

    let mut session = target.begin();
    let dashboards = session.dashboards().all();
    let imported = &dashboards[0];
    let new_chart_id = session.charts().all()[0].id.unwrap();
    assert_eq!(imported.slices, vec![new_chart_id]);

    let position: Value =
        serde_json::from_str(imported.position_json.as_deref().unwrap()).unwrap();
    assert_eq!(position["CHART-1"]["meta"]["chartId"], json!(new_chart_id));

    let metadata: Value =
        serde_json::from_str(imported.json_metadata.as_deref().unwrap()).unwrap();
    assert_eq!(
        metadata["timed_refresh_immune_slices"],
        json!([new_chart_id])
    );
    session.rollback();
}
