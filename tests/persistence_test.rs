mod common;

use simstore::{Error, JournalMode, MatrixReadPlan, RecordingStore, StoreConfig, SyncMode};

#[test]
fn reopened_store_reads_and_extends_previous_run() {
    let (_dir, path) = common::create_temp_store_file("run.sqlite3");

    {
        let mut store = RecordingStore::open_path(&path).unwrap();
        assert_eq!(store.database_path(), Some(path.as_path()));
        store.update_segment(0, 0.0, 100.0).unwrap();
        store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(4)).unwrap();
        store.register_single_source("core", "rate", 0, &common::voltage_spec(2)).unwrap();
        store
            .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&[0, 1], 2), &[0, 1], None)
            .unwrap();
        store.insert_single("core", "rate", 0, vec![1.0], 1, Some(&[0.0])).unwrap();
    }

    // Second instance simulates the driver restarting.
    let mut store = RecordingStore::open_path(&path).unwrap();
    assert_eq!(store.current_segment().unwrap(), Some(0));

    // Column directories come back from the registry, not from memory.
    let err = store
        .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&[0], 1), &[0], None)
        .unwrap_err();
    assert!(matches!(err, Error::ShardIdMismatch { expected: 2, actual: 1, .. }));

    store
        .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&[2, 3], 2), &[2, 3], None)
        .unwrap();
    store.insert_single("core", "rate", 0, vec![2.0], 0, Some(&[0.0])).unwrap();

    let matrix = store.get_matrix_data("pop1", "v", 0).unwrap();
    assert_eq!(matrix.ids, vec![0, 1, 2, 3]);
    assert_eq!(matrix.data[1], vec![common::cell(1, 0), common::cell(1, 1), common::cell(1, 2), common::cell(1, 3)]);
    assert!(matches!(
        store.matrix_read_plan("pop1", "v", 0).unwrap(),
        MatrixReadPlan::JoinedViews { .. }
    ));

    let single = store.get_single_data("core", "rate", 0).unwrap();
    assert_eq!(single.ids, vec![1, 0]);
    assert_eq!(single.data, vec![vec![1.0, 2.0]]);
}

#[test]
fn registry_is_visible_to_plain_sqlite_readers() {
    let (_dir, path) = common::create_temp_store_file("registry.sqlite3");
    {
        let mut store = RecordingStore::open_path(&path).unwrap();
        store.update_segment(0, 0.0, 10.0).unwrap();
        store.register_event_source("pop1", "spikes", 0, &common::spike_spec(3)).unwrap();
    }

    let conn = common::open_read_only(&path);
    let (table_type, data_table): (String, Option<String>) = conn
        .query_row(
            "SELECT table_type, data_table FROM metadata WHERE source = 'pop1' AND variable = 'spikes'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(table_type, "EVENT");
    let data_table = data_table.unwrap();
    assert!(data_table.ends_with("_pop1_spikes_events"));

    let version: String = conn
        .query_row("SELECT value FROM store_info WHERE key = 'schema_version'", [], |row| row.get(0))
        .unwrap();
    assert!(!version.is_empty());
}

#[test]
fn clear_ds_persists_across_reopen() {
    let (_dir, path) = common::create_temp_store_file("clear.sqlite3");
    {
        let mut store = RecordingStore::open_path(&path).unwrap();
        store.update_segment(0, 0.0, 10.0).unwrap();
        store.register_event_source("pop1", "spikes", 0, &common::spike_spec(3)).unwrap();
        store.insert_events("pop1", "spikes", 0, vec![vec![1.0, 2.0]], None).unwrap();
        store.clear_ds().unwrap();
    }

    let store = RecordingStore::open_path(&path).unwrap();
    assert!(store.get_segments().unwrap().is_empty());

    let conn = common::open_read_only(&path);
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name LIKE 'rec%'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 0);
}

#[test]
fn config_from_json_opens_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("configured.sqlite3");
    let json = serde_json::json!({
        "path": path,
        "journal_mode": "delete",
        "sync_mode": "full",
        "max_columns": 8
    });
    let config: StoreConfig = serde_json::from_value(json).unwrap();
    assert_eq!(config.journal_mode, JournalMode::Delete);
    assert_eq!(config.sync_mode, SyncMode::Full);

    let mut store = RecordingStore::open(config).unwrap();
    assert_eq!(store.config().max_columns, 8);
    store.update_segment(0, 0.0, 10.0).unwrap();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(20)).unwrap();

    let ids: Vec<u32> = (0..20).collect();
    store
        .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&ids, 1), &ids, None)
        .unwrap();
    let plan = store.matrix_read_plan("pop1", "v", 0).unwrap();
    assert_eq!(plan.shards().len(), 3);
    assert_eq!(plan.ids(), ids);
}

#[test]
fn invalid_config_is_rejected() {
    let config = StoreConfig::default().with_max_columns(5000);
    assert!(matches!(RecordingStore::open(config), Err(Error::InvalidConfig(_))));
    let config = StoreConfig::default().with_max_columns(0);
    assert!(matches!(RecordingStore::open(config), Err(Error::InvalidConfig(_))));
}
