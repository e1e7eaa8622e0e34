#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use simstore::{RecordingSpec, RecordingStore, StoreConfig};

pub fn create_temp_store_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let _ = RecordingStore::open_path(&path).expect("initialize store");
    (dir, path)
}

pub fn open_read_only(path: &Path) -> Connection {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .expect("open read-only connection")
}

/// In-memory store with segment 0 spanning `[0, 100]`.
pub fn store_with_segment() -> RecordingStore {
    store_with_max_columns(simstore::config::DEFAULT_MAX_COLUMNS)
}

pub fn store_with_max_columns(max_columns: usize) -> RecordingStore {
    let mut store = RecordingStore::open(StoreConfig::default().with_max_columns(max_columns))
        .expect("open in-memory store");
    store.update_segment(0, 0.0, 100.0).expect("create segment 0");
    store
}

pub fn voltage_spec(n_neurons: u32) -> RecordingSpec {
    RecordingSpec::new(1.0, "membrane voltage", "mV", n_neurons)
}

pub fn spike_spec(n_neurons: u32) -> RecordingSpec {
    RecordingSpec::new(1.0, "spikes", "", n_neurons)
}

/// `rows` matrix rows for `ids` with the timestamp embedded in column 0.
/// Cell value encodes `(row, id)` so reads can be checked exactly.
pub fn embedded_rows(ids: &[u32], rows: usize) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|k| {
            let mut row = vec![k as f64];
            row.extend(ids.iter().map(|id| cell(k, *id)));
            row
        })
        .collect()
}

pub fn cell(row: usize, id: u32) -> f64 {
    row as f64 * 10_000.0 + f64::from(id)
}
