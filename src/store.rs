//! # Recording Store
//!
//! [`RecordingStore`] is the handle a simulation driver holds for the whole
//! run. It owns the SQLite connection, the store configuration and the
//! write-side column directory, and exposes the full write and read API.
//!
//! ## Write Path
//!
//! ```text
//! insert_matrix_with_timestamps(source, variable, segment, data, ids, ts)
//!         │
//!         ▼
//! ┌───────────────────────────────┐
//! │ BEGIN EXCLUSIVE               │
//! │   resolve segment (-1 → cur)  │
//! │   catalog lookup (MATRIX?)    │
//! │   pipeline::normalize         │
//! │   matrix::insert              │  shard DDL, view rebuild, rows
//! │ COMMIT                        │
//! └───────────────┬───────────────┘
//!                 │ any error
//!                 ▼
//!   transaction dropped (ROLLBACK), column directory cache cleared
//! ```
//!
//! ## Invariant: Memory Lags Disk
//!
//! The column directory is only trusted while the transaction that filled
//! it commits. A failed operation discards the whole cache, which then
//! reloads lazily from `column_directory`.
//!
//! ## Reads
//!
//! Reads run on the connection without a transaction: there is only one
//! writer and it is this handle, so a read never observes half an operation.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::config::StoreConfig;
use crate::directory::ColumnDirectory;
use crate::error::{Error, Result};
use crate::matrix::{self, MatrixReadPlan};
use crate::pipeline;
use crate::reader;
use crate::schema::Database;
use crate::segments::{self, SegmentUpdate};
use crate::tables;
use crate::types::{
    EventsData, MatrixData, RecordedData, RecordingDescriptor, RecordingSpec, Samples,
    SegmentSpan, SingleData, TableType, Timestamps, VariableMap,
};

/// Handle to one recording database.
///
/// # Example
///
/// ```rust
/// use simstore::{RecordingSpec, RecordingStore};
///
/// let mut store = RecordingStore::open_in_memory()?;
/// store.update_segment(0, 0.0, 100.0)?;
///
/// let spec = RecordingSpec::new(1.0, "membrane voltage", "mV", 3);
/// store.register_matrix_source("pop1", "v", 0, &spec)?;
/// store.insert_matrix_using_interval(
///     "pop1",
///     "v",
///     0,
///     vec![vec![-65.0, -64.0, -70.0], vec![-60.0, -63.5, -69.0]],
///     &[0, 1, 2],
///     0.0,
/// )?;
///
/// let data = store.get_matrix_data("pop1", "v", -1)?;
/// assert_eq!(data.ids, vec![0, 1, 2]);
/// assert_eq!(data.timestamps, vec![0.0, 1.0]);
/// # Ok::<(), simstore::Error>(())
/// ```
///
/// # Thread Safety
///
/// `RecordingStore` is `Send` but all operations take `&self` or `&mut self`
/// on one thread. Open one store per file.
#[derive(Debug)]
pub struct RecordingStore {
    db: Database,
    config: StoreConfig,
    directory: ColumnDirectory,
}

impl RecordingStore {
    // =========================================================================
    // Opening
    // =========================================================================

    /// Opens the store described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let db = Database::open_with_config(&config)?;
        info!(
            target: "simstore::store",
            path = ?config.path,
            max_columns = config.max_columns,
            "recording store ready"
        );
        Ok(Self {
            db,
            config,
            directory: ColumnDirectory::new(),
        })
    }

    /// Opens (creating if needed) a store file with default settings.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(StoreConfig::default().with_path(path.as_ref()))
    }

    /// Opens an unshared in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::default())
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// File backing the store; `None` when in memory.
    pub fn database_path(&self) -> Option<&Path> {
        self.db.path()
    }

    /// Drops every data table and view and empties the registry.
    pub fn clear_ds(&mut self) -> Result<()> {
        self.directory.clear();
        self.db.reset()
    }

    /// Runs `op` in an exclusive transaction, committing on success.
    ///
    /// On failure the transaction is dropped (rolled back) and the column
    /// directory cache discarded.
    fn write<T>(
        &mut self,
        label: &'static str,
        op: impl FnOnce(&Connection, &mut ColumnDirectory, &StoreConfig) -> Result<T>,
    ) -> Result<T> {
        let tx = self.db.transaction()?;
        let result = match op(&*tx, &mut self.directory, &self.config) {
            Ok(value) => tx.commit().map(|()| value).map_err(Error::from),
            Err(err) => Err(err),
        };

        match &result {
            Ok(_) => debug!(target: "simstore::store", op = label, "committed"),
            Err(err) => {
                self.directory.clear();
                warn!(target: "simstore::store", op = label, error = %err, "rolled back");
            }
        }
        result
    }

    // =========================================================================
    // Segments
    // =========================================================================

    /// Creates a segment, or raises its end time and clears its data.
    pub fn update_segment(
        &mut self,
        segment: i64,
        start_timestamp: f64,
        end_timestamp: f64,
    ) -> Result<SegmentUpdate> {
        self.write("update_segment", |conn, _, _| {
            segments::update_segment(conn, segment, start_timestamp, end_timestamp)
        })
    }

    /// Every segment with its span, ordered by id.
    pub fn get_segments(&self) -> Result<BTreeMap<i64, SegmentSpan>> {
        segments::get_segments(self.db.connection())
    }

    /// Highest segment id, `None` before the first `update_segment`.
    pub fn current_segment(&self) -> Result<Option<i64>> {
        segments::current_segment(self.db.connection())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a series of any type. Repeating an identical registration
    /// is a no-op; a differing one fails with `Error::MetadataConflict`.
    pub fn register_metadata(
        &mut self,
        source: &str,
        variable: &str,
        segment: i64,
        spec: &RecordingSpec,
        table_type: TableType,
    ) -> Result<RecordingDescriptor> {
        self.write("register_metadata", |conn, _, _| {
            let segment = segments::resolve_segment(conn, segment)?;
            Ok(catalog::register(conn, source, variable, segment, spec, table_type)?.descriptor)
        })
    }

    /// Registers an EVENT series.
    pub fn register_event_source(
        &mut self,
        source: &str,
        variable: &str,
        segment: i64,
        spec: &RecordingSpec,
    ) -> Result<RecordingDescriptor> {
        self.register_metadata(source, variable, segment, spec, TableType::Event)
    }

    /// Registers a MATRIX series.
    pub fn register_matrix_source(
        &mut self,
        source: &str,
        variable: &str,
        segment: i64,
        spec: &RecordingSpec,
    ) -> Result<RecordingDescriptor> {
        self.register_metadata(source, variable, segment, spec, TableType::Matrix)
    }

    /// Registers a SINGLE series.
    pub fn register_single_source(
        &mut self,
        source: &str,
        variable: &str,
        segment: i64,
        spec: &RecordingSpec,
    ) -> Result<RecordingDescriptor> {
        self.register_metadata(source, variable, segment, spec, TableType::Single)
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    /// Appends events. Rows are `[timestamp, id]` unless `timestamps` is
    /// given, in which case `data` holds only the ids.
    ///
    /// Returns the number of events written.
    pub fn insert_events(
        &mut self,
        source: &str,
        variable: &str,
        segment: i64,
        data: impl Into<Samples>,
        timestamps: Option<&[f64]>,
    ) -> Result<usize> {
        let samples = data.into();
        self.write("insert_events", |conn, _, _| {
            let segment = segments::resolve_segment(conn, segment)?;
            let series = catalog::lookup(conn, source, variable, segment, Some(TableType::Event))?;
            let events = pipeline::event_pairs(samples, Timestamps::from(timestamps))?;
            let Some(table) = series.data_table()? else {
                return Ok(0);
            };
            tables::insert_events(conn, &table, &events)
        })
    }

    /// Writes matrix rows for `ids`. Rows carry a leading timestamp unless
    /// `timestamps` is given.
    ///
    /// Returns the number of rows written.
    pub fn insert_matrix_with_timestamps(
        &mut self,
        source: &str,
        variable: &str,
        segment: i64,
        data: impl Into<Samples>,
        ids: &[u32],
        timestamps: Option<&[f64]>,
    ) -> Result<usize> {
        self.insert_matrix(
            "insert_matrix_with_timestamps",
            source,
            variable,
            segment,
            data.into(),
            ids,
            Timestamps::from(timestamps),
        )
    }

    /// Writes matrix rows for `ids`, timestamping row `k` at
    /// `start_time + k * sampling_interval`.
    pub fn insert_matrix_using_interval(
        &mut self,
        source: &str,
        variable: &str,
        segment: i64,
        data: impl Into<Samples>,
        ids: &[u32],
        start_time: f64,
    ) -> Result<usize> {
        self.insert_matrix(
            "insert_matrix_using_interval",
            source,
            variable,
            segment,
            data.into(),
            ids,
            Timestamps::FromInterval { start_time },
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_matrix(
        &mut self,
        label: &'static str,
        source: &str,
        variable: &str,
        segment: i64,
        samples: Samples,
        ids: &[u32],
        timestamps: Timestamps<'_>,
    ) -> Result<usize> {
        self.write(label, |conn, directory, config| {
            let segment = segments::resolve_segment(conn, segment)?;
            let series = catalog::lookup(conn, source, variable, segment, Some(TableType::Matrix))?;
            let batch = pipeline::normalize(
                samples,
                timestamps,
                series.descriptor.spec.sampling_interval,
                ids.len(),
            )?;
            matrix::insert(conn, directory, &series, ids, &batch, config.max_columns)
        })
    }

    /// Writes one id's values into a SINGLE series. A value for a known
    /// (timestamp, id) replaces the stored one.
    pub fn insert_single(
        &mut self,
        source: &str,
        variable: &str,
        segment: i64,
        data: impl Into<Samples>,
        id: u32,
        timestamps: Option<&[f64]>,
    ) -> Result<usize> {
        let samples = data.into();
        self.write("insert_single", |conn, directory, config| {
            let segment = segments::resolve_segment(conn, segment)?;
            let series = catalog::lookup(conn, source, variable, segment, Some(TableType::Single))?;
            let batch = pipeline::normalize(
                samples,
                Timestamps::from(timestamps),
                series.descriptor.spec.sampling_interval,
                1,
            )?;
            if batch.is_empty() {
                return Ok(0);
            }
            let Some(table) = series.data_table()? else {
                return Ok(0);
            };
            tables::insert_single(
                conn,
                directory,
                &table,
                id,
                &batch.scalar_pairs(),
                config.max_columns,
            )
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reads any series, shaped by its table type.
    pub fn get_data(&self, source: &str, variable: &str, segment: i64) -> Result<RecordedData> {
        let conn = self.db.connection();
        let segment = segments::resolve_segment(conn, segment)?;
        reader::read_data(conn, source, variable, segment)
    }

    /// Reads a MATRIX series.
    pub fn get_matrix_data(&self, source: &str, variable: &str, segment: i64) -> Result<MatrixData> {
        let conn = self.db.connection();
        let segment = segments::resolve_segment(conn, segment)?;
        let series = catalog::lookup(conn, source, variable, segment, Some(TableType::Matrix))?;
        reader::read_matrix(conn, &series)
    }

    /// Reads an EVENT series.
    pub fn get_events_data(&self, source: &str, variable: &str, segment: i64) -> Result<EventsData> {
        let conn = self.db.connection();
        let segment = segments::resolve_segment(conn, segment)?;
        let series = catalog::lookup(conn, source, variable, segment, Some(TableType::Event))?;
        reader::read_events(conn, &series)
    }

    /// Reads a SINGLE series.
    pub fn get_single_data(&self, source: &str, variable: &str, segment: i64) -> Result<SingleData> {
        let conn = self.db.connection();
        let segment = segments::resolve_segment(conn, segment)?;
        let series = catalog::lookup(conn, source, variable, segment, Some(TableType::Single))?;
        reader::read_single(conn, &series)
    }

    /// Sources and their variables registered in `segment`.
    pub fn get_variable_map(&self, segment: i64) -> Result<VariableMap> {
        let conn = self.db.connection();
        let segment = segments::resolve_segment(conn, segment)?;
        catalog::variable_map(conn, segment)
    }

    /// Descriptors of every variable `source` registered in `segment`.
    pub fn get_source_segment_data(
        &self,
        source: &str,
        segment: i64,
    ) -> Result<Vec<RecordingDescriptor>> {
        let conn = self.db.connection();
        let segment = segments::resolve_segment(conn, segment)?;
        catalog::source_segment_data(conn, source, segment)
    }

    /// Descriptor of one series.
    pub fn get_recording_descriptor(
        &self,
        source: &str,
        variable: &str,
        segment: i64,
    ) -> Result<RecordingDescriptor> {
        let conn = self.db.connection();
        let segment = segments::resolve_segment(conn, segment)?;
        Ok(catalog::lookup(conn, source, variable, segment, None)?.descriptor)
    }

    /// How a MATRIX series would be read right now.
    pub fn matrix_read_plan(
        &self,
        source: &str,
        variable: &str,
        segment: i64,
    ) -> Result<MatrixReadPlan> {
        let conn = self.db.connection();
        let segment = segments::resolve_segment(conn, segment)?;
        let series = catalog::lookup(conn, source, variable, segment, Some(TableType::Matrix))?;
        MatrixReadPlan::load(conn, &series)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(n: u32) -> RecordingSpec {
        RecordingSpec::new(0.1, "test series", "mV", n)
    }

    fn store() -> RecordingStore {
        let mut store = RecordingStore::open_in_memory().unwrap();
        store.update_segment(0, 0.0, 10.0).unwrap();
        store
    }

    #[test]
    fn test_in_memory_has_no_path() {
        let store = RecordingStore::open_in_memory().unwrap();
        assert_eq!(store.database_path(), None);
        assert_eq!(store.current_segment().unwrap(), None);
    }

    #[test]
    fn test_registration_needs_segment() {
        let mut store = RecordingStore::open_in_memory().unwrap();
        let err = store.register_event_source("pop1", "spikes", 0, &spec(4)).unwrap_err();
        assert!(matches!(err, Error::UnknownSegment { .. }));
        let err = store.register_event_source("pop1", "spikes", -1, &spec(4)).unwrap_err();
        assert!(matches!(err, Error::UnknownSegment { .. }));
    }

    #[test]
    fn test_interval_timestamps_use_sampling_interval() {
        let mut store = store();
        store.register_matrix_source("pop1", "v", 0, &spec(2)).unwrap();
        store
            .insert_matrix_using_interval("pop1", "v", 0, vec![vec![1.0, 2.0]; 3], &[4, 9], 2.0)
            .unwrap();

        let data = store.get_matrix_data("pop1", "v", 0).unwrap();
        assert_eq!(data.timestamps.len(), 3);
        assert!((data.timestamps[2] - 2.2).abs() < 1e-9);
        assert_eq!(data.ids, vec![4, 9]);
    }

    #[test]
    fn test_failed_insert_rolls_back() {
        let config = StoreConfig::default().with_max_columns(2);
        let mut store = RecordingStore::open(config).unwrap();
        store.update_segment(0, 0.0, 10.0).unwrap();
        store.register_matrix_source("pop1", "v", 0, &spec(8)).unwrap();
        store
            .insert_matrix_with_timestamps("pop1", "v", 0, vec![vec![0.0, 1.0, 2.0]], &[0, 1], None)
            .unwrap();

        // Block [5, 6] creates a shard, block [7, 0] then collides with id 0.
        let err = store
            .insert_matrix_with_timestamps(
                "pop1",
                "v",
                0,
                vec![vec![0.0, 5.0, 6.0, 7.0, 0.5]],
                &[5, 6, 7, 0],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));

        let plan = store.matrix_read_plan("pop1", "v", 0).unwrap();
        assert!(matches!(plan, MatrixReadPlan::SingleTable(_)));
        assert_eq!(store.get_recording_descriptor("pop1", "v", 0).unwrap().n_ids, 2);

        // The discarded shard can be created again.
        store
            .insert_matrix_with_timestamps("pop1", "v", 0, vec![vec![0.0, 5.0, 6.0]], &[5, 6], None)
            .unwrap();
        let data = store.get_matrix_data("pop1", "v", 0).unwrap();
        assert_eq!(data.ids, vec![0, 1, 5, 6]);
        assert_eq!(data.data, vec![vec![1.0, 2.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_wrong_type_insert() {
        let mut store = store();
        store.register_event_source("pop1", "spikes", 0, &spec(4)).unwrap();
        let err = store
            .insert_single("pop1", "spikes", 0, vec![1.0], 0, Some(&[0.0]))
            .unwrap_err();
        assert!(matches!(err, Error::TableTypeMismatch { .. }));
    }

    #[test]
    fn test_clear_ds_empties_everything() {
        let mut store = store();
        store.register_single_source("core", "rate", 0, &spec(1)).unwrap();
        store.insert_single("core", "rate", 0, vec![1.0, 2.0], 0, Some(&[0.0, 1.0])).unwrap();

        store.clear_ds().unwrap();
        assert!(store.get_segments().unwrap().is_empty());

        store.update_segment(0, 0.0, 10.0).unwrap();
        assert!(store.get_variable_map(0).unwrap().is_empty());
        // Same key registers again from scratch.
        store.register_single_source("core", "rate", 0, &spec(1)).unwrap();
        store.insert_single("core", "rate", 0, vec![3.0], 0, Some(&[0.0])).unwrap();
        assert_eq!(store.get_single_data("core", "rate", 0).unwrap().data, vec![vec![3.0]]);
    }
}
