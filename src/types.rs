//! # Domain Types for SimStore
//!
//! This module defines the values that flow through the store: what a series
//! is recorded as ([`TableType`]), how it was registered
//! ([`RecordingSpec`], [`RecordingDescriptor`]), the shape of incoming data
//! ([`Samples`], [`Timestamps`]) and what reads hand back ([`MatrixData`],
//! [`EventsData`], [`RecordedData`]).
//!
//! ## Ids and Segments
//!
//! Neuron ids are `u32`: they are raster-order indices local to one placement
//! unit and become column names in matrix and single tables. Segment
//! arguments are `i64` because negative values are offsets from the current
//! segment (`-1` = current); resolved segments are always non-negative.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Table Types
// =============================================================================

/// The physical shape a series is stored in.
///
/// | Type | Rows | Typical series |
/// |------|------|----------------|
/// | `Event` | `(timestamp, id)`, duplicates allowed | spikes |
/// | `Single` | one per timestamp, one column per id, grown on demand | per-core diagnostics |
/// | `Matrix` | one per timestamp, one column per id, sharded | membrane potential, currents |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableType {
    /// Append-only `(timestamp, id)` pairs.
    Event,
    /// Incrementally widened table, upserted one id at a time.
    Single,
    /// Full rows of values for a fixed id list, split into shards.
    Matrix,
}

impl TableType {
    /// Returns the name stored in the `metadata.table_type` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "EVENT",
            Self::Single => "SINGLE",
            Self::Matrix => "MATRIX",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "EVENT" => Ok(Self::Event),
            "SINGLE" => Ok(Self::Single),
            "MATRIX" => Ok(Self::Matrix),
            other => Err(Error::Schema(format!("unknown table type '{other}' in metadata"))),
        }
    }
}

// =============================================================================
// Registration
// =============================================================================

/// The caller-supplied half of a series descriptor.
///
/// Everything here comes from the model layer at registration time. Two
/// registrations of the same (source, variable, segment) must carry equal
/// specs and the same [`TableType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSpec {
    /// Simulation time between two samples (same unit as timestamps).
    pub sampling_interval: f64,
    /// Human-readable description of the variable.
    pub description: String,
    /// Unit of the recorded values, e.g. `"mV"`.
    pub unit: String,
    /// Size of the whole population, independent of which ids get recorded.
    pub n_neurons: u32,
}

impl RecordingSpec {
    /// Creates a spec.
    pub fn new(
        sampling_interval: f64,
        description: impl Into<String>,
        unit: impl Into<String>,
        n_neurons: u32,
    ) -> Self {
        Self {
            sampling_interval,
            description: description.into(),
            unit: unit.into(),
            n_neurons,
        }
    }
}

/// A registered series as stored in the `metadata` registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingDescriptor {
    /// Recorded source (population) name.
    pub source: String,
    /// Recorded variable name.
    pub variable: String,
    /// Resolved segment id.
    pub segment: i64,
    /// Registration data.
    pub spec: RecordingSpec,
    /// Physical shape of the series.
    pub table_type: TableType,
    /// Table or view to read; `None` for matrix series that are not yet
    /// written or whose shards can only be read by concatenation.
    pub data_table: Option<String>,
    /// Ids stored so far across all shards (matrix series only).
    pub n_ids: usize,
}

// =============================================================================
// Segments
// =============================================================================

/// Simulation-time window of one run/reset cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpan {
    /// Immutable once the segment exists.
    pub start_timestamp: f64,
    /// May only grow.
    pub end_timestamp: f64,
}

/// `source → [(variable, table type)]` for one segment.
pub type VariableMap = BTreeMap<String, Vec<(String, TableType)>>;

// =============================================================================
// Incoming Data
// =============================================================================

/// Sample values handed to an insert.
///
/// Rows may carry a leading timestamp column, depending on [`Timestamps`].
/// `Scalars` is the one-value-per-row shorthand (e.g. a single id's values);
/// it is wrapped into one-element rows before any timestamp handling.
///
/// # Example
///
/// ```rust
/// use simstore::Samples;
///
/// let rows: Samples = vec![vec![0.0, -65.0], vec![1.0, -64.2]].into();
/// let scalars: Samples = vec![-65.0, -64.2].into();
/// assert_eq!(rows.len(), scalars.len());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// Two-dimensional data: one inner vec per row.
    Rows(Vec<Vec<f64>>),
    /// One value per row.
    Scalars(Vec<f64>),
}

impl Samples {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Scalars(values) => values.len(),
        }
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts into two-dimensional rows.
    pub fn into_rows(self) -> Vec<Vec<f64>> {
        match self {
            Self::Rows(rows) => rows,
            Self::Scalars(values) => values.into_iter().map(|v| vec![v]).collect(),
        }
    }
}

impl From<Vec<Vec<f64>>> for Samples {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        Self::Rows(rows)
    }
}

impl From<Vec<f64>> for Samples {
    fn from(values: Vec<f64>) -> Self {
        Self::Scalars(values)
    }
}

impl From<&[Vec<f64>]> for Samples {
    fn from(rows: &[Vec<f64>]) -> Self {
        Self::Rows(rows.to_vec())
    }
}

impl From<&[f64]> for Samples {
    fn from(values: &[f64]) -> Self {
        Self::Scalars(values.to_vec())
    }
}

/// Where the timestamps of an insert come from.
///
/// Exactly one mode applies per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timestamps<'a> {
    /// The first column of every row is the timestamp.
    Embedded,
    /// A parallel array, one timestamp per row.
    Explicit(&'a [f64]),
    /// `start_time + k * sampling_interval` for row `k` (matrix only).
    FromInterval {
        /// Timestamp of the first row.
        start_time: f64,
    },
}

impl<'a> From<Option<&'a [f64]>> for Timestamps<'a> {
    /// `None` means embedded, mirroring "timestamps omitted".
    fn from(timestamps: Option<&'a [f64]>) -> Self {
        match timestamps {
            Some(ts) => Self::Explicit(ts),
            None => Self::Embedded,
        }
    }
}

// =============================================================================
// Read Results
// =============================================================================

/// Matrix-shaped read result: `data[row][column]` is the value of
/// `ids[column]` at `timestamps[row]`. Missing samples are `NaN`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixData {
    /// Column ids, in shard order.
    pub ids: Vec<u32>,
    /// Row timestamps, ascending.
    pub timestamps: Vec<f64>,
    /// `timestamps.len()` rows of `ids.len()` values.
    pub data: Vec<Vec<f64>>,
}

impl MatrixData {
    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.timestamps.len(), self.ids.len())
    }

    /// True when no rows were recorded.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Appends another block of columns that shares this block's timestamp
    /// axis.
    pub(crate) fn extend_columns(&mut self, other: MatrixData) -> Result<()> {
        if self.ids.is_empty() && self.timestamps.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.timestamps != other.timestamps {
            return Err(Error::Schema(format!(
                "shard timestamp axes disagree: {} rows vs {} rows",
                self.timestamps.len(),
                other.timestamps.len()
            )));
        }
        self.ids.extend(other.ids);
        for (row, extra) in self.data.iter_mut().zip(other.data) {
            row.extend(extra);
        }
        Ok(())
    }
}

/// Single-table reads have the same shape as matrix reads.
pub type SingleData = MatrixData;

/// One recorded event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedEvent {
    /// When the event happened.
    pub timestamp: f64,
    /// Which id produced it.
    pub id: u32,
}

/// Event read result, in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventsData {
    /// Recorded `(timestamp, id)` pairs.
    pub events: Vec<RecordedEvent>,
}

impl EventsData {
    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events were recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Result of [`RecordingStore::get_data`](crate::RecordingStore::get_data).
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedData {
    /// Data of a matrix series.
    Matrix(MatrixData),
    /// Data of an event series.
    Events(EventsData),
    /// Data of a single-column series.
    Single(SingleData),
}

impl RecordedData {
    /// Table type this data was read from.
    pub fn table_type(&self) -> TableType {
        match self {
            Self::Matrix(_) => TableType::Matrix,
            Self::Events(_) => TableType::Event,
            Self::Single(_) => TableType::Single,
        }
    }

    /// True when the series has no rows.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Matrix(data) | Self::Single(data) => data.is_empty(),
            Self::Events(events) => events.is_empty(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
