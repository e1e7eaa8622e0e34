//! # SimStore - Recording Store for Neural Simulations
//!
//! SimStore persists what a long-running, massively parallel simulation
//! records (membrane potentials, synaptic currents, spike trains, scalar
//! diagnostics) in one SQLite file so it can be queried after the run.
//! It provides:
//!
//! - **Dynamic schema**: one physical table shape per recording pattern
//! - **Horizontal sharding**: matrix series wider than SQLite's column limit
//!   are split into shards and reassembled through views
//! - **Segments**: repeated run/reset cycles, with stale data cleared when a
//!   segment is re-run for longer
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        RecordingStore                           │
//! │        (register, insert, update_segment, get_data, ...)        │
//! └──────────┬──────────────────────────────────────┬───────────────┘
//!            │ exclusive transaction                │ plain reads
//!            ▼                                      ▼
//! ┌──────────────────────────────────┐   ┌───────────────────────────┐
//! │ pipeline   normalize rows        │   │ reader                    │
//! │ catalog    metadata registry     │   │   EVENT  by rowid         │
//! │ segments   segment_info          │   │   SINGLE by timestamp     │
//! │ tables     EVENT / SINGLE        │   │   MATRIX by read plan     │
//! │ matrix     shards + views        │   └─────────────┬─────────────┘
//! │ directory  column ids            │                 │
//! └────────────────┬─────────────────┘                 │
//!                  ▼                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   SQLite (one file or in memory)                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **One descriptor per key**: (source, variable, segment) is registered
//!    once; a differing re-registration is an error
//! 2. **Segments only grow**: a start time never changes and an end time
//!    never shrinks
//! 3. **Shard ids are fixed**: a shard's ordered id list never changes and
//!    no id lives in two shards of one series
//! 4. **Memory lags disk**: the column directory cache is dropped whenever
//!    a transaction fails
//! 5. **No raw names in SQL**: every dynamic table or view name is an
//!    allow-listed [`Ident`](ident::Ident)
//!
//! ## Module Organization
//!
//! - [`error`]: the single error enum
//! - [`config`]: store configuration
//! - [`types`]: descriptors, insert inputs and read results
//! - [`ident`]: identifier validation and table naming
//! - [`schema`]: registry DDL and database bootstrap
//! - [`directory`]: per-table column directory
//! - [`segments`]: segment lifecycle
//! - [`catalog`]: series registry
//! - [`tables`]: EVENT and SINGLE tables
//! - [`pipeline`]: insert normalization
//! - [`matrix`]: matrix shard coordination
//! - [`reader`]: query engine
//! - [`store`]: [`RecordingStore`], the main entry point

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for SimStore operations.
///
/// One enum covers registration conflicts, unknown series and segments,
/// temporal regressions, invalid input and SQLite failures.
pub mod error;

/// Store configuration: file path, pragmas and the column ceiling.
pub mod config;

/// Domain types.
///
/// Table types, recording descriptors, insert inputs ([`Samples`],
/// [`Timestamps`]) and read results.
pub mod types;

/// Validated SQL identifiers and the naming scheme for per-series tables.
pub mod ident;

/// SQLite schema definitions and database initialization.
///
/// Contains the registry DDL, pragma setup, schema version check and the
/// full reset used by [`RecordingStore::clear_ds`].
pub mod schema;

/// Ordered id lists of tables with one column per id.
pub mod directory;

/// Segment creation, extension and resolution of relative segment ids.
pub mod segments;

/// The `metadata` registry of recorded series.
pub mod catalog;

/// EVENT and SINGLE physical tables.
pub mod tables;

/// Normalization of caller data into timestamped rows.
pub mod pipeline;

/// Matrix shards, the combined view and the matrix read plan.
///
/// Series with more ids than fit in one table are split into shards; see
/// [`MatrixReadPlan`] for how they are read back.
pub mod matrix;

/// Read operations for every table type.
pub mod reader;

/// The store handle.
///
/// The main entry point is [`RecordingStore`](store::RecordingStore).
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{JournalMode, StoreConfig, SyncMode};
pub use error::{Error, Result};
pub use matrix::{MatrixReadPlan, ShardInfo, MAX_JOINED_SHARDS};
pub use schema::Database;
pub use segments::SegmentUpdate;
pub use store::RecordingStore;

pub use types::{
    EventsData, MatrixData, RecordedData, RecordedEvent, RecordingDescriptor, RecordingSpec,
    Samples, SegmentSpan, SingleData, TableType, Timestamps, VariableMap,
};
