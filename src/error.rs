//! # Error Handling for SimStore
//!
//! This module defines the error types used throughout SimStore. A single error
//! enum ([`Error`]) represents every failure mode, so callers handle store
//! errors uniformly and propagate them with `?`.
//!
//! ## Rust Pattern: thiserror
//!
//! The `thiserror` crate derives `std::error::Error`:
//! - `Display` comes from the `#[error(...)]` attributes
//! - `From` impls come from `#[from]` attributes
//!
//! ## Error Categories
//!
//! | Category | Examples | Typical Response |
//! |----------|----------|------------------|
//! | Registration conflict | Descriptor drift, shard id list changed | Fix the caller; never retried |
//! | Unknown series/segment | Never registered, segment not created | Register or create the segment first |
//! | Temporal regression | Segment end moved backwards | Caller's run bookkeeping is inconsistent |
//! | Invalid input | Bad identifier, ragged rows | Fix the data handed to the store |
//! | Internal | SQLite error, schema mismatch | Log and investigate |
//!
//! Exceeding the column ceiling is deliberately absent: a matrix series that
//! cannot be joined into one view is stored as shards and read back by
//! concatenation.

use thiserror::Error;

use crate::types::TableType;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in SimStore operations.
///
/// # Example
///
/// ```rust,ignore
/// use simstore::{Error, Result};
///
/// fn example(store: &mut simstore::RecordingStore) -> Result<()> {
///     match store.get_data("pop1", "v", -1) {
///         Err(Error::UnknownSeries { .. }) => println!("nothing recorded"),
///         other => { other?; }
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Registration Conflicts
    // =========================================================================

    /// A series was registered again with a descriptor that differs from the
    /// one already stored.
    ///
    /// # When This Happens
    ///
    /// Registration is idempotent only for identical descriptors. A second
    /// call with another unit, interval, population size or table type means
    /// two parts of the caller disagree about what the series is. The stored
    /// descriptor is never overwritten.
    #[error("metadata conflict for {source_name}.{variable} in segment {segment}: {reason}")]
    MetadataConflict {
        /// Recorded source (population) name
        source_name: String,
        /// Recorded variable name
        variable: String,
        /// Resolved segment id
        segment: i64,
        /// Which field disagreed, with both values
        reason: String,
    },

    /// A matrix insert named an existing shard (same first id) but supplied a
    /// different ordered id list.
    ///
    /// A shard stands for one placement unit's columns; its column order must
    /// be stable across calls.
    #[error(
        "shard id mismatch for {source_name}.{variable} in segment {segment} at first id {first_id}: \
         shard holds {expected} ids, call supplied {actual}, first difference at position {position} \
         (stored {stored:?}, supplied {supplied:?})"
    )]
    ShardIdMismatch {
        /// Recorded source name
        source_name: String,
        /// Recorded variable name
        variable: String,
        /// Resolved segment id
        segment: i64,
        /// First id of the shard (its key)
        first_id: u32,
        /// Number of ids the shard was created with
        expected: usize,
        /// Number of ids supplied by the offending call
        actual: usize,
        /// First position where the two id lists disagree
        position: usize,
        /// Id the shard holds at `position`, `None` past its end
        stored: Option<u32>,
        /// Id the call supplied at `position`, `None` past its end
        supplied: Option<u32>,
    },

    // =========================================================================
    // Unknown Series / Segment
    // =========================================================================

    /// No series was ever registered for this key.
    ///
    /// Distinguishes "never registered" from "registered but empty", which
    /// reads back as zero rows.
    #[error("no such series: {source_name}.{variable} in segment {segment}")]
    UnknownSeries {
        /// Requested source name
        source_name: String,
        /// Requested variable name (empty when a whole source was requested)
        variable: String,
        /// Resolved segment id
        segment: i64,
    },

    /// A segment id (or a negative offset resolved against the current
    /// segment) does not name a known segment.
    #[error("unknown segment {requested}: {reason}")]
    UnknownSegment {
        /// The segment argument as supplied by the caller
        requested: i64,
        /// Why resolution failed
        reason: String,
    },

    /// The series exists but has a different table type than the read or
    /// write asked for.
    #[error("series {source_name}.{variable} is recorded as {actual}, not {expected}")]
    TableTypeMismatch {
        /// Recorded source name
        source_name: String,
        /// Recorded variable name
        variable: String,
        /// Type the caller asked for
        expected: TableType,
        /// Type stored in the registry
        actual: TableType,
    },

    // =========================================================================
    // Temporal Regression
    // =========================================================================

    /// `update_segment` tried to move a segment's end timestamp backwards.
    #[error("segment {segment} end timestamp cannot shrink from {recorded} to {requested}")]
    SegmentRegression {
        /// Segment id
        segment: i64,
        /// End timestamp already stored
        recorded: f64,
        /// End timestamp supplied by the caller
        requested: f64,
    },

    /// `update_segment` supplied a start timestamp different from the one
    /// stored for a known segment.
    #[error("segment {segment} start timestamp is {recorded}, call supplied {requested}")]
    SegmentStartMismatch {
        /// Segment id
        segment: i64,
        /// Start timestamp already stored
        recorded: f64,
        /// Start timestamp supplied by the caller
        requested: f64,
    },

    /// A segment id that must be absolute was negative.
    #[error("invalid segment id {0}: segment ids written by update_segment must be non-negative")]
    InvalidSegment(i64),

    // =========================================================================
    // Invalid Input
    // =========================================================================

    /// A name used to build a table or view identifier contains characters
    /// outside `[A-Za-z0-9_]`.
    #[error("invalid identifier '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidIdentifier(String),

    /// Data handed to an insert had the wrong shape or an unusable value.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A [`StoreConfig`](crate::StoreConfig) value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================

    /// SQLite operation failed.
    ///
    /// # Rust Pattern: #[from]
    ///
    /// `#[from]` generates `impl From<rusqlite::Error> for Error`, so `?`
    /// converts driver errors automatically.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema version mismatch or on-disk corruption.
    #[error("schema error: {0}")]
    Schema(String),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
