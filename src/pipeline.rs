//! # Insertion Pipelines
//!
//! Turns caller data into uniform `(timestamp, values)` rows before any table
//! code sees it.
//!
//! ```text
//! Samples ──► 2-D rows ──► timestamps ──► width check ──► Batch
//!            (scalars      Embedded:     matrix: len(ids)
//!             wrapped)     first column  single: 1
//!                          Explicit:     events: 1 (the id)
//!                          parallel array
//!                          FromInterval:
//!                          start + k·dt
//! ```

use crate::error::{Error, Result};
use crate::types::{Samples, Timestamps};

/// Normalized rows: `values[k]` was sampled at `timestamps[k]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    /// One timestamp per row.
    pub timestamps: Vec<f64>,
    /// Row payloads, without timestamps.
    pub values: Vec<Vec<f64>>,
}

impl Batch {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Rows restricted to the columns `start..start + width`.
    pub fn column_block(&self, start: usize, width: usize) -> Batch {
        Batch {
            timestamps: self.timestamps.clone(),
            values: self
                .values
                .iter()
                .map(|row| row[start..start + width].to_vec())
                .collect(),
        }
    }

    /// `(timestamp, value)` pairs of a width-1 batch.
    pub fn scalar_pairs(&self) -> Vec<(f64, f64)> {
        self.timestamps
            .iter()
            .zip(&self.values)
            .map(|(t, row)| (*t, row[0]))
            .collect()
    }
}

/// Normalizes `samples` into a [`Batch`] of rows `width` values wide.
///
/// `sampling_interval` is only consulted for [`Timestamps::FromInterval`].
pub fn normalize(
    samples: Samples,
    timestamps: Timestamps<'_>,
    sampling_interval: f64,
    width: usize,
) -> Result<Batch> {
    let rows = samples.into_rows();

    let batch = match timestamps {
        Timestamps::Embedded => {
            let mut ts = Vec::with_capacity(rows.len());
            let mut values = Vec::with_capacity(rows.len());
            for (k, mut row) in rows.into_iter().enumerate() {
                if row.is_empty() {
                    return Err(Error::InvalidData(format!(
                        "row {k} has no timestamp column"
                    )));
                }
                ts.push(row.remove(0));
                values.push(row);
            }
            Batch { timestamps: ts, values }
        }
        Timestamps::Explicit(ts) => {
            if ts.len() != rows.len() {
                return Err(Error::InvalidData(format!(
                    "{} timestamps supplied for {} rows",
                    ts.len(),
                    rows.len()
                )));
            }
            Batch {
                timestamps: ts.to_vec(),
                values: rows,
            }
        }
        Timestamps::FromInterval { start_time } => {
            if !(sampling_interval.is_finite() && sampling_interval > 0.0) {
                return Err(Error::InvalidData(format!(
                    "cannot derive timestamps from sampling interval {sampling_interval}"
                )));
            }
            Batch {
                timestamps: (0..rows.len())
                    .map(|k| start_time + k as f64 * sampling_interval)
                    .collect(),
                values: rows,
            }
        }
    };

    for (k, (timestamp, row)) in batch.timestamps.iter().zip(&batch.values).enumerate() {
        if !timestamp.is_finite() {
            return Err(Error::InvalidData(format!("row {k} has timestamp {timestamp}")));
        }
        if row.len() != width {
            return Err(Error::InvalidData(format!(
                "row {k} has {} values, expected {width}",
                row.len()
            )));
        }
    }
    Ok(batch)
}

/// Normalizes event data into `(timestamp, id)` pairs.
///
/// Ids arrive as numbers in the data and must be non-negative integers.
pub fn event_pairs(samples: Samples, timestamps: Timestamps<'_>) -> Result<Vec<(f64, u32)>> {
    if matches!(timestamps, Timestamps::FromInterval { .. }) {
        return Err(Error::InvalidData(
            "event timestamps cannot be derived from a sampling interval".to_string(),
        ));
    }
    let batch = normalize(samples, timestamps, 0.0, 1)?;

    batch
        .timestamps
        .iter()
        .zip(&batch.values)
        .enumerate()
        .map(|(k, (timestamp, row))| {
            let raw = row[0];
            if raw.fract() != 0.0 || raw < 0.0 || raw > f64::from(u32::MAX) {
                return Err(Error::InvalidData(format!("event {k} has invalid id {raw}")));
            }
            Ok((*timestamp, raw as u32))
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
