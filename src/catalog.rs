//! # Series Catalog
//!
//! The `metadata` registry maps (source, variable, segment) to the descriptor
//! of a recorded series and to the table or view holding its data. Every
//! other component consults it before touching a data table.
//!
//! ## Registration Contract
//!
//! ```text
//! first register(key, d)        → row inserted, EVENT/SINGLE table created
//! register(key, d) again        → nothing happens
//! register(key, d') with d'≠d   → Error::MetadataConflict, stored row untouched
//! ```
//!
//! Matrix series get no table at registration: shard geometry is only known
//! once the first insert names its ids.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::{Error, Result};
use crate::ident::{Ident, SeriesNames};
use crate::tables;
use crate::types::{RecordingDescriptor, RecordingSpec, TableType, VariableMap};

/// A registry row: surrogate id plus descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// `metadata.series_id`.
    pub id: i64,
    /// The registered descriptor.
    pub descriptor: RecordingDescriptor,
}

impl Series {
    /// Name factory for this series' tables and views.
    pub fn names(&self) -> SeriesNames {
        SeriesNames::new(self.id, &self.descriptor.source, &self.descriptor.variable)
    }

    /// Table or view to read, validated.
    pub fn data_table(&self) -> Result<Option<Ident>> {
        self.descriptor.data_table.clone().map(Ident::new).transpose()
    }

    /// Error for a series of the wrong type.
    pub(crate) fn ensure_type(&self, expected: TableType) -> Result<()> {
        if self.descriptor.table_type == expected {
            Ok(())
        } else {
            Err(Error::TableTypeMismatch {
                source_name: self.descriptor.source.clone(),
                variable: self.descriptor.variable.clone(),
                expected,
                actual: self.descriptor.table_type,
            })
        }
    }
}

const SELECT_SERIES: &str = "SELECT series_id, source, variable, segment, sampling_interval, description,
        unit, n_neurons, table_type, data_table, n_ids
   FROM metadata";

fn series_from_row(row: &Row<'_>) -> rusqlite::Result<(Series, String)> {
    let table_type: String = row.get(8)?;
    let series = Series {
        id: row.get(0)?,
        descriptor: RecordingDescriptor {
            source: row.get(1)?,
            variable: row.get(2)?,
            segment: row.get(3)?,
            spec: RecordingSpec {
                sampling_interval: row.get(4)?,
                description: row.get(5)?,
                unit: row.get(6)?,
                n_neurons: row.get(7)?,
            },
            // Parsed by the caller so a bad value surfaces as Error::Schema.
            table_type: TableType::Event,
            data_table: row.get(9)?,
            n_ids: row.get::<_, i64>(10)? as usize,
        },
    };
    Ok((series, table_type))
}

fn finish((mut series, table_type): (Series, String)) -> Result<Series> {
    series.descriptor.table_type = table_type.parse()?;
    Ok(series)
}

/// Registry row for a key, if any.
pub fn find(conn: &Connection, source: &str, variable: &str, segment: i64) -> Result<Option<Series>> {
    conn.query_row(
        &format!("{SELECT_SERIES} WHERE source = ? AND variable = ? AND segment = ?"),
        params![source, variable, segment],
        series_from_row,
    )
    .optional()?
    .map(finish)
    .transpose()
}

/// Registry row for a key; unknown keys fail with `Error::UnknownSeries` and
/// a type other than `expected` with `Error::TableTypeMismatch`.
pub fn lookup(
    conn: &Connection,
    source: &str,
    variable: &str,
    segment: i64,
    expected: Option<TableType>,
) -> Result<Series> {
    let series = find(conn, source, variable, segment)?.ok_or_else(|| Error::UnknownSeries {
        source_name: source.to_string(),
        variable: variable.to_string(),
        segment,
    })?;
    if let Some(expected) = expected {
        series.ensure_type(expected)?;
    }
    Ok(series)
}

/// Registers a series, creating its EVENT or SINGLE table on first sight.
///
/// `segment` must already be resolved and known.
pub fn register(
    conn: &Connection,
    source: &str,
    variable: &str,
    segment: i64,
    spec: &RecordingSpec,
    table_type: TableType,
) -> Result<Series> {
    if !spec.sampling_interval.is_finite() {
        return Err(Error::InvalidData(format!(
            "sampling interval {} of {source}.{variable} is not finite",
            spec.sampling_interval
        )));
    }
    if let Some(existing) = find(conn, source, variable, segment)? {
        if let Some(reason) = descriptor_drift(&existing.descriptor, spec, table_type) {
            return Err(Error::MetadataConflict {
                source_name: source.to_string(),
                variable: variable.to_string(),
                segment,
                reason,
            });
        }
        return Ok(existing);
    }

    conn.execute(
        "INSERT INTO metadata (source, variable, segment, sampling_interval, description, unit,
                               n_neurons, table_type)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            source,
            variable,
            segment,
            spec.sampling_interval,
            spec.description,
            spec.unit,
            spec.n_neurons,
            table_type.as_str(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    let names = SeriesNames::new(id, source, variable);

    let data_table = match table_type {
        TableType::Event => {
            let table = names.events()?;
            tables::create_event_table(conn, &table)?;
            Some(table)
        }
        TableType::Single => {
            let table = names.single()?;
            tables::create_single_table(conn, &table)?;
            Some(table)
        }
        TableType::Matrix => None,
    };
    if let Some(table) = &data_table {
        set_data_table(conn, id, Some(table))?;
    }

    info!(
        target: "simstore::catalog",
        source,
        variable,
        segment,
        table_type = table_type.as_str(),
        "series registered"
    );

    lookup(conn, source, variable, segment, Some(table_type))
}

/// First field that differs between a stored descriptor and a new
/// registration, rendered for the error message.
fn descriptor_drift(
    stored: &RecordingDescriptor,
    spec: &RecordingSpec,
    table_type: TableType,
) -> Option<String> {
    let old = &stored.spec;
    if stored.table_type != table_type {
        return Some(format!("table_type: {} != {}", stored.table_type, table_type));
    }
    if old.sampling_interval != spec.sampling_interval {
        return Some(format!(
            "sampling_interval: {} != {}",
            old.sampling_interval, spec.sampling_interval
        ));
    }
    if old.description != spec.description {
        return Some(format!("description: '{}' != '{}'", old.description, spec.description));
    }
    if old.unit != spec.unit {
        return Some(format!("unit: '{}' != '{}'", old.unit, spec.unit));
    }
    if old.n_neurons != spec.n_neurons {
        return Some(format!("n_neurons: {} != {}", old.n_neurons, spec.n_neurons));
    }
    None
}

/// Points a series at the table or view to read (`None` = concatenate shards).
pub fn set_data_table(conn: &Connection, series_id: i64, table: Option<&Ident>) -> Result<()> {
    conn.execute(
        "UPDATE metadata SET data_table = ? WHERE series_id = ?",
        params![table.map(Ident::as_str), series_id],
    )?;
    Ok(())
}

/// Adds `count` to a series' running id total and returns the new total.
pub fn add_ids(conn: &Connection, series_id: i64, count: usize) -> Result<usize> {
    let total: i64 = conn.query_row(
        "UPDATE metadata SET n_ids = n_ids + ? WHERE series_id = ? RETURNING n_ids",
        params![count as i64, series_id],
        |row| row.get(0),
    )?;
    Ok(total as usize)
}

/// Every source with its variables and their table types in one segment.
pub fn variable_map(conn: &Connection, segment: i64) -> Result<VariableMap> {
    let mut stmt = conn.prepare(
        "SELECT source, variable, table_type FROM metadata
          WHERE segment = ? ORDER BY source, variable",
    )?;
    let rows = stmt.query_map([segment], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut map = VariableMap::new();
    for row in rows {
        let (source, variable, table_type) = row?;
        map.entry(source).or_default().push((variable, table_type.parse()?));
    }
    Ok(map)
}

/// Descriptors of every variable of `source` in `segment`, ordered by
/// variable name.
pub fn source_segment_data(
    conn: &Connection,
    source: &str,
    segment: i64,
) -> Result<Vec<RecordingDescriptor>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_SERIES} WHERE source = ? AND segment = ? ORDER BY variable"
    ))?;
    let rows = stmt.query_map(params![source, segment], series_from_row)?;

    let mut descriptors = Vec::new();
    for row in rows {
        descriptors.push(finish(row?)?.descriptor);
    }
    if descriptors.is_empty() {
        return Err(Error::UnknownSeries {
            source_name: source.to_string(),
            variable: String::new(),
            segment,
        });
    }
    Ok(descriptors)
}

// =============================================================================
// Tests
// =============================================================================
