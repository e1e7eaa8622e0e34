//! # Query Engine
//!
//! Reads recorded series back into in-memory arrays. Every read goes through
//! the catalog first: the registry says which shape a series has and which
//! table or view holds it, and the column directory says which id each
//! column carries.
//!
//! ## Matrix Reads
//!
//! ```text
//! MatrixReadPlan::SingleTable      SELECT timestamp, ids FROM raw
//! MatrixReadPlan::JoinedViews      SELECT timestamp, ids FROM combined view
//! MatrixReadPlan::ConcatenateShards
//!     for shard in first-id order: SELECT timestamp, shard ids FROM shard view
//!     └── append columns; timestamp axes must agree
//! ```
//!
//! Rows are always ordered by timestamp. A NULL cell (an id with no sample at
//! a timestamp some other id was sampled at) reads as `NaN`.

use rusqlite::Connection;
use tracing::debug;

use crate::catalog::{self, Series};
use crate::directory;
use crate::error::Result;
use crate::ident::{id_columns, Ident};
use crate::matrix::MatrixReadPlan;
use crate::types::{
    EventsData, MatrixData, RecordedData, RecordedEvent, SingleData, TableType,
};

/// Reads any series, dispatching on its registered table type.
pub fn read_data(conn: &Connection, source: &str, variable: &str, segment: i64) -> Result<RecordedData> {
    let series = catalog::lookup(conn, source, variable, segment, None)?;
    Ok(match series.descriptor.table_type {
        TableType::Matrix => RecordedData::Matrix(read_matrix(conn, &series)?),
        TableType::Event => RecordedData::Events(read_events(conn, &series)?),
        TableType::Single => RecordedData::Single(read_single(conn, &series)?),
    })
}

/// Reads a matrix series according to its [`MatrixReadPlan`].
pub fn read_matrix(conn: &Connection, series: &Series) -> Result<MatrixData> {
    series.ensure_type(TableType::Matrix)?;

    let plan = MatrixReadPlan::load(conn, series)?;
    let data = match &plan {
        MatrixReadPlan::Empty => MatrixData::default(),
        MatrixReadPlan::SingleTable(shard) => select_columns(conn, &shard.raw_table, plan.ids())?,
        MatrixReadPlan::JoinedViews { view, .. } => select_columns(conn, view, plan.ids())?,
        MatrixReadPlan::ConcatenateShards(shards) => {
            let mut data = MatrixData::default();
            for shard in shards {
                data.extend_columns(select_columns(conn, &shard.view, shard.ids.clone())?)?;
            }
            data
        }
    };

    debug!(
        target: "simstore::reader",
        source = %series.descriptor.source,
        variable = %series.descriptor.variable,
        rows = data.timestamps.len(),
        columns = data.ids.len(),
        "matrix read"
    );
    Ok(data)
}

/// Reads an EVENT series in insertion order.
pub fn read_events(conn: &Connection, series: &Series) -> Result<EventsData> {
    series.ensure_type(TableType::Event)?;
    let Some(table) = series.data_table()? else {
        return Ok(EventsData::default());
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT timestamp, id FROM {} ORDER BY rowid",
        table.quoted()
    ))?;
    let events = stmt
        .query_map([], |row| {
            Ok(RecordedEvent {
                timestamp: row.get(0)?,
                id: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(EventsData { events })
}

/// Reads a SINGLE series: ids in first-seen order, rows by timestamp.
pub fn read_single(conn: &Connection, series: &Series) -> Result<SingleData> {
    series.ensure_type(TableType::Single)?;
    let Some(table) = series.data_table()? else {
        return Ok(SingleData::default());
    };
    let ids = directory::load(conn, &table)?;
    select_columns(conn, &table, ids)
}

/// `SELECT timestamp, <ids> FROM table ORDER BY timestamp`.
fn select_columns(conn: &Connection, table: &Ident, ids: Vec<u32>) -> Result<MatrixData> {
    let sql = if ids.is_empty() {
        format!("SELECT timestamp FROM {} ORDER BY timestamp", table.quoted())
    } else {
        format!(
            "SELECT timestamp, {} FROM {} ORDER BY timestamp",
            id_columns(&ids),
            table.quoted()
        )
    };

    let width = ids.len();
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let mut timestamps = Vec::new();
    let mut data = Vec::new();
    while let Some(row) = rows.next()? {
        timestamps.push(row.get::<_, f64>(0)?);
        let mut values = Vec::with_capacity(width);
        for column in 1..=width {
            values.push(row.get::<_, Option<f64>>(column)?.unwrap_or(f64::NAN));
        }
        data.push(values);
    }

    Ok(MatrixData {
        ids,
        timestamps,
        data,
    })
}

// =============================================================================
// Tests
// =============================================================================
