//! # Event and Single Tables
//!
//! The two simple physical shapes.
//!
//! ## EVENT
//!
//! ```text
//! timestamp | id
//! ----------+----
//!     1.0   |  3
//!     1.0   |  3     ← duplicates are valid (same id, distinct sources)
//!     2.5   |  7
//! ```
//!
//! Append-only: no key, no dedup, no update path.
//!
//! ## SINGLE
//!
//! ```text
//! timestamp (PK) | "0"  | "5"        ← one column per id, added on first sight
//! ---------------+------+------
//!      0.0       | 1.0  | NULL
//!      1.0       | 2.0  | 7.0
//! ```
//!
//! Values arrive one id at a time. Unknown ids widen the table with
//! `ALTER TABLE ADD COLUMN`; each value is then written with an `UPDATE` on
//! its timestamp row, so a repeated (timestamp, id) overwrites the cell.

use rusqlite::{params, Connection};
use tracing::debug;

use crate::directory::ColumnDirectory;
use crate::error::{Error, Result};
use crate::ident::{id_column, Ident};

// =============================================================================
// EVENT
// =============================================================================

/// Creates an EVENT table.
pub fn create_event_table(conn: &Connection, table: &Ident) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (timestamp FLOAT NOT NULL, id INTEGER NOT NULL)",
        table.quoted()
    ))?;
    Ok(())
}

/// Appends `(timestamp, id)` pairs. Returns the number of rows written.
pub fn insert_events(conn: &Connection, table: &Ident, events: &[(f64, u32)]) -> Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} (timestamp, id) VALUES (?, ?)",
        table.quoted()
    ))?;
    for (timestamp, id) in events {
        stmt.execute(params![timestamp, id])?;
    }
    debug!(target: "simstore::tables", table = %table, rows = events.len(), "events appended");
    Ok(events.len())
}

// =============================================================================
// SINGLE
// =============================================================================

/// Creates a SINGLE table with only its timestamp column.
pub fn create_single_table(conn: &Connection, table: &Ident) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (timestamp FLOAT PRIMARY KEY)",
        table.quoted()
    ))?;
    Ok(())
}

/// Writes one id's values into a SINGLE table, widening it if the id is new.
///
/// `max_columns` bounds the number of id columns the table may grow to.
pub fn insert_single(
    conn: &Connection,
    directory: &mut ColumnDirectory,
    table: &Ident,
    id: u32,
    values: &[(f64, f64)],
    max_columns: usize,
) -> Result<usize> {
    let known = directory.columns(conn, table)?;
    if !known.contains(&id) {
        if known.len() >= max_columns {
            return Err(Error::InvalidData(format!(
                "single table {table} already holds {max_columns} ids; cannot add id {id}"
            )));
        }
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} INTEGER",
            table.quoted(),
            id_column(id)
        ))?;
        directory.append(conn, table, &[id])?;
        debug!(target: "simstore::tables", table = %table, id, "single column added");
    }

    let mut insert = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {} (timestamp) VALUES (?)",
        table.quoted()
    ))?;
    let mut update = conn.prepare(&format!(
        "UPDATE {} SET {} = ? WHERE timestamp = ?",
        table.quoted(),
        id_column(id)
    ))?;
    for (timestamp, value) in values {
        insert.execute([timestamp])?;
        update.execute(params![value, timestamp])?;
    }
    Ok(values.len())
}

// =============================================================================
// Tests
// =============================================================================
