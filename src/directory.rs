//! # Column Directory
//!
//! Ordered id list of every table that has one column per neuron id (matrix
//! shard raw tables and single tables). The `column_directory` registry table
//! is the source of truth; [`ColumnDirectory`] caches it for the writer.
//!
//! ## Invariant: Memory Lags Disk
//!
//! Entries are cached as they are written inside a transaction. If that
//! transaction rolls back the store calls [`ColumnDirectory::clear`], so the
//! cache can be behind the file but never ahead of it.

use std::collections::HashMap;

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::ident::Ident;

/// Reads a table's ordered ids straight from the registry.
pub fn load(conn: &Connection, table: &Ident) -> Result<Vec<u32>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM column_directory WHERE data_table = ? ORDER BY position",
    )?;
    let ids = stmt
        .query_map([table.as_str()], |row| row.get::<_, u32>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Write-side cache of the column directory.
#[derive(Debug, Default)]
pub struct ColumnDirectory {
    tables: HashMap<String, Vec<u32>>,
}

impl ColumnDirectory {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of `table`, loading them on a cache miss.
    pub fn columns(&mut self, conn: &Connection, table: &Ident) -> Result<&[u32]> {
        if !self.tables.contains_key(table.as_str()) {
            let ids = load(conn, table)?;
            self.tables.insert(table.as_str().to_string(), ids);
        }
        Ok(self
            .tables
            .get(table.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Records `ids` as the next columns of `table`.
    ///
    /// The caller has already added the physical columns.
    pub fn append(&mut self, conn: &Connection, table: &Ident, ids: &[u32]) -> Result<()> {
        let start = self.columns(conn, table)?.len();

        let mut stmt = conn.prepare_cached(
            "INSERT INTO column_directory (data_table, position, id) VALUES (?, ?, ?)",
        )?;
        for (offset, id) in ids.iter().enumerate() {
            stmt.execute(params![table.as_str(), (start + offset) as i64, *id])?;
        }

        self.tables
            .entry(table.as_str().to_string())
            .or_default()
            .extend_from_slice(ids);
        Ok(())
    }

    /// Drops every cached entry.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
