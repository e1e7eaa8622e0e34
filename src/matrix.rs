//! # Matrix Shard Coordinator
//!
//! Matrix series (membrane voltage, synaptic currents) have one column per
//! neuron id. Populations can be larger than the number of columns SQLite
//! allows in one table, and ids arrive per placement unit, so a series is
//! stored as shards.
//!
//! ## Physical Layout
//!
//! ```text
//!                      ┌────────────────────┐
//!                      │ <base>_index       │  every timestamp seen by any
//!                      │ timestamp (PK)     │  shard of the series
//!                      └─────────┬──────────┘
//!               LEFT JOIN USING  │  (timestamp)
//!          ┌─────────────────────┼─────────────────────┐
//!          ▼                     ▼                     ▼
//!  ┌───────────────┐     ┌───────────────┐     ┌───────────────┐
//!  │ <base>_raw_0  │     │ <base>_raw_64 │     │ <base>_raw_128│   raw tables
//!  │ ts │ 0 │ … │63│     │ ts │64 │ …│127│     │ ts │128│ … │  │
//!  └───────────────┘     └───────────────┘     └───────────────┘
//!   <base>_shard_0        <base>_shard_64       <base>_shard_128   shard views
//!          └──────────── NATURAL JOIN ─────────────────┘
//!                               │
//!                        <base>_matrix                            combined view
//! ```
//!
//! ## Choosing What `data_table` Points At
//!
//! After every new shard the series' read strategy is recomputed:
//!
//! | Shards | Combined ids | `data_table` | [`MatrixReadPlan`] |
//! |--------|--------------|--------------|--------------------|
//! | 0 | 0 | NULL | `Empty` |
//! | 1 | any | the raw table | `SingleTable` |
//! | ≥2, ≤ [`MAX_JOINED_SHARDS`] | ≤ ceiling | `<base>_matrix` | `JoinedViews` |
//! | otherwise | | NULL | `ConcatenateShards` |
//!
//! Exceeding the ceiling is not an error: readers concatenate the shard views
//! on the id axis. The timestamp axes agree by construction because every
//! shard view is driven by the shared index table.
//!
//! ## Shard Identity
//!
//! A shard is keyed by (series, first id). Its ordered id list is fixed at
//! creation and checked on every later insert with the same first id; ids may
//! not appear in two shards of one series.

use rusqlite::{params, params_from_iter, Connection};
use tracing::{debug, info};

use crate::catalog::{self, Series};
use crate::directory::{self, ColumnDirectory};
use crate::error::{Error, Result};
use crate::ident::{id_columns, Ident};
use crate::pipeline::Batch;

/// Most shard views joined into one combined view.
///
/// Each shard view is itself a two-table join and SQLite flattens views into
/// a single join of at most 64 tables.
pub const MAX_JOINED_SHARDS: usize = 32;

// =============================================================================
// Shards and Read Plans
// =============================================================================

/// One shard of a matrix series.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardInfo {
    /// Key of the shard within its series.
    pub first_id: u32,
    /// Table holding this shard's samples.
    pub raw_table: Ident,
    /// Timestamp index shared by the series.
    pub index_table: Ident,
    /// `index LEFT JOIN raw` view.
    pub view: Ident,
    /// Ordered ids, one column each.
    pub ids: Vec<u32>,
}

/// How a matrix series is read back.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixReadPlan {
    /// Registered but never written.
    Empty,
    /// One shard: read its raw table directly.
    SingleTable(ShardInfo),
    /// Several shards joined into one view.
    JoinedViews {
        /// The combined view.
        view: Ident,
        /// Shards in first-id order (column order of the view).
        shards: Vec<ShardInfo>,
    },
    /// Too many ids or shards for one view: read every shard view and
    /// concatenate on the id axis.
    ConcatenateShards(Vec<ShardInfo>),
}

impl MatrixReadPlan {
    /// Reconstructs the plan from the registry.
    pub fn load(conn: &Connection, series: &Series) -> Result<Self> {
        let mut shards = list_shards(conn, series.id)?;
        let plan = match series.data_table()? {
            None if shards.is_empty() => Self::Empty,
            None => Self::ConcatenateShards(shards),
            Some(table) if shards.len() == 1 && table == shards[0].raw_table => {
                Self::SingleTable(shards.remove(0))
            }
            Some(view) => Self::JoinedViews { view, shards },
        };
        Ok(plan)
    }

    /// Shards covered by the plan, in first-id order.
    pub fn shards(&self) -> &[ShardInfo] {
        match self {
            Self::Empty => &[],
            Self::SingleTable(shard) => std::slice::from_ref(shard),
            Self::JoinedViews { shards, .. } | Self::ConcatenateShards(shards) => shards,
        }
    }

    /// Ids in read order.
    pub fn ids(&self) -> Vec<u32> {
        self.shards().iter().flat_map(|s| s.ids.iter().copied()).collect()
    }
}

/// All shards of a series with their column directories, by first id.
pub fn list_shards(conn: &Connection, series_id: i64) -> Result<Vec<ShardInfo>> {
    let mut stmt = conn.prepare_cached(
        "SELECT first_id, raw_table, index_table, view_name FROM local_matrix_metadata
          WHERE series_id = ? ORDER BY first_id",
    )?;
    let rows = stmt
        .query_map([series_id], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(first_id, raw, index, view)| {
            let raw_table = Ident::new(raw)?;
            let ids = directory::load(conn, &raw_table)?;
            Ok(ShardInfo {
                first_id,
                raw_table,
                index_table: Ident::new(index)?,
                view: Ident::new(view)?,
                ids,
            })
        })
        .collect()
}

// =============================================================================
// Inserts
// =============================================================================

/// Writes a normalized batch for `ids` into a matrix series.
///
/// Calls wider than `max_columns` are split into contiguous column blocks,
/// each stored as (or appended to) its own shard. Returns the number of rows
/// written per block.
pub fn insert(
    conn: &Connection,
    directory: &mut ColumnDirectory,
    series: &Series,
    ids: &[u32],
    batch: &Batch,
    max_columns: usize,
) -> Result<usize> {
    if ids.is_empty() {
        return Err(Error::InvalidData("matrix insert needs at least one id".to_string()));
    }
    if batch.is_empty() {
        return Ok(0);
    }

    if ids.len() <= max_columns {
        insert_block(conn, directory, series, ids, batch, max_columns)?;
        return Ok(batch.len());
    }

    debug!(
        target: "simstore::matrix",
        n_ids = ids.len(),
        max_columns,
        "splitting matrix insert into column blocks"
    );
    for (block, block_ids) in ids.chunks(max_columns).enumerate() {
        let rows = batch.column_block(block * max_columns, block_ids.len());
        insert_block(conn, directory, series, block_ids, &rows, max_columns)?;
    }
    Ok(batch.len())
}

/// Routes one column block to its shard, creating the shard on first sight.
fn insert_block(
    conn: &Connection,
    directory: &mut ColumnDirectory,
    series: &Series,
    ids: &[u32],
    batch: &Batch,
    max_columns: usize,
) -> Result<()> {
    let names = series.names();
    let first_id = ids[0];
    let raw_table = names.raw(first_id)?;
    let index_table = names.index()?;

    let existing = directory.columns(conn, &raw_table)?;
    if existing.is_empty() {
        create_shard(conn, directory, series, ids)?;
        rebuild_global_view(conn, series, ids.len(), max_columns)?;
    } else if existing != ids {
        let position = existing
            .iter()
            .zip(ids)
            .position(|(stored, supplied)| stored != supplied)
            .unwrap_or_else(|| existing.len().min(ids.len()));
        return Err(Error::ShardIdMismatch {
            source_name: series.descriptor.source.clone(),
            variable: series.descriptor.variable.clone(),
            segment: series.descriptor.segment,
            first_id,
            expected: existing.len(),
            actual: ids.len(),
            position,
            stored: existing.get(position).copied(),
            supplied: ids.get(position).copied(),
        });
    }

    let mut index_insert = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {} (timestamp) VALUES (?)",
        index_table.quoted()
    ))?;
    let placeholders = vec!["?"; ids.len() + 1].join(", ");
    let mut raw_insert = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {} (timestamp, {}) VALUES ({placeholders})",
        raw_table.quoted(),
        id_columns(ids)
    ))?;

    for (timestamp, row) in batch.timestamps.iter().zip(&batch.values) {
        index_insert.execute([timestamp])?;
        raw_insert.execute(params_from_iter(std::iter::once(timestamp).chain(row.iter())))?;
    }

    debug!(
        target: "simstore::matrix",
        table = %raw_table,
        rows = batch.len(),
        columns = ids.len(),
        "matrix rows written"
    );
    Ok(())
}

/// Creates raw table, shared index, shard view and registry rows.
fn create_shard(
    conn: &Connection,
    directory: &mut ColumnDirectory,
    series: &Series,
    ids: &[u32],
) -> Result<()> {
    let names = series.names();
    let first_id = ids[0];

    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(Error::InvalidData(format!(
            "id {} appears twice in one matrix insert",
            pair[0]
        )));
    }
    for shard in list_shards(conn, series.id)? {
        if let Some(id) = shard.ids.iter().find(|id| sorted.binary_search(id).is_ok()) {
            return Err(Error::InvalidData(format!(
                "id {id} is already stored in the shard starting at id {}",
                shard.first_id
            )));
        }
    }

    let shard = ShardInfo {
        first_id,
        raw_table: names.raw(first_id)?,
        index_table: names.index()?,
        view: names.shard_view(first_id)?,
        ids: ids.to_vec(),
    };

    let columns: String = ids
        .iter()
        .map(|id| format!(", \"{id}\" INTEGER"))
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {index} (timestamp FLOAT PRIMARY KEY);
         CREATE TABLE {raw} (timestamp FLOAT PRIMARY KEY{columns});
         CREATE VIEW {view} AS SELECT * FROM {index} LEFT JOIN {raw} USING (timestamp);",
        index = shard.index_table.quoted(),
        raw = shard.raw_table.quoted(),
        view = shard.view.quoted(),
    ))?;

    conn.execute(
        "INSERT INTO local_matrix_metadata
                (series_id, first_id, raw_table, index_table, view_name, n_ids)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            series.id,
            first_id,
            shard.raw_table.as_str(),
            shard.index_table.as_str(),
            shard.view.as_str(),
            ids.len() as i64,
        ],
    )?;
    directory.append(conn, &shard.raw_table, ids)?;

    info!(
        target: "simstore::matrix",
        source = %series.descriptor.source,
        variable = %series.descriptor.variable,
        segment = series.descriptor.segment,
        first_id,
        n_ids = ids.len(),
        "shard created"
    );
    Ok(())
}

/// Adds a new shard's ids to the running total and recomputes `data_table`
/// and the combined view.
fn rebuild_global_view(
    conn: &Connection,
    series: &Series,
    new_ids: usize,
    max_columns: usize,
) -> Result<()> {
    let combined = series.names().matrix_view()?;
    let mut shards = list_shards(conn, series.id)?;
    let n_ids = catalog::add_ids(conn, series.id, new_ids)?;

    conn.execute_batch(&format!("DROP VIEW IF EXISTS {}", combined.quoted()))?;

    let plan = if shards.len() == 1 {
        let shard = shards.remove(0);
        catalog::set_data_table(conn, series.id, Some(&shard.raw_table))?;
        MatrixReadPlan::SingleTable(shard)
    } else if n_ids > max_columns || shards.len() > MAX_JOINED_SHARDS {
        catalog::set_data_table(conn, series.id, None)?;
        info!(
            target: "simstore::matrix",
            source = %series.descriptor.source,
            variable = %series.descriptor.variable,
            n_ids,
            shards = shards.len(),
            "series exceeds one view, reads will concatenate shards"
        );
        MatrixReadPlan::ConcatenateShards(shards)
    } else {
        let joined = shards
            .iter()
            .map(|s| s.view.quoted())
            .collect::<Vec<_>>()
            .join(" NATURAL JOIN ");
        conn.execute_batch(&format!(
            "CREATE VIEW {} AS SELECT * FROM {joined}",
            combined.quoted()
        ))?;
        catalog::set_data_table(conn, series.id, Some(&combined))?;
        MatrixReadPlan::JoinedViews {
            view: combined,
            shards,
        }
    };

    debug!(target: "simstore::matrix", series_id = series.id, n_ids, ?plan, "global view rebuilt");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
