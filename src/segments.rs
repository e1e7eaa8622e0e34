//! # Segment Management
//!
//! A segment is one run/reset cycle of the simulation. Every series is
//! registered per segment, and a segment must exist before anything can be
//! registered under it.
//!
//! ## Lifecycle
//!
//! ```text
//! update_segment(s, t0, t1)   first call      → row inserted
//! update_segment(s, t0, t1)   same end        → nothing happens
//! update_segment(s, t0, t2)   t2 > t1         → end raised, every row written
//!                                               under s deleted, registry kept
//! update_segment(s, t0, t2)   t2 < t1         → Error::SegmentRegression
//! update_segment(s, tX, ..)   tX != t0        → Error::SegmentStartMismatch
//! ```
//!
//! Raising the end time means the run was re-executed for longer, so data
//! written for the shorter run is stale.
//!
//! ## Relative Segment Ids
//!
//! Read and write calls accept negative segment ids, resolved as
//! `current_segment() + 1 + segment`: `-1` is the current (highest) segment,
//! `-2` the one before it.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ident::Ident;
use crate::types::{SegmentSpan, TableType};

/// What [`update_segment`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentUpdate {
    /// The segment did not exist and was created.
    Created,
    /// Start and end matched the stored values.
    Unchanged,
    /// The end timestamp was raised and these tables were emptied.
    Extended {
        /// Tables whose rows were deleted.
        cleared: Vec<String>,
    },
}

/// Creates or extends a segment. Run inside a transaction.
pub fn update_segment(
    conn: &Connection,
    segment: i64,
    start_timestamp: f64,
    end_timestamp: f64,
) -> Result<SegmentUpdate> {
    if segment < 0 {
        return Err(Error::InvalidSegment(segment));
    }
    if !start_timestamp.is_finite() || !end_timestamp.is_finite() {
        return Err(Error::InvalidData(format!(
            "segment {segment} span [{start_timestamp}, {end_timestamp}] is not finite"
        )));
    }
    if end_timestamp < start_timestamp {
        return Err(Error::InvalidData(format!(
            "segment {segment} ends at {end_timestamp}, before its start {start_timestamp}"
        )));
    }

    let Some(span) = segment_span(conn, segment)? else {
        conn.execute(
            "INSERT INTO segment_info (segment, start_timestamp, end_timestamp) VALUES (?, ?, ?)",
            params![segment, start_timestamp, end_timestamp],
        )?;
        info!(target: "simstore::segments", segment, start_timestamp, end_timestamp, "segment created");
        return Ok(SegmentUpdate::Created);
    };

    if span.start_timestamp != start_timestamp {
        return Err(Error::SegmentStartMismatch {
            segment,
            recorded: span.start_timestamp,
            requested: start_timestamp,
        });
    }
    if end_timestamp < span.end_timestamp {
        return Err(Error::SegmentRegression {
            segment,
            recorded: span.end_timestamp,
            requested: end_timestamp,
        });
    }
    if end_timestamp == span.end_timestamp {
        return Ok(SegmentUpdate::Unchanged);
    }

    conn.execute(
        "UPDATE segment_info SET end_timestamp = ? WHERE segment = ?",
        params![end_timestamp, segment],
    )?;
    let cleared = clear_segment_rows(conn, segment)?;

    info!(
        target: "simstore::segments",
        segment,
        previous_end = span.end_timestamp,
        end_timestamp,
        tables = cleared.len(),
        "segment extended, stale rows cleared"
    );
    Ok(SegmentUpdate::Extended { cleared })
}

/// Stored span of one segment.
pub fn segment_span(conn: &Connection, segment: i64) -> Result<Option<SegmentSpan>> {
    Ok(conn
        .query_row(
            "SELECT start_timestamp, end_timestamp FROM segment_info WHERE segment = ?",
            [segment],
            |row| {
                Ok(SegmentSpan {
                    start_timestamp: row.get(0)?,
                    end_timestamp: row.get(1)?,
                })
            },
        )
        .optional()?)
}

/// All segments, ordered by id.
pub fn get_segments(conn: &Connection) -> Result<BTreeMap<i64, SegmentSpan>> {
    let mut stmt = conn.prepare(
        "SELECT segment, start_timestamp, end_timestamp FROM segment_info ORDER BY segment",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            SegmentSpan {
                start_timestamp: row.get(1)?,
                end_timestamp: row.get(2)?,
            },
        ))
    })?;

    let mut segments = BTreeMap::new();
    for row in rows {
        let (segment, span) = row?;
        segments.insert(segment, span);
    }
    Ok(segments)
}

/// Highest known segment id, `None` on an empty store.
pub fn current_segment(conn: &Connection) -> Result<Option<i64>> {
    Ok(conn.query_row("SELECT MAX(segment) FROM segment_info", [], |row| row.get(0))?)
}

/// Resolves a possibly negative segment argument to a known segment id.
pub fn resolve_segment(conn: &Connection, segment: i64) -> Result<i64> {
    let resolved = if segment < 0 {
        let current = current_segment(conn)?.ok_or_else(|| Error::UnknownSegment {
            requested: segment,
            reason: "no segments exist yet".to_string(),
        })?;
        // segment < 0, so segment + 1 <= 0 cannot overflow
        current.checked_add(segment + 1)
    } else {
        Some(segment)
    };

    let Some(resolved) = resolved else {
        return Err(Error::UnknownSegment {
            requested: segment,
            reason: "offset from the current segment is out of range".to_string(),
        });
    };
    if resolved < 0 || segment_span(conn, resolved)?.is_none() {
        return Err(Error::UnknownSegment {
            requested: segment,
            reason: format!("resolved to {resolved}, which was never created"),
        });
    }
    Ok(resolved)
}

/// Every data table written under `segment`: EVENT and SINGLE tables plus
/// shard raw tables and matrix index tables.
pub fn segment_tables(conn: &Connection, segment: i64) -> Result<Vec<Ident>> {
    let mut stmt = conn.prepare(
        "SELECT data_table FROM metadata
          WHERE segment = ?1 AND table_type IN (?2, ?3) AND data_table IS NOT NULL
         UNION
         SELECT l.raw_table FROM local_matrix_metadata l
           JOIN metadata m ON m.series_id = l.series_id
          WHERE m.segment = ?1
         UNION
         SELECT l.index_table FROM local_matrix_metadata l
           JOIN metadata m ON m.series_id = l.series_id
          WHERE m.segment = ?1
         ORDER BY 1",
    )?;
    let names = stmt
        .query_map(
            params![segment, TableType::Event.as_str(), TableType::Single.as_str()],
            |row| row.get::<_, String>(0),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    names.into_iter().map(Ident::new).collect()
}

/// Deletes every row of every table written under `segment`.
fn clear_segment_rows(conn: &Connection, segment: i64) -> Result<Vec<String>> {
    let tables = segment_tables(conn, segment)?;
    let mut cleared = Vec::with_capacity(tables.len());
    for table in tables {
        let rows = conn.execute(&format!("DELETE FROM {}", table.quoted()), [])?;
        debug!(target: "simstore::segments", segment, table = %table, rows, "table cleared");
        cleared.push(table.as_str().to_string());
    }
    Ok(cleared)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Database;

    #[test]
    fn test_create_and_list() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        assert_eq!(current_segment(conn).unwrap(), None);
        assert_eq!(update_segment(conn, 0, 0.0, 100.0).unwrap(), SegmentUpdate::Created);
        assert_eq!(update_segment(conn, 1, 100.0, 250.0).unwrap(), SegmentUpdate::Created);

        let segments = get_segments(conn).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[&1].end_timestamp, 250.0);
        assert_eq!(current_segment(conn).unwrap(), Some(1));
    }

    #[test]
    fn test_same_call_is_unchanged() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        update_segment(conn, 0, 0.0, 100.0).unwrap();
        assert_eq!(update_segment(conn, 0, 0.0, 100.0).unwrap(), SegmentUpdate::Unchanged);
    }

    #[test]
    fn test_regression_and_start_mismatch() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        update_segment(conn, 0, 0.0, 100.0).unwrap();

        assert!(matches!(
            update_segment(conn, 0, 0.0, 50.0),
            Err(Error::SegmentRegression { segment: 0, .. })
        ));
        assert!(matches!(
            update_segment(conn, 0, 5.0, 200.0),
            Err(Error::SegmentStartMismatch { segment: 0, .. })
        ));
        assert!(matches!(update_segment(conn, -3, 0.0, 1.0), Err(Error::InvalidSegment(-3))));
    }

    #[test]
    fn test_resolve_negative_segments() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        assert!(matches!(resolve_segment(conn, -1), Err(Error::UnknownSegment { .. })));

        update_segment(conn, 0, 0.0, 10.0).unwrap();
        update_segment(conn, 1, 10.0, 20.0).unwrap();

        assert_eq!(resolve_segment(conn, -1).unwrap(), 1);
        assert_eq!(resolve_segment(conn, -2).unwrap(), 0);
        assert_eq!(resolve_segment(conn, 0).unwrap(), 0);
        assert!(matches!(resolve_segment(conn, -3), Err(Error::UnknownSegment { .. })));
        assert!(matches!(resolve_segment(conn, 7), Err(Error::UnknownSegment { .. })));
    }

    #[test]
    fn test_resolve_relative_to_highest_possible_segment() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        update_segment(conn, i64::MAX, 0.0, 1.0).unwrap();

        assert_eq!(resolve_segment(conn, -1).unwrap(), i64::MAX);
        assert!(matches!(
            resolve_segment(conn, -2),
            Err(Error::UnknownSegment { requested: -2, .. })
        ));
        assert!(matches!(
            resolve_segment(conn, i64::MIN),
            Err(Error::UnknownSegment { .. })
        ));
    }

    #[test]
    fn test_non_finite_span_rejected() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();

        assert!(matches!(update_segment(conn, 0, f64::NAN, f64::NAN), Err(Error::InvalidData(_))));
        assert!(matches!(update_segment(conn, 0, 0.0, f64::INFINITY), Err(Error::InvalidData(_))));
        assert_eq!(current_segment(conn).unwrap(), None);
    }

    #[test]
    fn test_extension_clears_registered_tables() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        update_segment(conn, 0, 0.0, 10.0).unwrap();
        conn.execute_batch(
            "CREATE TABLE rec1_p_spikes_events (timestamp FLOAT, id INTEGER);
             INSERT INTO rec1_p_spikes_events VALUES (1.0, 3), (2.0, 4);
             INSERT INTO metadata (series_id, source, variable, segment, sampling_interval,
                                   description, unit, n_neurons, table_type, data_table)
             VALUES (1, 'p', 'spikes', 0, 1.0, 'spikes', '', 10, 'EVENT', 'rec1_p_spikes_events');",
        )
        .unwrap();

        let update = update_segment(conn, 0, 0.0, 20.0).unwrap();
        assert_eq!(
            update,
            SegmentUpdate::Extended {
                cleared: vec!["rec1_p_spikes_events".to_string()]
            }
        );

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM rec1_p_spikes_events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
        let registered: i64 = conn
            .query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))
            .unwrap();
        assert_eq!(registered, 1);
    }
}
