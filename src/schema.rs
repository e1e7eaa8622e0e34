//! # SQLite Schema for SimStore
//!
//! This module owns the fixed part of the schema (the registry tables) and
//! the [`Database`] wrapper that applies it. Data tables are created later,
//! one set per series, by the catalog, the table builders and the shard
//! coordinator.
//!
//! ## Registry Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Registry Tables                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  segment_info          metadata                  local_matrix_metadata  │
//! │  ┌──────────────┐      ┌──────────────────┐      ┌──────────────────┐   │
//! │  │ segment (PK) │◄─────│ segment          │      │ series_id (FK) ──┼─┐ │
//! │  │ start_ts     │      │ series_id (PK)   │◄─────┼──────────────────┘ │ │
//! │  │ end_ts       │      │ source, variable │      │ first_id         │   │
//! │  └──────────────┘      │ descriptor cols  │      │ raw/index/view   │   │
//! │                        │ data_table NULL  │      │ n_ids            │   │
//! │                        │ n_ids            │      └──────────────────┘   │
//! │                        └──────────────────┘                             │
//! │                                                                         │
//! │  column_directory: (data_table, position) → id                          │
//! │  store_info:       key → value (schema version)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why a Column Directory?
//!
//! Matrix shards and single tables have one column per neuron id. Instead of
//! reading column names back through `PRAGMA table_info`, the ordered id list
//! of every such table is written to `column_directory` in the same
//! transaction that creates or widens the table.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::ident::Ident;
use crate::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// Current schema version. Increment when making breaking schema changes.
const SCHEMA_VERSION: i32 = 1;

// =============================================================================
// DDL Statements
// =============================================================================

/// Key-value facts about the file itself.
const CREATE_STORE_INFO: &str = r#"
CREATE TABLE IF NOT EXISTS store_info (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// One row per run/reset cycle.
///
/// Timestamps are simulation time, not wall-clock time.
const CREATE_SEGMENT_INFO: &str = r#"
CREATE TABLE IF NOT EXISTS segment_info (
    segment         INTEGER PRIMARY KEY,
    start_timestamp FLOAT NOT NULL,
    end_timestamp   FLOAT NOT NULL
)
"#;

/// The series registry.
///
/// # Columns
///
/// - `series_id`: surrogate key; also the prefix of every data table name
/// - `source`, `variable`, `segment`: the logical key (unique)
/// - `sampling_interval`, `description`, `unit`, `n_neurons`, `table_type`:
///   the registered descriptor, immutable after the first registration
/// - `data_table`: table or view to read, NULL while a matrix series has no
///   shards or once its shards can only be read by concatenation
/// - `n_ids`: running id total over all shards of a matrix series
const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    series_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    source            TEXT NOT NULL,
    variable          TEXT NOT NULL,
    segment           INTEGER NOT NULL REFERENCES segment_info(segment),
    sampling_interval FLOAT NOT NULL,
    description       TEXT NOT NULL,
    unit              TEXT NOT NULL,
    n_neurons         INTEGER NOT NULL,
    table_type        TEXT NOT NULL,
    data_table        TEXT,
    n_ids             INTEGER NOT NULL DEFAULT 0,
    UNIQUE (source, variable, segment)
)
"#;

/// One row per matrix shard.
///
/// The logical shard key is (source, variable, segment, first_id); the
/// first three collapse into `series_id`.
const CREATE_LOCAL_MATRIX_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS local_matrix_metadata (
    series_id   INTEGER NOT NULL REFERENCES metadata(series_id),
    first_id    INTEGER NOT NULL,
    raw_table   TEXT NOT NULL,
    index_table TEXT NOT NULL,
    view_name   TEXT NOT NULL,
    n_ids       INTEGER NOT NULL,
    PRIMARY KEY (series_id, first_id)
)
"#;

/// Ordered id columns of every shard raw table and single table.
const CREATE_COLUMN_DIRECTORY: &str = r#"
CREATE TABLE IF NOT EXISTS column_directory (
    data_table TEXT NOT NULL,
    position   INTEGER NOT NULL,
    id         INTEGER NOT NULL,
    PRIMARY KEY (data_table, position)
)
"#;

/// Registry tables, in dependency order (referenced tables first).
pub(crate) const REGISTRY_TABLES: [&str; 5] = [
    "store_info",
    "segment_info",
    "metadata",
    "local_matrix_metadata",
    "column_directory",
];

/// Runs the bootstrap DDL. Every statement is idempotent.
fn apply_ddl(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_STORE_INFO)?;
    conn.execute_batch(CREATE_SEGMENT_INFO)?;
    conn.execute_batch(CREATE_METADATA)?;
    conn.execute_batch(CREATE_LOCAL_MATRIX_METADATA)?;
    conn.execute_batch(CREATE_COLUMN_DIRECTORY)?;
    Ok(())
}

// =============================================================================
// Database Wrapper
// =============================================================================

/// A SQLite connection with the SimStore registry applied.
///
/// # Ownership
///
/// `Database` owns its `Connection`; dropping it closes the file. Only one
/// `Database` should write a given file at a time.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens (creating if needed) a database file with default settings.
    ///
    /// ```rust,no_run
    /// use simstore::Database;
    ///
    /// let db = Database::open("recordings.sqlite3")?;
    /// # Ok::<(), simstore::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(&StoreConfig::default().with_path(path.as_ref()))
    }

    /// Creates an unshared in-memory database.
    ///
    /// ```rust
    /// use simstore::Database;
    ///
    /// let db = Database::open_in_memory()?;
    /// # Ok::<(), simstore::Error>(())
    /// ```
    pub fn open_in_memory() -> Result<Self> {
        Self::open_with_config(&StoreConfig::default())
    }

    /// Opens the database described by `config`.
    pub fn open_with_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let conn = match &config.path {
            Some(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
            None => Connection::open_in_memory()?,
        };

        let mut db = Self {
            conn,
            path: config.path.clone(),
        };
        db.initialize(config)?;

        info!(
            target: "simstore::schema",
            path = ?db.path,
            journal_mode = config.journal_mode.pragma_value(),
            "database opened"
        );
        Ok(db)
    }

    /// Applies pragmas, creates the registry and checks the schema version.
    fn initialize(&mut self, config: &StoreConfig) -> Result<()> {
        self.conn.execute_batch(&format!(
            "PRAGMA journal_mode = {}",
            config.journal_mode.pragma_value()
        ))?;
        self.conn.execute_batch(&format!(
            "PRAGMA synchronous = {}",
            config.sync_mode.pragma_value()
        ))?;
        self.conn.execute_batch("PRAGMA foreign_keys = ON")?;
        self.conn.busy_timeout(config.busy_timeout())?;

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
        apply_ddl(&tx)?;
        verify_or_set_version(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Begins an exclusive transaction.
    ///
    /// Dropping the returned transaction without committing rolls it back,
    /// so an early `?` return never leaves half an operation on disk.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Exclusive)?)
    }

    /// The underlying connection, for reads.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// File the database lives in; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Drops every data table and view, clears the registry rows and
    /// re-applies the bootstrap DDL.
    pub fn reset(&mut self) -> Result<()> {
        let tx = self.transaction()?;
        reset_in(&tx)?;
        tx.commit()?;
        info!(target: "simstore::schema", "store reset");
        Ok(())
    }
}

/// Checks the stored schema version, writing it on a fresh database.
fn verify_or_set_version(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM store_info WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO store_info (key, value) VALUES ('schema_version', ?)",
                [SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        Some(v) => {
            return Err(Error::Schema(format!(
                "schema version mismatch: database has version {v}, this build requires {SCHEMA_VERSION}"
            )));
        }
    }
    Ok(())
}

/// Body of [`Database::reset`], run inside the caller's transaction.
fn reset_in(conn: &Connection) -> Result<()> {
    for kind in ["view", "table"] {
        let names: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%'",
            )?;
            let rows = stmt.query_map([kind], |row| row.get(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        for name in names {
            if REGISTRY_TABLES.contains(&name.as_str()) {
                continue;
            }
            let ident = Ident::new(name)?;
            debug!(target: "simstore::schema", kind, name = %ident, "dropping");
            conn.execute_batch(&format!("DROP {} IF EXISTS {}", kind.to_uppercase(), ident.quoted()))?;
        }
    }

    // Children before parents so the foreign keys stay satisfied.
    for table in REGISTRY_TABLES.iter().rev() {
        if *table == "store_info" {
            continue;
        }
        conn.execute_batch(&format!("DELETE FROM {table}"))?;
    }

    apply_ddl(conn)
}

// =============================================================================
// Tests
// =============================================================================
