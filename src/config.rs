//! # Store Configuration
//!
//! [`StoreConfig`] collects everything that is decided when a store is
//! opened: where the database lives, how SQLite journals and syncs, and the
//! column ceiling that drives matrix sharding.
//!
//! The config derives serde traits so drivers can embed it in their own
//! configuration files:
//!
//! ```rust
//! use simstore::{JournalMode, StoreConfig};
//!
//! let config = StoreConfig::default()
//!     .with_path("run.sqlite3")
//!     .with_journal_mode(JournalMode::Delete);
//! assert_eq!(config.max_columns, simstore::config::DEFAULT_MAX_COLUMNS);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Defaults
// =============================================================================

/// Default column ceiling for one physical table (ids, not counting the
/// timestamp column).
///
/// SQLite's compiled-in `SQLITE_MAX_COLUMN` is 2000. Staying ten below leaves
/// room for the timestamp column and the join machinery of views.
pub const DEFAULT_MAX_COLUMNS: usize = 1990;

/// Largest accepted `max_columns`.
pub const MAX_COLUMNS_LIMIT: usize = DEFAULT_MAX_COLUMNS;

/// Default time SQLite waits on a locked database file.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// Pragmas
// =============================================================================

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Write-ahead log.
    #[default]
    Wal,
    /// Rollback journal, deleted after each transaction.
    Delete,
    /// Journal kept in memory (fast, not crash safe).
    Memory,
}

impl JournalMode {
    /// Returns the `PRAGMA journal_mode` value.
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
            Self::Memory => "memory",
        }
    }
}

/// SQLite synchronous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// fsync at every commit.
    Full,
    /// fsync the WAL at checkpoints only.
    #[default]
    Normal,
    /// Leave syncing to the OS.
    Off,
}

impl SyncMode {
    /// Returns the `PRAGMA synchronous` value.
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
            Self::Off => "off",
        }
    }
}

// =============================================================================
// StoreConfig
// =============================================================================

/// Configuration for a [`RecordingStore`](crate::RecordingStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; `None` opens an unshared in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Journal mode applied at open.
    #[serde(default)]
    pub journal_mode: JournalMode,

    /// Synchronous mode applied at open.
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Most ids one matrix table may hold; also the combined id count above
    /// which shards are no longer joined into one view.
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

const fn default_max_columns() -> usize {
    DEFAULT_MAX_COLUMNS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            max_columns: DEFAULT_MAX_COLUMNS,
        }
    }
}

impl StoreConfig {
    /// Sets the database file.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the journal mode.
    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Sets the synchronous mode.
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Sets the column ceiling.
    pub fn with_max_columns(mut self, max_columns: usize) -> Self {
        self.max_columns = max_columns;
        self
    }

    /// Busy timeout as a [`Duration`].
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Checks value ranges. Called by every open path.
    pub fn validate(&self) -> Result<()> {
        if self.max_columns == 0 || self.max_columns > MAX_COLUMNS_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "max_columns must be within 1..={MAX_COLUMNS_LIMIT}, got {}",
                self.max_columns
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
