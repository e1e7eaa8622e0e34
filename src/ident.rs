//! # SQL Identifiers
//!
//! Every series gets its own tables and views, so table names are composed
//! at runtime. Values always travel as bound parameters; identifiers cannot,
//! so they are composed only through [`Ident`], which accepts nothing but
//! `[A-Za-z0-9_]`, and are always emitted double-quoted.
//!
//! ## Naming Scheme
//!
//! A series with registry row `series_id = 7`, source `pop-1` and variable `v`
//! owns names built from the base `rec7_pop_1_v`:
//!
//! ```text
//! rec7_pop_1_v_events        EVENT table
//! rec7_pop_1_v_single        SINGLE table
//! rec7_pop_1_v_index         matrix timestamp index, shared by all shards
//! rec7_pop_1_v_raw_<first>   shard raw table
//! rec7_pop_1_v_shard_<first> shard view (index LEFT JOIN raw)
//! rec7_pop_1_v_matrix        combined view over all shard views
//! ```
//!
//! The `series_id` prefix makes names unique; the readable tail is only a
//! convenience for someone browsing the file, so characters outside the
//! allow-list are folded to `_` there.

use std::fmt;

use crate::error::{Error, Result};

/// A validated SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    /// Validates `name` against `[A-Za-z0-9_]+`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(Error::InvalidIdentifier(name))
        }
    }

    /// Unquoted name, as stored in the registry.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for use inside SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Quoted column name of a neuron id.
pub fn id_column(id: u32) -> String {
    format!("\"{id}\"")
}

/// Comma-separated quoted id columns, in order.
pub fn id_columns(ids: &[u32]) -> String {
    ids.iter().map(|id| id_column(*id)).collect::<Vec<_>>().join(", ")
}

fn fold(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

// =============================================================================
// Series Names
// =============================================================================

/// Name factory for the tables and views of one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesNames {
    base: String,
}

impl SeriesNames {
    /// Builds the base name for a registry row.
    pub fn new(series_id: i64, source: &str, variable: &str) -> Self {
        Self {
            base: format!("rec{series_id}_{}_{}", fold(source), fold(variable)),
        }
    }

    fn suffixed(&self, suffix: &str) -> Result<Ident> {
        Ident::new(format!("{}_{suffix}", self.base))
    }

    /// EVENT table.
    pub fn events(&self) -> Result<Ident> {
        self.suffixed("events")
    }

    /// SINGLE table.
    pub fn single(&self) -> Result<Ident> {
        self.suffixed("single")
    }

    /// Timestamp index shared by all shards of a matrix series.
    pub fn index(&self) -> Result<Ident> {
        self.suffixed("index")
    }

    /// Raw table of the shard starting at `first_id`.
    pub fn raw(&self, first_id: u32) -> Result<Ident> {
        self.suffixed(&format!("raw_{first_id}"))
    }

    /// View of the shard starting at `first_id`.
    pub fn shard_view(&self, first_id: u32) -> Result<Ident> {
        self.suffixed(&format!("shard_{first_id}"))
    }

    /// Combined view over all shard views.
    pub fn matrix_view(&self) -> Result<Ident> {
        self.suffixed("matrix")
    }
}
