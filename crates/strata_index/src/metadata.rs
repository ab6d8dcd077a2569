//! Table and index descriptors consumed by the maintenance, build and scan
//! paths.
//!
//! Descriptors are owned by the host engine's catalog; this crate only reads
//! them during an operation. The primary index is deliberately modeled as a
//! tagged variant of [`IndexKind`] so the "never maintained separately" rule
//! is a single pattern match at every call site.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Column value types supported for remote-backed tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float64,
    Boolean,
    Utf8,
    TimestampNanosecond,
}

/// One column of a table's attribute layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumnRecord {
    pub name: String,
    pub column_type: TableColumnType,
    pub nullable: bool,
}

/// Identifies a table, its attribute layout, and whether it lives in the
/// remote store at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table_id: u64,
    pub table_name: String,
    pub columns: Vec<TableColumnRecord>,
    /// Primary-key column names, in key order. The logical record identifier
    /// is derived from these values.
    pub primary_key_columns: Vec<String>,
    /// `false` means the table uses conventional local storage and never
    /// reaches this crate's maintenance or scan paths.
    pub remote_backed: bool,
}

impl TableDescriptor {
    /// Resolves a column's position by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        let normalized = name.to_ascii_lowercase();
        self.columns
            .iter()
            .position(|column| column.name.to_ascii_lowercase() == normalized)
            .ok_or_else(|| {
                anyhow!(
                    "column '{}' not found in table '{}' metadata",
                    name,
                    self.table_name
                )
            })
    }
}

/// Sort direction of one index key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Placement of null values within one index key column's order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NullOrder {
    #[default]
    NullsFirst,
    NullsLast,
}

/// One key column of an index, with its ordering flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKeyColumn {
    pub name: String,
    pub order: SortOrder,
    pub nulls: NullOrder,
}

impl IndexKeyColumn {
    /// Ascending, nulls-first key column.
    pub fn ascending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Ascending,
            nulls: NullOrder::NullsFirst,
        }
    }
}

/// Distinguishes the table's intrinsic primary index from materialized
/// secondary indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Intrinsic to row placement; never materialized as a separate remote
    /// object and never separately maintained.
    Primary,
    /// Materialized remote index entries carrying a record-id back-reference.
    Secondary { unique: bool },
}

impl IndexKind {
    /// `true` for the primary (clustering) index.
    pub fn is_primary(self) -> bool {
        matches!(self, IndexKind::Primary)
    }

    /// `true` when remote inserts must request uniqueness enforcement.
    pub fn requests_unique_check(self) -> bool {
        matches!(self, IndexKind::Secondary { unique: true })
    }
}

/// Readiness of an index for live maintenance writes.
///
/// `Backfilling` indexes are skipped by every maintenance call so a
/// concurrent build never observes partial writes; the flag must be read
/// fresh on each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    #[default]
    Backfilling,
    Ready,
}

/// Persisted-shape descriptor of one index on a remote-backed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub table_id: u64,
    pub index_id: u64,
    pub index_name: String,
    pub kind: IndexKind,
    pub key_columns: Vec<IndexKeyColumn>,
    /// Non-key columns stored alongside the entry for index-only retrieval.
    pub include_columns: Vec<String>,
    pub state: IndexState,
}

impl IndexDescriptor {
    /// Validates internal consistency of the descriptor.
    pub fn validate(&self) -> Result<()> {
        if self.table_id == 0 {
            return Err(anyhow!("index metadata has invalid table_id=0"));
        }
        if self.index_id == 0 {
            return Err(anyhow!("index metadata has invalid index_id=0"));
        }
        if self.index_name.trim().is_empty() {
            return Err(anyhow!("index metadata has empty index_name"));
        }
        if self.key_columns.is_empty() {
            return Err(anyhow!("index '{}' has no key columns", self.index_name));
        }
        let mut key_seen = BTreeSet::<String>::new();
        for key in &self.key_columns {
            if key.name.trim().is_empty() {
                return Err(anyhow!("index '{}' has empty key column", self.index_name));
            }
            let normalized = key.name.to_ascii_lowercase();
            if !key_seen.insert(normalized.clone()) {
                return Err(anyhow!(
                    "index '{}' has duplicate key column '{}'",
                    self.index_name,
                    normalized
                ));
            }
        }
        let mut include_seen = BTreeSet::<String>::new();
        for column in &self.include_columns {
            let normalized = column.to_ascii_lowercase();
            if key_seen.contains(&normalized) {
                return Err(anyhow!(
                    "index '{}' include column '{}' duplicates key column",
                    self.index_name,
                    normalized
                ));
            }
            if !include_seen.insert(normalized.clone()) {
                return Err(anyhow!(
                    "index '{}' has duplicate include column '{}'",
                    self.index_name,
                    normalized
                ));
            }
        }
        if self.kind.is_primary() && !self.include_columns.is_empty() {
            return Err(anyhow!(
                "primary index '{}' cannot carry include columns",
                self.index_name
            ));
        }
        Ok(())
    }

    /// `true` when the index may receive live maintenance writes.
    pub fn accepts_inserts(&self) -> bool {
        self.state == IndexState::Ready
    }
}

/// Validates one table's full index set: descriptors must be individually
/// valid, belong to the table, and contain at most one primary index.
pub fn validate_table_indexes(table: &TableDescriptor, indexes: &[IndexDescriptor]) -> Result<()> {
    let mut primary_seen = false;
    for index in indexes {
        index.validate()?;
        if index.table_id != table.table_id {
            return Err(anyhow!(
                "index '{}' belongs to table_id={}, not table '{}' (table_id={})",
                index.index_name,
                index.table_id,
                table.table_name,
                table.table_id
            ));
        }
        for key in &index.key_columns {
            table.column_index(key.name.as_str())?;
        }
        for include in &index.include_columns {
            table.column_index(include.as_str())?;
        }
        if index.kind.is_primary() {
            if primary_seen {
                return Err(anyhow!(
                    "table '{}' has more than one primary index",
                    table.table_name
                ));
            }
            primary_seen = true;
        }
    }
    Ok(())
}
