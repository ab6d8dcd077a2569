//! Index Maintenance Coordinator: keeps secondary indexes consistent with
//! row inserts, updates and deletes.
//!
//! The coordinator never mutates local index structures; its only side
//! effects are remote-store calls plus an optional host row-cache update.
//! Entries across different indexes for one row carry no ordering guarantee,
//! but the delete-then-insert sequence of an update is strictly ordered so a
//! transient duplicate-key violation cannot surface mid-update.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use datafusion::common::ScalarValue;
use tracing::{debug, warn};

use crate::metadata::{IndexDescriptor, TableDescriptor};
use crate::metrics::IndexMetrics;
use crate::remote::{
    DeleteOutcome, InsertOutcome, RecordId, RemoteSession, RemoteStore, RowRecord,
};

/// Uniqueness violation reported by the remote store during entry insert.
/// Escalates as a fatal error for the enclosing statement.
#[derive(Debug, Clone)]
pub struct DuplicateKeyViolation {
    pub index_name: String,
}

impl DuplicateKeyViolation {
    fn for_index(index: &IndexDescriptor) -> Self {
        Self {
            index_name: index.index_name.clone(),
        }
    }
}

impl fmt::Display for DuplicateKeyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate key value violates unique constraint \"{}\"",
            self.index_name
        )
    }
}

impl std::error::Error for DuplicateKeyViolation {}

/// How a row's existing entries are located for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// Exact old key values are in hand; delete the one matching entry.
    ByValue,
    /// Old values are not cheaply available; delete every entry owned by the
    /// row's record id. Correct because the back-reference uniquely owns its
    /// entries.
    ByRecordId,
}

/// Host-engine row cache keyed by record id. Updated by insert/update/delete
/// maintenance as a side effect; never touched by the scan adapter.
#[derive(Debug, Default)]
pub struct RowCache {
    rows: Mutex<BTreeMap<RecordId, Vec<ScalarValue>>>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, record_id: RecordId, values: Vec<ScalarValue>) {
        self.lock().insert(record_id, values);
    }

    pub fn get(&self, record_id: &RecordId) -> Option<Vec<ScalarValue>> {
        self.lock().get(record_id).cloned()
    }

    pub fn remove(&self, record_id: &RecordId) {
        self.lock().remove(record_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<RecordId, Vec<ScalarValue>>> {
        self.rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reason one index was locally absorbed instead of maintained.
enum SkipReason {
    Primary,
    MissingRecordId,
}

/// Index Maintenance Coordinator over one remote store client.
pub struct IndexMaintenance {
    store: Arc<dyn RemoteStore>,
    metrics: Arc<IndexMetrics>,
    row_cache: Option<Arc<RowCache>>,
}

impl IndexMaintenance {
    pub fn new(store: Arc<dyn RemoteStore>, metrics: Arc<IndexMetrics>) -> Self {
        Self {
            store,
            metrics,
            row_cache: None,
        }
    }

    /// Attaches a host row cache updated as a side effect of maintenance.
    pub fn with_row_cache(mut self, row_cache: Arc<RowCache>) -> Self {
        self.row_cache = Some(row_cache);
        self
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<IndexMetrics> {
        &self.metrics
    }

    /// Inserts entries for a new row into every eligible index.
    ///
    /// Per index: the primary index is skipped (intrinsic to row placement),
    /// backfilling indexes are skipped (readiness read fresh per call), and a
    /// missing record id is reported and absorbed. Any remote failure or
    /// uniqueness conflict aborts the whole call.
    pub async fn insert_index_entries(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
        indexes: &[IndexDescriptor],
        row: &RowRecord,
    ) -> Result<()> {
        ensure_remote_backed(table)?;
        for index in indexes {
            if !self.ready_for_maintenance(table, index) {
                continue;
            }
            self.insert_entry_for_index(session, table, index, row)
                .await?;
        }
        if let (Some(cache), Some(record_id)) = (self.row_cache.as_deref(), &row.record_id) {
            cache.put(record_id.clone(), row.values.clone());
        }
        Ok(())
    }

    /// Single-index insert primitive, also reused by the build driver.
    /// Applies the primary-index and missing-record-id skips but not the
    /// readiness gate: the build itself writes into a backfilling index.
    /// Returns `true` when a remote insert was actually issued.
    pub async fn insert_entry_for_index(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
        index: &IndexDescriptor,
        row: &RowRecord,
    ) -> Result<bool> {
        let record_id = match self.maintenance_gate(table, index, row.record_id.as_ref()) {
            Ok(record_id) => record_id,
            Err(_reason) => return Ok(false),
        };
        let (key_values, include_values) = index_column_values(table, index, &row.values)?;
        let outcome = self
            .store
            .insert_entry(
                session,
                index,
                key_values.as_slice(),
                include_values.as_slice(),
                record_id,
                index.kind.requests_unique_check(),
            )
            .await?;
        match outcome {
            InsertOutcome::Applied => {
                self.metrics.record_entry_inserted();
                Ok(true)
            }
            InsertOutcome::DuplicateKey => {
                self.metrics.record_duplicate_key_conflict();
                Err(anyhow::Error::new(DuplicateKeyViolation::for_index(index)))
            }
        }
    }

    /// Deletes a row's entries from every eligible index, locating them by
    /// the given strategy. Not-found by-value deletes are successful no-ops.
    pub async fn delete_index_entries(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
        indexes: &[IndexDescriptor],
        row: &RowRecord,
        strategy: DeleteStrategy,
    ) -> Result<()> {
        ensure_remote_backed(table)?;
        for index in indexes {
            if !self.ready_for_maintenance(table, index) {
                continue;
            }
            let record_id = match self.maintenance_gate(table, index, row.record_id.as_ref()) {
                Ok(record_id) => record_id,
                Err(_reason) => continue,
            };
            match strategy {
                DeleteStrategy::ByValue => {
                    let (key_values, _) = index_column_values(table, index, &row.values)?;
                    let outcome = self
                        .store
                        .delete_entry(session, index, key_values.as_slice(), record_id)
                        .await?;
                    match outcome {
                        DeleteOutcome::Applied => self.metrics.record_entry_deleted(),
                        DeleteOutcome::NotFound => {
                            // Idempotent drop semantics: the entry was
                            // already gone, which is the desired end state.
                            debug!(
                                table = %table.table_name,
                                index = %index.index_name,
                                record_id = %record_id,
                                "by-value index delete matched no entry"
                            );
                        }
                    }
                }
                DeleteStrategy::ByRecordId => {
                    self.store
                        .delete_all_by_record_id(session, index, record_id)
                        .await?;
                    self.metrics.record_bulk_delete();
                }
            }
        }
        if let (Some(cache), Some(record_id)) = (self.row_cache.as_deref(), &row.record_id) {
            cache.remove(record_id);
        }
        Ok(())
    }

    /// Applies an update that may have changed indexed columns: bulk
    /// by-record-id delete, row-cache refresh, then a fresh insert from the
    /// new row image. Atomicity across the two remote phases is delegated to
    /// the caller's remote transaction context.
    pub async fn apply_update(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
        indexes: &[IndexDescriptor],
        new_row: &RowRecord,
    ) -> Result<()> {
        ensure_remote_backed(table)?;
        let Some(record_id) = new_row.record_id.as_ref() else {
            warn!(
                table = %table.table_name,
                "update maintenance received a row without a record id; skipping"
            );
            self.metrics.record_skip_missing_record_id();
            return Ok(());
        };
        for index in indexes {
            if !self.ready_for_maintenance(table, index)
                || self
                    .maintenance_gate(table, index, Some(record_id))
                    .is_err()
            {
                continue;
            }
            self.store
                .delete_all_by_record_id(session, index, record_id)
                .await?;
            self.metrics.record_bulk_delete();
        }
        if let Some(cache) = self.row_cache.as_deref() {
            cache.put(record_id.clone(), new_row.values.clone());
        }
        for index in indexes {
            if !self.ready_for_maintenance(table, index) {
                continue;
            }
            self.insert_entry_for_index(session, table, index, new_row)
                .await?;
        }
        Ok(())
    }

    /// Readiness gate for live maintenance. Read fresh on every call: a
    /// concurrent build may flip the flag mid-transaction.
    fn ready_for_maintenance(&self, table: &TableDescriptor, index: &IndexDescriptor) -> bool {
        if index.kind.is_primary() || index.accepts_inserts() {
            return true;
        }
        debug!(
            table = %table.table_name,
            index = %index.index_name,
            "index is still backfilling; maintenance deferred to the build"
        );
        self.metrics.record_skip_backfilling();
        false
    }

    /// Applies the skip rules shared by insertion, deletion and the build,
    /// recording metrics and diagnostics for each absorbed condition.
    fn maintenance_gate<'a>(
        &self,
        table: &TableDescriptor,
        index: &IndexDescriptor,
        record_id: Option<&'a RecordId>,
    ) -> std::result::Result<&'a RecordId, SkipReason> {
        if index.kind.is_primary() {
            self.metrics.record_skip_primary();
            return Err(SkipReason::Primary);
        }
        match record_id {
            Some(record_id) => Ok(record_id),
            None => {
                warn!(
                    table = %table.table_name,
                    index = %index.index_name,
                    "row on the remote-backed path carries no record id; skipping index"
                );
                self.metrics.record_skip_missing_record_id();
                Err(SkipReason::MissingRecordId)
            }
        }
    }
}

/// Computes an index's key and include values from a row image by column
/// name lookup against the table layout.
pub fn index_column_values(
    table: &TableDescriptor,
    index: &IndexDescriptor,
    row_values: &[ScalarValue],
) -> Result<(Vec<ScalarValue>, Vec<ScalarValue>)> {
    let mut key_values = Vec::with_capacity(index.key_columns.len());
    for key in &index.key_columns {
        key_values.push(row_value(table, row_values, key.name.as_str())?);
    }
    let mut include_values = Vec::with_capacity(index.include_columns.len());
    for include in &index.include_columns {
        include_values.push(row_value(table, row_values, include.as_str())?);
    }
    Ok((key_values, include_values))
}

fn row_value(
    table: &TableDescriptor,
    row_values: &[ScalarValue],
    column: &str,
) -> Result<ScalarValue> {
    let idx = table.column_index(column)?;
    row_values
        .get(idx)
        .cloned()
        .ok_or_else(|| anyhow!("row value index {} out of bounds", idx))
}

/// `true` when an update changes any column referenced by a non-primary
/// index. Rows updated in place without touching indexed attributes (and
/// without relocating, which the caller detects via the record id) must
/// bypass the coordinator entirely.
pub fn update_touches_indexes(
    table: &TableDescriptor,
    indexes: &[IndexDescriptor],
    old_values: &[ScalarValue],
    new_values: &[ScalarValue],
) -> Result<bool> {
    for index in indexes {
        if index.kind.is_primary() {
            continue;
        }
        let (old_keys, old_includes) = index_column_values(table, index, old_values)?;
        let (new_keys, new_includes) = index_column_values(table, index, new_values)?;
        if old_keys != new_keys || old_includes != new_includes {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ensure_remote_backed(table: &TableDescriptor) -> Result<()> {
    if !table.remote_backed {
        return Err(anyhow!(
            "table '{}' is not remote-backed; index maintenance does not apply",
            table.table_name
        ));
    }
    Ok(())
}
