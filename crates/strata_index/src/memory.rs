//! Embedded in-memory implementation of the remote store contract.
//!
//! Single-process stand-in for the real storage backend: entries live in one
//! ordered map keyed by the codec in [`crate::keys`], so scans come back in
//! the same key order a remote range query would produce. Used as the
//! in-process backend for tests and as the reference semantics of the
//! [`RemoteStore`] contract. Writes apply immediately; transactional
//! visibility beyond that is out of scope here.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use datafusion::common::ScalarValue;

use crate::keys::{
    encode_entry_key, encode_lookup_prefix, encode_scalar_key_payload,
    encode_unique_conflict_prefix, prefix_range_end, scalar_is_null,
};
use crate::metadata::{IndexDescriptor, TableDescriptor};
use crate::remote::{
    DeleteOutcome, EntryCursor, IndexEntry, InsertOutcome, RecordId, RemoteSession, RemoteStore,
    RowCursor, RowRecord, ScanDirection, ScanPredicate,
};

#[derive(Debug, Clone)]
struct StoredEntry {
    key_values: Vec<ScalarValue>,
    include_values: Vec<ScalarValue>,
    record_id: RecordId,
}

#[derive(Debug, Default)]
struct Inner {
    /// All index entries across all indexes, ordered by encoded key.
    entries: BTreeMap<Vec<u8>, StoredEntry>,
    /// Base rows per table, ordered by record id (primary-key order).
    rows: BTreeMap<u64, BTreeMap<Vec<u8>, Vec<ScalarValue>>>,
}

/// In-memory [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seeds or replaces one base row. Row DML itself belongs to the host
    /// engine's row path; tests and fixtures use this directly.
    pub fn put_row(&self, table: &TableDescriptor, row: RowRecord) -> Result<()> {
        let record_id = row
            .record_id
            .clone()
            .ok_or_else(|| anyhow!("row for table '{}' has no record id", table.table_name))?;
        if row.values.len() != table.columns.len() {
            return Err(anyhow!(
                "row for table '{}' has {} values, expected {}",
                table.table_name,
                row.values.len(),
                table.columns.len()
            ));
        }
        self.lock()
            .rows
            .entry(table.table_id)
            .or_default()
            .insert(record_id.as_bytes().to_vec(), row.values);
        Ok(())
    }

    /// Removes one base row; missing rows are a no-op.
    pub fn remove_row(&self, table: &TableDescriptor, record_id: &RecordId) {
        if let Some(rows) = self.lock().rows.get_mut(&table.table_id) {
            rows.remove(record_id.as_bytes());
        }
    }

    /// Number of entries currently materialized for one index.
    pub fn entry_count(&self, index: &IndexDescriptor) -> usize {
        self.index_entries(index).len()
    }

    /// Snapshot of one index's entries in key order, for assertions.
    pub fn index_entries(&self, index: &IndexDescriptor) -> Vec<(Vec<ScalarValue>, RecordId)> {
        let prefix = crate::keys::encode_index_prefix(index);
        let inner = self.lock();
        range_snapshot(&inner.entries, prefix.as_slice())
            .into_iter()
            .map(|entry| (entry.key_values, entry.record_id))
            .collect()
    }

    fn ensure_secondary(index: &IndexDescriptor) -> Result<()> {
        if index.kind.is_primary() {
            return Err(anyhow!(
                "primary index '{}' entries are never materialized",
                index.index_name
            ));
        }
        Ok(())
    }
}

/// Collects entries whose encoded key starts with `prefix`, in key order.
fn range_snapshot(entries: &BTreeMap<Vec<u8>, StoredEntry>, prefix: &[u8]) -> Vec<StoredEntry> {
    let iter: Box<dyn Iterator<Item = (&Vec<u8>, &StoredEntry)>> =
        match prefix_range_end(prefix) {
            Some(end) => Box::new(entries.range(prefix.to_vec()..end)),
            None => Box::new(entries.range(prefix.to_vec()..)),
        };
    iter.map(|(_, entry)| entry.clone()).collect()
}

/// Encodes a record-id byte prefix from a primary-key equality predicate.
fn record_id_prefix(predicate: &ScanPredicate) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for value in &predicate.key_values {
        if scalar_is_null(value) {
            return Err(anyhow!("primary-key predicate value must not be null"));
        }
        let payload = encode_scalar_key_payload(value)?
            .ok_or_else(|| anyhow!("primary-key predicate value must not be null"))?;
        out.push(0x01);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }
    Ok(out)
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn insert_entry(
        &self,
        _session: RemoteSession,
        index: &IndexDescriptor,
        key_values: &[ScalarValue],
        include_values: &[ScalarValue],
        record_id: &RecordId,
        unique_check: bool,
    ) -> Result<InsertOutcome> {
        Self::ensure_secondary(index)?;
        if include_values.len() != index.include_columns.len() {
            return Err(anyhow!(
                "entry for index '{}' has {} include values, expected {}",
                index.index_name,
                include_values.len(),
                index.include_columns.len()
            ));
        }
        let key = encode_entry_key(index, key_values, record_id.as_bytes())?;
        let mut inner = self.lock();
        if unique_check {
            if let Some(prefix) = encode_unique_conflict_prefix(index, key_values)? {
                let conflicting = range_snapshot(&inner.entries, prefix.as_slice())
                    .into_iter()
                    .any(|entry| entry.record_id != *record_id);
                if conflicting {
                    return Ok(InsertOutcome::DuplicateKey);
                }
            }
        }
        inner.entries.insert(
            key,
            StoredEntry {
                key_values: key_values.to_vec(),
                include_values: include_values.to_vec(),
                record_id: record_id.clone(),
            },
        );
        Ok(InsertOutcome::Applied)
    }

    async fn delete_entry(
        &self,
        _session: RemoteSession,
        index: &IndexDescriptor,
        key_values: &[ScalarValue],
        record_id: &RecordId,
    ) -> Result<DeleteOutcome> {
        Self::ensure_secondary(index)?;
        let key = encode_entry_key(index, key_values, record_id.as_bytes())?;
        let removed = self.lock().entries.remove(&key).is_some();
        Ok(if removed {
            DeleteOutcome::Applied
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn delete_all_by_record_id(
        &self,
        _session: RemoteSession,
        index: &IndexDescriptor,
        record_id: &RecordId,
    ) -> Result<u64> {
        Self::ensure_secondary(index)?;
        let prefix = crate::keys::encode_index_prefix(index);
        let mut inner = self.lock();
        let doomed: Vec<Vec<u8>> = {
            let iter: Box<dyn Iterator<Item = (&Vec<u8>, &StoredEntry)>> =
                match prefix_range_end(prefix.as_slice()) {
                    Some(end) => Box::new(inner.entries.range(prefix.clone()..end)),
                    None => Box::new(inner.entries.range(prefix.clone()..)),
                };
            iter.filter(|(_, entry)| entry.record_id == *record_id)
                .map(|(key, _)| key.clone())
                .collect()
        };
        for key in &doomed {
            inner.entries.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn scan_entries(
        &self,
        _session: RemoteSession,
        table: &TableDescriptor,
        index: &IndexDescriptor,
        predicate: &ScanPredicate,
        direction: ScanDirection,
        limit_hint: Option<usize>,
    ) -> Result<Box<dyn EntryCursor>> {
        let mut matched: Vec<IndexEntry> = if index.kind.is_primary() {
            // Primary-index entries are the base rows themselves: scan the
            // row space by primary-key prefix and synthesize back-references.
            if predicate.key_values.len() > table.primary_key_columns.len() {
                return Err(anyhow!(
                    "primary predicate has {} values but table '{}' has {} key columns",
                    predicate.key_values.len(),
                    table.table_name,
                    table.primary_key_columns.len()
                ));
            }
            let prefix = record_id_prefix(predicate)?;
            let inner = self.lock();
            let rows = inner.rows.get(&table.table_id);
            let mut out = Vec::new();
            if let Some(rows) = rows {
                let iter: Box<dyn Iterator<Item = (&Vec<u8>, &Vec<ScalarValue>)>> = if prefix
                    .is_empty()
                {
                    Box::new(rows.iter())
                } else {
                    match prefix_range_end(prefix.as_slice()) {
                        Some(end) => Box::new(rows.range(prefix.clone()..end)),
                        None => Box::new(rows.range(prefix.clone()..)),
                    }
                };
                for (record_id, _) in iter {
                    out.push(IndexEntry {
                        key_values: vec![],
                        include_values: vec![],
                        record_id: RecordId::from_bytes(record_id.clone()),
                        recheck: false,
                    });
                }
            }
            out
        } else {
            let prefix = encode_lookup_prefix(index, predicate.key_values.as_slice())?;
            let inner = self.lock();
            range_snapshot(&inner.entries, prefix.as_slice())
                .into_iter()
                .map(|entry| IndexEntry {
                    key_values: entry.key_values,
                    include_values: entry.include_values,
                    record_id: entry.record_id,
                    recheck: false,
                })
                .collect()
        };

        if direction == ScanDirection::Backward {
            matched.reverse();
        }
        if let Some(limit) = limit_hint {
            matched.truncate(limit);
        }
        Ok(Box::new(MemoryEntryCursor {
            entries: matched.into(),
            closed: false,
        }))
    }

    async fn scan_rows(
        &self,
        _session: RemoteSession,
        table: &TableDescriptor,
    ) -> Result<Box<dyn RowCursor>> {
        let inner = self.lock();
        let rows = inner
            .rows
            .get(&table.table_id)
            .map(|rows| {
                rows.iter()
                    .map(|(record_id, values)| {
                        RowRecord::new(values.clone(), RecordId::from_bytes(record_id.clone()))
                    })
                    .collect::<VecDeque<_>>()
            })
            .unwrap_or_default();
        Ok(Box::new(MemoryRowCursor { rows, closed: false }))
    }

    async fn fetch_row_by_record_id(
        &self,
        _session: RemoteSession,
        table: &TableDescriptor,
        record_id: &RecordId,
    ) -> Result<Option<RowRecord>> {
        let inner = self.lock();
        Ok(inner
            .rows
            .get(&table.table_id)
            .and_then(|rows| rows.get(record_id.as_bytes()))
            .map(|values| RowRecord::new(values.clone(), record_id.clone())))
    }
}

struct MemoryEntryCursor {
    entries: VecDeque<IndexEntry>,
    closed: bool,
}

#[async_trait]
impl EntryCursor for MemoryEntryCursor {
    async fn next(&mut self) -> Result<Option<IndexEntry>> {
        if self.closed {
            return Err(anyhow!("entry cursor used after close"));
        }
        Ok(self.entries.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.entries.clear();
        Ok(())
    }
}

struct MemoryRowCursor {
    rows: VecDeque<RowRecord>,
    closed: bool,
}

#[async_trait]
impl RowCursor for MemoryRowCursor {
    async fn next(&mut self) -> Result<Option<RowRecord>> {
        if self.closed {
            return Err(anyhow!("row cursor used after close"));
        }
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}
