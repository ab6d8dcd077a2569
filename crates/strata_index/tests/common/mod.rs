//! Shared fixtures for the strata_index integration suites: an orders-style
//! table, its index set, and a recording store wrapper asserting exactly
//! which remote calls the core issued.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use datafusion::common::ScalarValue;
use strata_index::{
    DeleteOutcome, EntryCursor, IndexDescriptor, IndexEntry, IndexKeyColumn, IndexKind,
    IndexState, InsertOutcome, RecordId, RemoteSession, RemoteStore, RowCursor, RowRecord,
    ScanDirection, ScanPredicate, TableColumnRecord, TableColumnType, TableDescriptor,
};

pub const ORDERS_TABLE_ID: u64 = 7;
pub const PRIMARY_INDEX_ID: u64 = 1;
pub const STATUS_INDEX_ID: u64 = 11;
pub const CUSTOMER_UNIQUE_INDEX_ID: u64 = 12;
pub const TOTAL_INDEX_ID: u64 = 13;

pub fn orders_table() -> TableDescriptor {
    TableDescriptor {
        table_id: ORDERS_TABLE_ID,
        table_name: "orders".to_string(),
        columns: vec![
            TableColumnRecord {
                name: "order_id".to_string(),
                column_type: TableColumnType::Int64,
                nullable: false,
            },
            TableColumnRecord {
                name: "customer_id".to_string(),
                column_type: TableColumnType::Int64,
                nullable: false,
            },
            TableColumnRecord {
                name: "status".to_string(),
                column_type: TableColumnType::Utf8,
                nullable: true,
            },
            TableColumnRecord {
                name: "total_cents".to_string(),
                column_type: TableColumnType::Int64,
                nullable: false,
            },
            TableColumnRecord {
                name: "note".to_string(),
                column_type: TableColumnType::Utf8,
                nullable: true,
            },
        ],
        primary_key_columns: vec!["order_id".to_string()],
        remote_backed: true,
    }
}

pub fn primary_index() -> IndexDescriptor {
    IndexDescriptor {
        table_id: ORDERS_TABLE_ID,
        index_id: PRIMARY_INDEX_ID,
        index_name: "orders_pkey".to_string(),
        kind: IndexKind::Primary,
        key_columns: vec![IndexKeyColumn::ascending("order_id")],
        include_columns: vec![],
        state: IndexState::Ready,
    }
}

pub fn status_index() -> IndexDescriptor {
    IndexDescriptor {
        table_id: ORDERS_TABLE_ID,
        index_id: STATUS_INDEX_ID,
        index_name: "idx_orders_status".to_string(),
        kind: IndexKind::Secondary { unique: false },
        key_columns: vec![IndexKeyColumn::ascending("status")],
        include_columns: vec![],
        state: IndexState::Ready,
    }
}

pub fn customer_unique_index() -> IndexDescriptor {
    IndexDescriptor {
        table_id: ORDERS_TABLE_ID,
        index_id: CUSTOMER_UNIQUE_INDEX_ID,
        index_name: "uq_orders_customer".to_string(),
        kind: IndexKind::Secondary { unique: true },
        key_columns: vec![IndexKeyColumn::ascending("customer_id")],
        include_columns: vec![],
        state: IndexState::Ready,
    }
}

/// Covering index on total_cents with status carried for index-only scans.
pub fn total_index(state: IndexState) -> IndexDescriptor {
    IndexDescriptor {
        table_id: ORDERS_TABLE_ID,
        index_id: TOTAL_INDEX_ID,
        index_name: "idx_orders_total".to_string(),
        kind: IndexKind::Secondary { unique: false },
        key_columns: vec![IndexKeyColumn::ascending("total_cents")],
        include_columns: vec!["status".to_string()],
        state,
    }
}

pub fn order_row(
    order_id: i64,
    customer_id: i64,
    status: Option<&str>,
    total_cents: i64,
) -> RowRecord {
    let record_id =
        RecordId::from_primary_key(&[ScalarValue::Int64(Some(order_id))]).expect("record id");
    RowRecord::new(
        vec![
            ScalarValue::Int64(Some(order_id)),
            ScalarValue::Int64(Some(customer_id)),
            ScalarValue::Utf8(status.map(|s| s.to_string())),
            ScalarValue::Int64(Some(total_cents)),
            ScalarValue::Utf8(None),
        ],
        record_id,
    )
}

pub fn record_id_for_order(order_id: i64) -> RecordId {
    RecordId::from_primary_key(&[ScalarValue::Int64(Some(order_id))]).expect("record id")
}

pub fn session() -> RemoteSession {
    RemoteSession::new(41)
}

/// One remote call observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    InsertEntry { index_id: u64, unique_check: bool },
    DeleteEntry { index_id: u64 },
    DeleteAllByRecordId { index_id: u64 },
    ScanEntries {
        index_id: u64,
        direction: ScanDirection,
        limit_hint: Option<usize>,
    },
    ScanRows { table_id: u64 },
    FetchRow { table_id: u64 },
}

/// Pass-through store that records every remote call, for zero-call and
/// argument-propagation assertions.
pub struct RecordingStore<S> {
    inner: S,
    calls: Mutex<Vec<RemoteCall>>,
    entry_cursor_closes: Arc<AtomicU64>,
}

impl<S> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            entry_cursor_closes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn entry_cursor_closes(&self) -> u64 {
        self.entry_cursor_closes.load(Ordering::SeqCst)
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

struct RecordingEntryCursor {
    inner: Box<dyn EntryCursor>,
    closes: Arc<AtomicU64>,
}

#[async_trait]
impl EntryCursor for RecordingEntryCursor {
    async fn next(&mut self) -> Result<Option<IndexEntry>> {
        self.inner.next().await
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RecordingStore<S> {
    async fn insert_entry(
        &self,
        session: RemoteSession,
        index: &IndexDescriptor,
        key_values: &[ScalarValue],
        include_values: &[ScalarValue],
        record_id: &RecordId,
        unique_check: bool,
    ) -> Result<InsertOutcome> {
        self.record(RemoteCall::InsertEntry {
            index_id: index.index_id,
            unique_check,
        });
        self.inner
            .insert_entry(session, index, key_values, include_values, record_id, unique_check)
            .await
    }

    async fn delete_entry(
        &self,
        session: RemoteSession,
        index: &IndexDescriptor,
        key_values: &[ScalarValue],
        record_id: &RecordId,
    ) -> Result<DeleteOutcome> {
        self.record(RemoteCall::DeleteEntry {
            index_id: index.index_id,
        });
        self.inner
            .delete_entry(session, index, key_values, record_id)
            .await
    }

    async fn delete_all_by_record_id(
        &self,
        session: RemoteSession,
        index: &IndexDescriptor,
        record_id: &RecordId,
    ) -> Result<u64> {
        self.record(RemoteCall::DeleteAllByRecordId {
            index_id: index.index_id,
        });
        self.inner
            .delete_all_by_record_id(session, index, record_id)
            .await
    }

    async fn scan_entries(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
        index: &IndexDescriptor,
        predicate: &ScanPredicate,
        direction: ScanDirection,
        limit_hint: Option<usize>,
    ) -> Result<Box<dyn EntryCursor>> {
        self.record(RemoteCall::ScanEntries {
            index_id: index.index_id,
            direction,
            limit_hint,
        });
        let cursor = self
            .inner
            .scan_entries(session, table, index, predicate, direction, limit_hint)
            .await?;
        Ok(Box::new(RecordingEntryCursor {
            inner: cursor,
            closes: self.entry_cursor_closes.clone(),
        }))
    }

    async fn scan_rows(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
    ) -> Result<Box<dyn RowCursor>> {
        self.record(RemoteCall::ScanRows {
            table_id: table.table_id,
        });
        self.inner.scan_rows(session, table).await
    }

    async fn fetch_row_by_record_id(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
        record_id: &RecordId,
    ) -> Result<Option<RowRecord>> {
        self.record(RemoteCall::FetchRow {
            table_id: table.table_id,
        });
        self.inner
            .fetch_row_by_record_id(session, table, record_id)
            .await
    }
}
