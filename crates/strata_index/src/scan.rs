//! Index Scan Adapter: per-scan state machine translating the host engine's
//! generic open/bind/next/close protocol into remote range/point lookups.
//!
//! Lifecycle: `open` creates the cursor in **Open**, `bind` establishes the
//! remote query and moves it to **Active** (tearing down any prior Active
//! query first), `next` streams matches, `close` is idempotent and terminal.
//! Re-binds happen once per distinct predicate, including nested-loop
//! parameter changes.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use datafusion::common::ScalarValue;
use tracing::debug;

use crate::metadata::{IndexDescriptor, TableDescriptor};
use crate::metrics::IndexMetrics;
use crate::remote::{
    EntryCursor, RecordId, RemoteSession, RemoteStore, ScanDirection, ScanPredicate,
};

/// Shape of one index scan, fixed at open time.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Maximum number of predicate key columns later binds may use.
    pub key_count: usize,
    /// Ordering-operator count; must be zero (ordering scans unsupported).
    pub order_by_count: usize,
    /// Return index entries directly instead of fetching base rows.
    pub index_only: bool,
}

/// One row produced by an index scan.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRow {
    /// Base-row values, or the entry's key+include values for index-only
    /// retrieval.
    pub values: Vec<ScalarValue>,
    pub record_id: RecordId,
    /// `true` when the predicate must be re-evaluated against the values.
    pub recheck: bool,
}

enum ScanState {
    Open,
    Active { cursor: Box<dyn EntryCursor> },
    Closed,
}

/// Per-scan state machine over one index of one remote-backed table.
pub struct IndexScan {
    store: Arc<dyn RemoteStore>,
    session: RemoteSession,
    table: TableDescriptor,
    index: IndexDescriptor,
    metrics: Arc<IndexMetrics>,
    key_count: usize,
    fetch_base_row: bool,
    state: ScanState,
}

impl std::fmt::Debug for IndexScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            ScanState::Open => "Open",
            ScanState::Active { .. } => "Active",
            ScanState::Closed => "Closed",
        };
        f.debug_struct("IndexScan")
            .field("session", &self.session)
            .field("table", &self.table)
            .field("index", &self.index)
            .field("key_count", &self.key_count)
            .field("fetch_base_row", &self.fetch_base_row)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl IndexScan {
    /// Allocates a cursor in the **Open** state.
    ///
    /// Ordering-operator scans are a contract violation reported here and
    /// never reach the remote store. Index-only retrieval on the primary
    /// index is coerced to base-row retrieval: its entries are the rows.
    pub fn open(
        store: Arc<dyn RemoteStore>,
        session: RemoteSession,
        table: TableDescriptor,
        index: IndexDescriptor,
        options: ScanOptions,
    ) -> Result<Self> {
        if !table.remote_backed {
            return Err(anyhow!(
                "table '{}' is not remote-backed; index scans do not apply",
                table.table_name
            ));
        }
        if options.order_by_count != 0 {
            return Err(anyhow!(
                "ordering-operator scans are not supported on index '{}'",
                index.index_name
            ));
        }
        let max_keys = if index.kind.is_primary() {
            table.primary_key_columns.len()
        } else {
            index.key_columns.len()
        };
        if options.key_count > max_keys {
            return Err(anyhow!(
                "scan on index '{}' requests {} predicate keys but only {} are available",
                index.index_name,
                options.key_count,
                max_keys
            ));
        }
        let mut index_only = options.index_only;
        if index_only && index.kind.is_primary() {
            debug!(
                table = %table.table_name,
                index = %index.index_name,
                "primary index offers no index-only retrieval; fetching base rows"
            );
            index_only = false;
        }
        Ok(Self {
            store,
            session,
            table,
            index,
            metrics: Arc::new(IndexMetrics::default()),
            key_count: options.key_count,
            fetch_base_row: !index_only,
            state: ScanState::Open,
        })
    }

    /// Attaches shared metrics; scans otherwise count against a private set.
    pub fn with_metrics(mut self, metrics: Arc<IndexMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Binds a predicate and direction, establishing a new remote query.
    ///
    /// An already-Active cursor is torn down first so re-binding never leaks
    /// the prior remote query. A non-default limit hint is forwarded for
    /// forward scans and suppressed for backward scans: the remote store
    /// cannot evaluate a count limit while iterating in reverse, so the
    /// caller enforces it locally there.
    pub async fn bind(
        &mut self,
        predicate: ScanPredicate,
        direction: ScanDirection,
        limit_hint: Option<usize>,
    ) -> Result<()> {
        if matches!(self.state, ScanState::Closed) {
            return Err(anyhow!(
                "bind on closed scan cursor for index '{}'",
                self.index.index_name
            ));
        }
        if predicate.key_values.len() > self.key_count {
            return Err(anyhow!(
                "predicate has {} key values but scan was opened with key_count={}",
                predicate.key_values.len(),
                self.key_count
            ));
        }
        self.release_active().await?;

        let forwarded_limit = match direction {
            ScanDirection::Forward => limit_hint,
            ScanDirection::Backward => None,
        };
        let cursor = self
            .store
            .scan_entries(
                self.session,
                &self.table,
                &self.index,
                &predicate,
                direction,
                forwarded_limit,
            )
            .await?;
        self.metrics.record_scan_bound();
        self.state = ScanState::Active { cursor };
        Ok(())
    }

    /// Advances the scan one match in the bound direction.
    ///
    /// `Ok(None)` signals exhaustion and is the terminal signal for the
    /// caller's iteration, not an error. Entries whose base row is no longer
    /// visible are skipped.
    pub async fn next(&mut self) -> Result<Option<MatchedRow>> {
        let ScanState::Active { cursor } = &mut self.state else {
            return Err(anyhow!(
                "next on unbound scan cursor for index '{}'",
                self.index.index_name
            ));
        };
        loop {
            let Some(entry) = cursor.next().await? else {
                return Ok(None);
            };
            if !self.fetch_base_row {
                let mut values = entry.key_values;
                values.extend(entry.include_values);
                self.metrics.record_scan_row_returned();
                return Ok(Some(MatchedRow {
                    values,
                    record_id: entry.record_id,
                    recheck: entry.recheck,
                }));
            }
            self.metrics.record_base_row_fetch();
            let row = self
                .store
                .fetch_row_by_record_id(self.session, &self.table, &entry.record_id)
                .await?;
            match row {
                Some(row) => {
                    self.metrics.record_scan_row_returned();
                    return Ok(Some(MatchedRow {
                        values: row.values,
                        record_id: entry.record_id,
                        recheck: entry.recheck,
                    }));
                }
                None => {
                    debug!(
                        table = %self.table.table_name,
                        index = %self.index.index_name,
                        record_id = %entry.record_id,
                        "index entry back-reference resolved to no visible row; skipping"
                    );
                }
            }
        }
    }

    /// Releases the remote query and any buffered state. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.release_active().await?;
        self.state = ScanState::Closed;
        Ok(())
    }

    /// `true` once the cursor has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ScanState::Closed)
    }

    async fn release_active(&mut self) -> Result<()> {
        if let ScanState::Active { cursor } =
            &mut std::mem::replace(&mut self.state, ScanState::Open)
        {
            cursor.close().await?;
        }
        Ok(())
    }
}
