//! In-process counters for index maintenance and scan behavior.
//!
//! Intentionally lightweight and lock-free so they can be updated on hot
//! write and read paths without noticeable overhead.

use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregated counters across maintenance, build and scan execution.
#[derive(Debug, Default)]
pub struct IndexMetrics {
    /// Index entries inserted through the remote store.
    entries_inserted: AtomicU64,
    /// Index entries deleted by exact value.
    entries_deleted: AtomicU64,
    /// Bulk by-record-id delete requests issued.
    bulk_deletes: AtomicU64,
    /// Maintenance skips because the index is the primary index.
    skipped_primary: AtomicU64,
    /// Maintenance skips because the index is still backfilling.
    skipped_backfilling: AtomicU64,
    /// Maintenance skips because the row carried no record id.
    skipped_missing_record_id: AtomicU64,
    /// Uniqueness conflicts reported by the remote store.
    duplicate_key_conflicts: AtomicU64,
    /// Index scans bound to a remote query.
    scans_bound: AtomicU64,
    /// Matched rows returned to the query executor.
    scan_rows_returned: AtomicU64,
    /// Base-row fetches resolved from entry back-references.
    base_row_fetches: AtomicU64,
    /// Rows visited by index builds.
    build_rows_scanned: AtomicU64,
}

/// Immutable snapshot view of [`IndexMetrics`].
#[derive(Debug, Clone, Copy)]
pub struct IndexMetricsSnapshot {
    pub entries_inserted: u64,
    pub entries_deleted: u64,
    pub bulk_deletes: u64,
    pub skipped_primary: u64,
    pub skipped_backfilling: u64,
    pub skipped_missing_record_id: u64,
    pub duplicate_key_conflicts: u64,
    pub scans_bound: u64,
    pub scan_rows_returned: u64,
    pub base_row_fetches: u64,
    pub build_rows_scanned: u64,
}

impl IndexMetrics {
    pub fn record_entry_inserted(&self) {
        self.entries_inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entry_deleted(&self) {
        self.entries_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bulk_delete(&self) {
        self.bulk_deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip_primary(&self) {
        self.skipped_primary.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip_backfilling(&self) {
        self.skipped_backfilling.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip_missing_record_id(&self) {
        self.skipped_missing_record_id
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_key_conflict(&self) {
        self.duplicate_key_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_bound(&self) {
        self.scans_bound.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_row_returned(&self) {
        self.scan_rows_returned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_base_row_fetch(&self) {
        self.base_row_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_rows_scanned(&self, rows: u64) {
        self.build_rows_scanned.fetch_add(rows, Ordering::Relaxed);
    }

    /// Captures a point-in-time copy of all counters.
    pub fn snapshot(&self) -> IndexMetricsSnapshot {
        IndexMetricsSnapshot {
            entries_inserted: self.entries_inserted.load(Ordering::Relaxed),
            entries_deleted: self.entries_deleted.load(Ordering::Relaxed),
            bulk_deletes: self.bulk_deletes.load(Ordering::Relaxed),
            skipped_primary: self.skipped_primary.load(Ordering::Relaxed),
            skipped_backfilling: self.skipped_backfilling.load(Ordering::Relaxed),
            skipped_missing_record_id: self.skipped_missing_record_id.load(Ordering::Relaxed),
            duplicate_key_conflicts: self.duplicate_key_conflicts.load(Ordering::Relaxed),
            scans_bound: self.scans_bound.load(Ordering::Relaxed),
            scan_rows_returned: self.scan_rows_returned.load(Ordering::Relaxed),
            base_row_fetches: self.base_row_fetches.load(Ordering::Relaxed),
            build_rows_scanned: self.build_rows_scanned.load(Ordering::Relaxed),
        }
    }

    /// Renders counters in a plain-text format suitable for `/metrics`.
    pub fn render_text(&self) -> String {
        let s = self.snapshot();
        format!(
            "index_entries_inserted={}\nindex_entries_deleted={}\nindex_bulk_deletes={}\nindex_skipped_primary={}\nindex_skipped_backfilling={}\nindex_skipped_missing_record_id={}\nindex_duplicate_key_conflicts={}\nindex_scans_bound={}\nindex_scan_rows_returned={}\nindex_base_row_fetches={}\nindex_build_rows_scanned={}\n",
            s.entries_inserted,
            s.entries_deleted,
            s.bulk_deletes,
            s.skipped_primary,
            s.skipped_backfilling,
            s.skipped_missing_record_id,
            s.duplicate_key_conflicts,
            s.scans_bound,
            s.scan_rows_returned,
            s.base_row_fetches,
            s.build_rows_scanned,
        )
    }
}
