//! Index Build Driver: one-time full-table population of a newly created
//! index.
//!
//! Performs a full forward scan of the table's remote-resident rows and
//! funnels every visible row through the coordinator's single-index insert
//! primitive. Row visibility is delegated to the host engine's oracle; the
//! coordinator's skip rules stay in force during the build.

use anyhow::Result;
use tracing::{info, warn};

use crate::maintenance::IndexMaintenance;
use crate::metadata::{IndexDescriptor, TableDescriptor};
use crate::remote::{RemoteSession, RowRecord};

/// Decides which rows of a full scan are eligible for indexing. Owned by the
/// host engine's row-versioning subsystem.
pub trait RowVisibility: Send + Sync {
    fn is_visible(&self, row: &RowRecord) -> bool;
}

/// Visibility oracle that admits every row; the single-snapshot default.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllRowsVisible;

impl RowVisibility for AllRowsVisible {
    fn is_visible(&self, _row: &RowRecord) -> bool {
        true
    }
}

/// Counters returned to the caller for index-build statistics.
///
/// `entries_inserted` counts only genuinely issued remote inserts, never
/// rows that the coordinator's skip rules absorbed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexBuildStats {
    pub rows_scanned: u64,
    pub entries_inserted: u64,
}

/// Populates a newly created index from the table's existing rows.
///
/// Building the primary index is an unexpected request (it is intrinsic to
/// row placement and holds no separate data) and completes as a diagnostic
/// no-op rather than an error, since no data loss results.
pub async fn build_index(
    maintenance: &IndexMaintenance,
    session: RemoteSession,
    table: &TableDescriptor,
    index: &IndexDescriptor,
    visibility: &dyn RowVisibility,
) -> Result<IndexBuildStats> {
    if index.kind.is_primary() {
        warn!(
            table = %table.table_name,
            index = %index.index_name,
            "build requested for a primary index, which holds no separate data"
        );
        return Ok(IndexBuildStats::default());
    }

    let mut stats = IndexBuildStats::default();
    let mut rows = maintenance.store().scan_rows(session, table).await?;
    loop {
        let Some(row) = rows.next().await? else {
            break;
        };
        stats.rows_scanned += 1;
        if !visibility.is_visible(&row) {
            continue;
        }
        if maintenance
            .insert_entry_for_index(session, table, index, &row)
            .await?
        {
            stats.entries_inserted += 1;
        }
    }
    rows.close().await?;
    maintenance
        .metrics()
        .record_build_rows_scanned(stats.rows_scanned);
    info!(
        table = %table.table_name,
        index = %index.index_name,
        rows_scanned = stats.rows_scanned,
        entries_inserted = stats.entries_inserted,
        "index build completed"
    );
    Ok(stats)
}
