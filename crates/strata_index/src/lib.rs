//! Secondary-index maintenance and scan execution for StrataDB tables whose
//! rows live in a remote, primary-key-clustered key-value store.
//!
//! The remote store has no native notion of an index page: every index
//! mutation and scan is translated into key-value requests addressed by an
//! opaque logical record identifier derived from the row's primary key.
//! This crate owns three pieces of that translation:
//! - the maintenance coordinator keeping secondary indexes consistent with
//!   row inserts, updates and deletes ([`maintenance`]),
//! - the one-time full-table index build driver ([`build`]),
//! - the per-scan state machine serving index-only scans and base-row
//!   fetches ([`scan`]).
//!
//! Transaction scope, locking and row versioning stay with the host engine
//! and the remote store; all calls here execute inside a caller-supplied
//! [`remote::RemoteSession`].

pub mod build;
pub mod keys;
pub mod maintenance;
pub mod memory;
pub mod metadata;
pub mod metrics;
pub mod remote;
pub mod scan;

pub use build::{build_index, AllRowsVisible, IndexBuildStats, RowVisibility};
pub use maintenance::{
    update_touches_indexes, DeleteStrategy, DuplicateKeyViolation, IndexMaintenance, RowCache,
};
pub use memory::MemoryStore;
pub use metadata::{
    validate_table_indexes, IndexDescriptor, IndexKeyColumn, IndexKind, IndexState, NullOrder,
    SortOrder, TableColumnRecord, TableColumnType, TableDescriptor,
};
pub use metrics::{IndexMetrics, IndexMetricsSnapshot};
pub use remote::{
    DeleteOutcome, EntryCursor, IndexEntry, InsertOutcome, RecordId, RemoteSession, RemoteStore,
    RowCursor, RowRecord, ScanDirection, ScanPredicate,
};
pub use scan::{IndexScan, MatchedRow, ScanOptions};
