//! Client-side contract of the remote primary-key-clustered store.
//!
//! Every call carries an explicit [`RemoteSession`] naming the transaction
//! context the caller has already established; this crate never opens or
//! commits transactions itself, and all its calls within one statement are
//! expected to execute inside the caller's single remote transaction.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use datafusion::common::ScalarValue;

use crate::keys::encode_record_id_bytes;
use crate::metadata::{IndexDescriptor, TableDescriptor};

/// Opaque logical record identifier derived from a row's primary-key values.
///
/// Not a physical address: the remote store relocates rows freely as long as
/// lookups by record id keep resolving. Stored inside every secondary index
/// entry as the back-reference to its owning row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(Vec<u8>);

impl RecordId {
    /// Derives a record id from primary-key values using the ordered tuple
    /// encoding. Fails on empty or null primary-key values.
    pub fn from_primary_key(values: &[ScalarValue]) -> Result<Self> {
        encode_record_id_bytes(values).map(Self)
    }

    /// Wraps pre-encoded record-id bytes received from the remote store.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// In-flight row image plus its logical record identifier.
///
/// Rows routed through the remote-backed path must carry a record id before
/// index maintenance executes; `None` is a contract violation the coordinator
/// reports and absorbs per index.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub values: Vec<ScalarValue>,
    pub record_id: Option<RecordId>,
}

impl RowRecord {
    pub fn new(values: Vec<ScalarValue>, record_id: RecordId) -> Self {
        Self {
            values,
            record_id: Some(record_id),
        }
    }
}

/// Transaction/session context handle threaded through every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteSession {
    pub txn_id: u64,
}

impl RemoteSession {
    pub fn new(txn_id: u64) -> Self {
        Self { txn_id }
    }
}

/// One matched index entry returned by a remote entry scan.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Indexed-column values, in index key order. Empty for primary-index
    /// scans, whose entries are the base rows themselves.
    pub key_values: Vec<ScalarValue>,
    /// Non-key values stored alongside the entry, in include-column order.
    pub include_values: Vec<ScalarValue>,
    /// Back-reference to the owning row.
    pub record_id: RecordId,
    /// `true` when the store cannot guarantee exact predicate satisfaction
    /// and the caller must re-evaluate the predicate against the row.
    pub recheck: bool,
}

/// Result of a remote index-entry insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Applied,
    /// Uniqueness enforcement was requested and an entry with equal key
    /// values but a different owning row already exists.
    DuplicateKey,
}

/// Result of a remote by-value index-entry delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Applied,
    /// No matching entry existed; treated as a successful no-op upstream.
    NotFound,
}

/// Equality predicate over the leading key columns of an index. An empty
/// value list scans the whole index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanPredicate {
    pub key_values: Vec<ScalarValue>,
}

impl ScanPredicate {
    pub fn equals(key_values: Vec<ScalarValue>) -> Self {
        Self { key_values }
    }

    /// Whole-index range scan.
    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Iteration direction of a remote entry scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// Streaming handle over matched index entries of one remote query.
#[async_trait]
pub trait EntryCursor: Send {
    /// Advances one step; `Ok(None)` signals exhaustion and is terminal.
    async fn next(&mut self) -> Result<Option<IndexEntry>>;

    /// Releases the remote query. Further `next` calls are invalid.
    async fn close(&mut self) -> Result<()>;
}

/// Streaming handle over base rows of one full-table scan.
#[async_trait]
pub trait RowCursor: Send {
    async fn next(&mut self) -> Result<Option<RowRecord>>;

    async fn close(&mut self) -> Result<()>;
}

/// Remote storage client as seen by index maintenance and scan execution.
///
/// Implementations own key layout, placement, replication and transactional
/// visibility; this crate only issues well-formed requests. Any error
/// returned here aborts the enclosing statement; retry policy belongs to
/// the client or the transaction manager, never to this crate.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Inserts one index entry carrying the given key values, include-column
    /// payload, and owning record id. `unique_check` requests uniqueness
    /// enforcement and is set only for indexes declared unique.
    async fn insert_entry(
        &self,
        session: RemoteSession,
        index: &IndexDescriptor,
        key_values: &[ScalarValue],
        include_values: &[ScalarValue],
        record_id: &RecordId,
        unique_check: bool,
    ) -> Result<InsertOutcome>;

    /// Deletes the entry matching exactly these key values and record id.
    async fn delete_entry(
        &self,
        session: RemoteSession,
        index: &IndexDescriptor,
        key_values: &[ScalarValue],
        record_id: &RecordId,
    ) -> Result<DeleteOutcome>;

    /// Deletes every entry of the index owned by `record_id`, regardless of
    /// key values. Returns the number of entries removed.
    async fn delete_all_by_record_id(
        &self,
        session: RemoteSession,
        index: &IndexDescriptor,
        record_id: &RecordId,
    ) -> Result<u64>;

    /// Opens a range/point query over the index scoped to `predicate`.
    /// `limit_hint` is best-effort: the store may return fewer or exactly
    /// that many entries, never more.
    async fn scan_entries(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
        index: &IndexDescriptor,
        predicate: &ScanPredicate,
        direction: ScanDirection,
        limit_hint: Option<usize>,
    ) -> Result<Box<dyn EntryCursor>>;

    /// Opens a full forward scan over the table's base rows in record-id
    /// order. Used by the index build driver.
    async fn scan_rows(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
    ) -> Result<Box<dyn RowCursor>>;

    /// Resolves a record id to its base row, or `None` when the row no
    /// longer exists under this session's visibility.
    async fn fetch_row_by_record_id(
        &self,
        session: RemoteSession,
        table: &TableDescriptor,
        record_id: &RecordId,
    ) -> Result<Option<RowRecord>>;
}
