//! Coordinator behavior: skip rules, unique-check propagation, delete
//! strategies and update handling, asserted against the in-memory store and
//! the recording wrapper.

mod common;

use std::sync::Arc;

use datafusion::common::ScalarValue;
use strata_index::{
    update_touches_indexes, DeleteStrategy, DuplicateKeyViolation, IndexMaintenance, IndexMetrics,
    IndexState, MemoryStore, RemoteStore, RowCache,
};

use common::{RecordingStore, RemoteCall};

fn coordinator(store: Arc<dyn RemoteStore>) -> (IndexMaintenance, Arc<IndexMetrics>) {
    let metrics = Arc::new(IndexMetrics::default());
    (IndexMaintenance::new(store, metrics.clone()), metrics)
}

#[tokio::test]
async fn insert_on_primary_only_table_issues_no_remote_calls() {
    let store = Arc::new(RecordingStore::new(MemoryStore::new()));
    let (maintenance, metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let row = common::order_row(1, 100, Some("open"), 2500);

    maintenance
        .insert_index_entries(common::session(), &table, &[common::primary_index()], &row)
        .await
        .unwrap();

    assert!(store.calls().is_empty());
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.skipped_primary, 1);
    assert_eq!(snapshot.entries_inserted, 0);
}

#[tokio::test]
async fn insert_skips_backfilling_index_without_remote_calls() {
    let store = Arc::new(RecordingStore::new(MemoryStore::new()));
    let (maintenance, metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let index = common::total_index(IndexState::Backfilling);
    let row = common::order_row(1, 100, Some("open"), 2500);

    maintenance
        .insert_index_entries(common::session(), &table, &[index.clone()], &row)
        .await
        .unwrap();

    assert!(store.calls().is_empty());
    assert_eq!(store.inner().entry_count(&index), 0);
    assert_eq!(metrics.snapshot().skipped_backfilling, 1);
}

#[tokio::test]
async fn insert_without_record_id_is_reported_and_absorbed() {
    let store = Arc::new(RecordingStore::new(MemoryStore::new()));
    let (maintenance, metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let index = common::status_index();
    let mut row = common::order_row(1, 100, Some("open"), 2500);
    row.record_id = None;

    maintenance
        .insert_index_entries(common::session(), &table, &[index.clone()], &row)
        .await
        .unwrap();

    assert!(store.calls().is_empty());
    assert_eq!(store.inner().entry_count(&index), 0);
    assert_eq!(metrics.snapshot().skipped_missing_record_id, 1);
}

#[tokio::test]
async fn unique_check_flag_follows_index_declaration() {
    let store = Arc::new(RecordingStore::new(MemoryStore::new()));
    let (maintenance, _metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let indexes = [common::status_index(), common::customer_unique_index()];
    let row = common::order_row(1, 100, Some("open"), 2500);

    maintenance
        .insert_index_entries(common::session(), &table, &indexes, &row)
        .await
        .unwrap();

    assert_eq!(
        store.calls(),
        vec![
            RemoteCall::InsertEntry {
                index_id: common::STATUS_INDEX_ID,
                unique_check: false,
            },
            RemoteCall::InsertEntry {
                index_id: common::CUSTOMER_UNIQUE_INDEX_ID,
                unique_check: true,
            },
        ]
    );
}

#[tokio::test]
async fn duplicate_key_escalates_as_statement_error() {
    let store = Arc::new(MemoryStore::new());
    let (maintenance, metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let indexes = [common::customer_unique_index()];

    maintenance
        .insert_index_entries(
            common::session(),
            &table,
            &indexes,
            &common::order_row(1, 100, Some("open"), 2500),
        )
        .await
        .unwrap();
    // Same customer_id under a different primary key violates the constraint.
    let err = maintenance
        .insert_index_entries(
            common::session(),
            &table,
            &indexes,
            &common::order_row(2, 100, Some("open"), 900),
        )
        .await
        .unwrap_err();

    let violation = err
        .downcast_ref::<DuplicateKeyViolation>()
        .expect("duplicate key violation");
    assert_eq!(violation.index_name, "uq_orders_customer");
    assert_eq!(metrics.snapshot().duplicate_key_conflicts, 1);
    assert_eq!(store.entry_count(&common::customer_unique_index()), 1);
}

#[tokio::test]
async fn reinserting_the_same_row_is_not_a_unique_conflict() {
    let store = Arc::new(MemoryStore::new());
    let (maintenance, _metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let indexes = [common::customer_unique_index()];
    let row = common::order_row(1, 100, Some("open"), 2500);

    for _ in 0..2 {
        maintenance
            .insert_index_entries(common::session(), &table, &indexes, &row)
            .await
            .unwrap();
    }

    assert_eq!(store.entry_count(&common::customer_unique_index()), 1);
}

#[tokio::test]
async fn by_value_delete_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let (maintenance, metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let indexes = [common::status_index()];
    let row = common::order_row(1, 100, Some("open"), 2500);

    maintenance
        .insert_index_entries(common::session(), &table, &indexes, &row)
        .await
        .unwrap();
    maintenance
        .delete_index_entries(
            common::session(),
            &table,
            &indexes,
            &row,
            DeleteStrategy::ByValue,
        )
        .await
        .unwrap();
    // Second delete finds nothing and still succeeds.
    maintenance
        .delete_index_entries(
            common::session(),
            &table,
            &indexes,
            &row,
            DeleteStrategy::ByValue,
        )
        .await
        .unwrap();

    assert_eq!(store.entry_count(&common::status_index()), 0);
    assert_eq!(metrics.snapshot().entries_deleted, 1);
}

#[tokio::test]
async fn bulk_delete_removes_only_this_rows_entries() {
    let store = Arc::new(MemoryStore::new());
    let (maintenance, metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let indexes = [common::status_index(), common::customer_unique_index()];
    let doomed = common::order_row(1, 100, Some("open"), 2500);
    let survivor = common::order_row(2, 200, Some("open"), 900);

    for row in [&doomed, &survivor] {
        maintenance
            .insert_index_entries(common::session(), &table, &indexes, row)
            .await
            .unwrap();
    }
    maintenance
        .delete_index_entries(
            common::session(),
            &table,
            &indexes,
            &doomed,
            DeleteStrategy::ByRecordId,
        )
        .await
        .unwrap();

    let survivor_id = common::record_id_for_order(2);
    for index in &indexes {
        let remaining = store.index_entries(index);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].1, survivor_id);
    }
    assert_eq!(metrics.snapshot().bulk_deletes, 2);
}

#[tokio::test]
async fn update_moves_entries_to_the_new_key() {
    let store = Arc::new(MemoryStore::new());
    let (maintenance, _metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let indexes = [common::status_index()];
    let old_row = common::order_row(1, 100, Some("open"), 2500);
    let new_row = common::order_row(1, 100, Some("shipped"), 2500);

    maintenance
        .insert_index_entries(common::session(), &table, &indexes, &old_row)
        .await
        .unwrap();
    maintenance
        .apply_update(common::session(), &table, &indexes, &new_row)
        .await
        .unwrap();

    let entries = store.index_entries(&common::status_index());
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].0,
        vec![ScalarValue::Utf8(Some("shipped".to_string()))]
    );
    assert_eq!(entries[0].1, common::record_id_for_order(1));
}

#[tokio::test]
async fn update_refreshes_the_row_cache_between_phases() {
    let store = Arc::new(MemoryStore::new());
    let metrics = Arc::new(IndexMetrics::default());
    let cache = Arc::new(RowCache::new());
    let maintenance = IndexMaintenance::new(store, metrics).with_row_cache(cache.clone());
    let table = common::orders_table();
    let indexes = [common::status_index()];
    let old_row = common::order_row(1, 100, Some("open"), 2500);
    let new_row = common::order_row(1, 100, Some("shipped"), 2500);

    maintenance
        .insert_index_entries(common::session(), &table, &indexes, &old_row)
        .await
        .unwrap();
    maintenance
        .apply_update(common::session(), &table, &indexes, &new_row)
        .await
        .unwrap();

    let record_id = common::record_id_for_order(1);
    assert_eq!(cache.get(&record_id), Some(new_row.values.clone()));

    maintenance
        .delete_index_entries(
            common::session(),
            &table,
            &indexes,
            &new_row,
            DeleteStrategy::ByRecordId,
        )
        .await
        .unwrap();
    assert_eq!(cache.get(&record_id), None);
}

#[tokio::test]
async fn update_without_record_id_is_absorbed() {
    let store = Arc::new(RecordingStore::new(MemoryStore::new()));
    let (maintenance, metrics) = coordinator(store.clone());
    let table = common::orders_table();
    let mut row = common::order_row(1, 100, Some("open"), 2500);
    row.record_id = None;

    maintenance
        .apply_update(common::session(), &table, &[common::status_index()], &row)
        .await
        .unwrap();

    assert!(store.calls().is_empty());
    assert_eq!(metrics.snapshot().skipped_missing_record_id, 1);
}

#[test]
fn in_place_update_of_unindexed_column_bypasses_maintenance() {
    let table = common::orders_table();
    let indexes = [
        common::primary_index(),
        common::status_index(),
        common::total_index(IndexState::Ready),
    ];
    let old_row = common::order_row(1, 100, Some("open"), 2500);

    // Only the note column changes; no secondary index references it.
    let mut note_only = old_row.values.clone();
    note_only[4] = ScalarValue::Utf8(Some("gift wrap".to_string()));
    assert!(!update_touches_indexes(&table, &indexes, &old_row.values, &note_only).unwrap());

    // A changed key column requires maintenance.
    let mut status_changed = old_row.values.clone();
    status_changed[2] = ScalarValue::Utf8(Some("shipped".to_string()));
    assert!(update_touches_indexes(&table, &indexes, &old_row.values, &status_changed).unwrap());

    // So does a changed include column of the covering index, even when no
    // key column moved.
    let covering_only = [common::total_index(IndexState::Ready)];
    let mut include_changed = old_row.values.clone();
    include_changed[2] = ScalarValue::Utf8(None);
    assert!(
        update_touches_indexes(&table, &covering_only, &old_row.values, &include_changed).unwrap()
    );
}

#[tokio::test]
async fn maintenance_rejects_tables_outside_the_remote_path() {
    let store = Arc::new(MemoryStore::new());
    let (maintenance, _metrics) = coordinator(store);
    let mut table = common::orders_table();
    table.remote_backed = false;
    let row = common::order_row(1, 100, Some("open"), 2500);

    let err = maintenance
        .insert_index_entries(common::session(), &table, &[common::status_index()], &row)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not remote-backed"));
}
