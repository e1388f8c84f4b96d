//! Tests for Catalog
//!
//! These tests verify:
//! - Schema creation and the conf log
//! - Page row insert, lookup and range queries
//! - Page id allocation that never reuses ids
//! - Soft and hard deletes
//! - Read-only snapshots

use pagestore::catalog::Catalog;
use pagestore::{
    Compression, ElementType, IndexType, IndexValue, PageMeta, PageStoreError, RecordLayout,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_catalog() -> (TempDir, Catalog) {
    let temp_dir = TempDir::new().unwrap();
    let catalog = Catalog::open(&temp_dir.path().join("catalog.db")).unwrap();
    (temp_dir, catalog)
}

fn meta(page_id: u64, low: i64, high: i64) -> PageMeta {
    PageMeta {
        page_id,
        index_type: IndexType::Int64,
        count: (high - low + 1) as u64,
        index_low: IndexValue::Int(low),
        index_high: IndexValue::Int(high),
        record_type: ElementType::Float64,
        record_layout: RecordLayout::Scalar,
        record_size: ((high - low + 1) * 8) as u64,
        compression: Compression::None,
        created_at: 1_700_000_000_000,
        checksum: Some("deadbeef".to_string()),
    }
}

fn insert(catalog: &Catalog, variable: &str, low: i64, high: i64) -> u64 {
    catalog
        .transaction(|tx| {
            let id = tx.next_page_id()?;
            tx.insert_page_row(variable, &meta(id, low, high))?;
            Ok(id)
        })
        .unwrap()
}

// =============================================================================
// Conf Log Tests
// =============================================================================

#[test]
fn test_conf_last_write_wins() {
    let (_dir, catalog) = setup_temp_catalog();

    assert_eq!(catalog.get_var("pagedir").unwrap(), None);
    catalog.set_var("pagedir", "/a").unwrap();
    catalog.set_var("pagedir", "/b").unwrap();
    catalog.set_var("other", "1").unwrap();

    assert_eq!(catalog.get_var("pagedir").unwrap(), Some("/b".to_string()));

    let entries = catalog.conf_entries().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].variable, "other");
    assert_eq!(entries[1].value, "/a");
    assert_eq!(entries[2].value, "/b");
}

// =============================================================================
// Pages Table Tests
// =============================================================================

#[test]
fn test_insert_and_lookup_page() {
    let (_dir, catalog) = setup_temp_catalog();
    let id = insert(&catalog, "temp", 0, 9);
    assert_eq!(id, 1);

    let row = catalog.page(id).unwrap().unwrap();
    assert_eq!(row.name, "temp");
    assert_eq!(row.meta, meta(1, 0, 9));
    assert_eq!(row.deleted_at, None);

    assert!(catalog.page(42).unwrap().is_none());
}

#[test]
fn test_float_bounds_keep_their_type() {
    let (_dir, catalog) = setup_temp_catalog();
    let mut float_meta = meta(1, 0, 0);
    float_meta.index_type = IndexType::Float64;
    float_meta.index_low = IndexValue::Float(0.25);
    float_meta.index_high = IndexValue::Float(9.75);
    catalog.insert_page_row("x", &float_meta).unwrap();

    let row = catalog.page(1).unwrap().unwrap();
    assert!(matches!(row.meta.index_low, IndexValue::Float(v) if v == 0.25));
    assert!(matches!(row.meta.index_high, IndexValue::Float(v) if v == 9.75));
}

#[test]
fn test_find_pages_by_range() {
    let (_dir, catalog) = setup_temp_catalog();
    insert(&catalog, "temp", 20, 29);
    insert(&catalog, "temp", 0, 9);
    insert(&catalog, "temp", 10, 19);
    insert(&catalog, "other", 0, 100);

    let pages = catalog
        .find_pages("temp", IndexValue::Int(5), IndexValue::Int(15))
        .unwrap();
    let lows: Vec<IndexValue> = pages.iter().map(|m| m.index_low).collect();
    assert_eq!(lows, vec![IndexValue::Int(0), IndexValue::Int(10)]);

    // Bounds touching a page edge are inclusive
    let pages = catalog
        .find_pages("temp", IndexValue::Int(29), IndexValue::Int(40))
        .unwrap();
    assert_eq!(pages.len(), 1);

    // Float bounds compare numerically with integer rows
    let pages = catalog
        .find_pages("temp", IndexValue::Float(9.5), IndexValue::Float(9.9))
        .unwrap();
    assert!(pages.is_empty());

    assert_eq!(catalog.pages_for("temp").unwrap().len(), 3);
}

#[test]
fn test_get_bounds_fills_missing_limits() {
    let (_dir, catalog) = setup_temp_catalog();
    assert_eq!(catalog.get_bounds("temp", None, None).unwrap(), None);
    assert_eq!(
        catalog
            .get_bounds("temp", Some(IndexValue::Int(1)), Some(IndexValue::Int(2)))
            .unwrap(),
        Some((IndexValue::Int(1), IndexValue::Int(2)))
    );

    insert(&catalog, "temp", 5, 9);
    insert(&catalog, "temp", 10, 30);
    assert_eq!(
        catalog.get_bounds("temp", None, None).unwrap(),
        Some((IndexValue::Int(5), IndexValue::Int(30)))
    );
    assert_eq!(
        catalog.get_bounds("temp", Some(IndexValue::Int(7)), None).unwrap(),
        Some((IndexValue::Int(7), IndexValue::Int(30)))
    );
}

#[test]
fn test_search_variables() {
    let (_dir, catalog) = setup_temp_catalog();
    insert(&catalog, "sensor.a", 0, 1);
    insert(&catalog, "sensor.b", 0, 1);
    insert(&catalog, "sensor.b", 2, 3);
    insert(&catalog, "pump", 0, 1);

    assert_eq!(
        catalog.search_variables("sensor%").unwrap(),
        vec!["sensor.a".to_string(), "sensor.b".to_string()]
    );
    assert_eq!(catalog.search_variables("%").unwrap().len(), 3);
    assert_eq!(catalog.variable_count().unwrap(), 3);
}

#[test]
fn test_stats() {
    let (_dir, catalog) = setup_temp_catalog();
    let empty = catalog.stats(None).unwrap();
    assert_eq!(empty.pages, 0);
    assert_eq!(empty.records, 0);

    insert(&catalog, "a", 0, 9);
    insert(&catalog, "a", 10, 29);
    insert(&catalog, "b", 0, 4);

    let stats = catalog.stats(None).unwrap();
    assert_eq!(stats.variables, 2);
    assert_eq!(stats.pages, 3);
    assert_eq!(stats.records, 35);
    assert_eq!(stats.total_bytes, 280);

    let stats = catalog.stats(Some("a")).unwrap();
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.records, 30);
    assert_eq!(stats.average_bytes, 120.0);
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_soft_delete_hides_page() {
    let (_dir, catalog) = setup_temp_catalog();
    let id = insert(&catalog, "temp", 0, 9);

    catalog.soft_or_hard_delete_row(id, true).unwrap();

    assert!(catalog.pages_for("temp").unwrap().is_empty());
    assert!(catalog.search_variables("%").unwrap().is_empty());
    let row = catalog.page(id).unwrap().unwrap();
    assert!(row.deleted_at.is_some());

    let deleted = catalog.deleted_before(i64::MAX).unwrap();
    assert_eq!(deleted.len(), 1);
    assert!(catalog.deleted_before(0).unwrap().is_empty());

    // A page can only be retired once
    assert!(matches!(
        catalog.soft_or_hard_delete_row(id, true),
        Err(PageStoreError::InvalidArgument(_))
    ));
}

#[test]
fn test_page_ids_never_reused() {
    let (_dir, catalog) = setup_temp_catalog();
    insert(&catalog, "temp", 0, 9);
    let second = insert(&catalog, "temp", 10, 19);
    assert_eq!(second, 2);

    catalog.soft_or_hard_delete_row(second, false).unwrap();
    assert!(catalog.page(second).unwrap().is_none());

    // A second writer retiring the same page finds nothing to remove
    assert!(matches!(
        catalog.soft_or_hard_delete_row(second, false),
        Err(PageStoreError::InvalidArgument(_))
    ));

    assert_eq!(catalog.next_page_id().unwrap(), 3);
    assert_eq!(insert(&catalog, "temp", 20, 29), 3);
}

#[test]
fn test_purge_only_removes_deleted_rows() {
    let (_dir, catalog) = setup_temp_catalog();
    let live = insert(&catalog, "temp", 0, 9);
    let retired = insert(&catalog, "temp", 10, 19);
    catalog.soft_or_hard_delete_row(retired, true).unwrap();

    assert!(matches!(
        catalog.transaction(|tx| tx.purge_deleted_row(live)),
        Err(PageStoreError::InvalidArgument(_))
    ));
    catalog
        .transaction(|tx| {
            assert_eq!(tx.deleted_before(i64::MAX)?.len(), 1);
            tx.purge_deleted_row(retired)
        })
        .unwrap();

    assert!(catalog.page(retired).unwrap().is_none());
    assert_eq!(catalog.pages_for("temp").unwrap().len(), 1);
    assert_eq!(catalog.next_page_id().unwrap(), 3);
}

#[test]
fn test_failed_transaction_rolls_back() {
    let (_dir, catalog) = setup_temp_catalog();

    let result: pagestore::Result<()> = catalog.transaction(|tx| {
        tx.insert_page_row("temp", &meta(1, 0, 9))?;
        Err(PageStoreError::InvalidArgument("abort".to_string()))
    });
    assert!(result.is_err());
    assert!(catalog.page(1).unwrap().is_none());
}

// =============================================================================
// Read-Only Tests
// =============================================================================

#[test]
fn test_read_only_snapshot() {
    let (dir, catalog) = setup_temp_catalog();
    insert(&catalog, "temp", 0, 9);

    let path = dir.path().join("catalog.db");
    let snapshot = Catalog::open_read_only(&path).unwrap();
    assert!(snapshot.is_read_only());
    assert_eq!(snapshot.pages_for("temp").unwrap().len(), 1);

    // Later writes to the source are not visible in the snapshot
    insert(&catalog, "temp", 10, 19);
    assert_eq!(snapshot.pages_for("temp").unwrap().len(), 1);

    assert!(matches!(
        snapshot.set_var("x", "1"),
        Err(PageStoreError::ReadOnly)
    ));
    assert!(matches!(
        snapshot.soft_or_hard_delete_row(1, true),
        Err(PageStoreError::ReadOnly)
    ));
}
