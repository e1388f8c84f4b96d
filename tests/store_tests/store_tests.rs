//! Tests for Store
//!
//! These tests verify:
//! - Opening a store and persisting its settings
//! - Range reads across several pages
//! - Upsert merges where new values win
//! - Input validation
//! - Read-only mode and checksum-on-read
//! - Multi-variable reads and writes

use std::collections::BTreeMap;
use std::fs;

use pagestore::store::{MAX_PAGE_SIZE_VAR, PAGE_DIR_VAR};
use pagestore::{
    Column, Compression, Config, IndexArray, IndexValue, PageStoreError, Records, Series, Store,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Store with rebalancing disabled, so every write keeps its own pages
fn setup_temp_store() -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .catalog_path(temp_dir.path().join("catalog.db"))
        .max_page_size(0)
        .build();
    let store = Store::open(config).unwrap();
    (temp_dir, store)
}

fn reopen(dir: &TempDir, read_only: bool) -> Store {
    let config = Config::builder()
        .catalog_path(dir.path().join("catalog.db"))
        .read_only(read_only)
        .build();
    Store::open(config).unwrap()
}

fn ints(values: &[i64]) -> IndexArray {
    IndexArray::from(values.to_vec())
}

fn floats(values: &[f64]) -> Records {
    Records::scalar(values.to_vec())
}

/// `count` records starting at `start`, value = 10 * index
fn store_range(store: &Store, variable: &str, start: i64, count: i64) {
    let index: Vec<i64> = (start..start + count).collect();
    let values: Vec<f64> = index.iter().map(|&i| i as f64 * 10.0).collect();
    store
        .store_variable(variable, &IndexArray::from(index), &Records::scalar(values))
        .unwrap();
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_open_creates_page_dir_and_records_settings() {
    let temp_dir = TempDir::new().unwrap();
    let catalog_path = temp_dir.path().join("db").join("catalog.db");
    let config = Config::builder()
        .catalog_path(&catalog_path)
        .max_page_size(4096)
        .build();
    let store = Store::open(config).unwrap();

    assert!(catalog_path.exists());
    assert_eq!(store.page_dir(), temp_dir.path().join("db").join("data"));
    assert!(store.page_dir().is_dir());
    assert_eq!(store.max_page_size(), 4096);

    assert_eq!(
        store.get_var(PAGE_DIR_VAR).unwrap(),
        Some(store.page_dir().to_string_lossy().into_owned())
    );
    assert_eq!(
        store.get_var(MAX_PAGE_SIZE_VAR).unwrap(),
        Some("4096".to_string())
    );
}

#[test]
fn test_reopen_uses_recorded_settings() {
    let temp_dir = TempDir::new().unwrap();
    let custom_dir = temp_dir.path().join("pages");
    let config = Config::builder()
        .catalog_path(temp_dir.path().join("catalog.db"))
        .page_dir(&custom_dir)
        .max_page_size(1000)
        .build();
    let store = Store::open(config).unwrap();
    store_range(&store, "temp", 0, 5);
    drop(store);

    let store = reopen(&temp_dir, false);
    assert_eq!(store.page_dir(), custom_dir);
    assert_eq!(store.max_page_size(), 1000);
    assert_eq!(store.count("temp", None, None).unwrap(), 5);

    // Unchanged settings are not logged again
    let entries = store.conf_entries().unwrap();
    assert_eq!(entries.iter().filter(|e| e.variable == PAGE_DIR_VAR).count(), 1);
    assert_eq!(entries.iter().filter(|e| e.variable == MAX_PAGE_SIZE_VAR).count(), 1);
}

#[test]
fn test_default_max_page_size() {
    let temp_dir = TempDir::new().unwrap();
    let store = reopen(&temp_dir, false);
    assert_eq!(store.max_page_size(), 1 << 24);
    assert_eq!(store.get_var(MAX_PAGE_SIZE_VAR).unwrap(), None);
}

#[test]
fn test_delete_store_removes_everything() {
    let (temp_dir, store) = setup_temp_store();
    store_range(&store, "temp", 0, 10);
    let page_dir = store.page_dir().to_path_buf();

    store.delete().unwrap();
    assert!(!page_dir.exists());
    assert!(!temp_dir.path().join("catalog.db").exists());
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_store_and_get_round_trip() {
    let (_dir, store) = setup_temp_store();
    store
        .store_variable("temp", &ints(&[1, 2, 3]), &floats(&[20.5, 21.0, 21.5]))
        .unwrap();

    let series = store.get("temp", None, None).unwrap();
    assert_eq!(series.index, ints(&[1, 2, 3]));
    assert_eq!(series.records, floats(&[20.5, 21.0, 21.5]));
}

#[test]
fn test_get_range_across_pages() {
    let (_dir, store) = setup_temp_store();
    for page in 0..10 {
        store_range(&store, "temp", page * 10, 10);
    }
    assert_eq!(store.pages("temp").unwrap().len(), 10);

    let series = store.get_range("temp", 0i64, 99i64).unwrap();
    assert_eq!(series.len(), 100);

    // Interior pages are read whole, edge pages are cut
    let series = store.get_range("temp", 15i64, 25i64).unwrap();
    assert_eq!(series.len(), 11);
    assert_eq!(series.index.first(), Some(IndexValue::Int(15)));
    assert_eq!(series.index.last(), Some(IndexValue::Int(25)));
    assert_eq!(series.records.row(0), Some(Column::Float64(vec![150.0])));

    let series = store.get("temp", Some(IndexValue::Int(95)), None).unwrap();
    assert_eq!(series.index, ints(&[95, 96, 97, 98, 99]));

    assert_eq!(store.count("temp", Some(IndexValue::Int(15)), Some(IndexValue::Int(64))).unwrap(), 50);
    assert_eq!(store.count("temp", None, None).unwrap(), 100);
}

#[test]
fn test_get_unknown_variable_is_empty() {
    let (_dir, store) = setup_temp_store();
    assert!(store.get("missing", None, None).unwrap().is_empty());
    assert!(store.get_range("missing", 0i64, 10i64).unwrap().is_empty());
    assert_eq!(store.get_index("missing", None, None).unwrap(), None);
    assert_eq!(store.count("missing", None, None).unwrap(), 0);
}

#[test]
fn test_get_range_outside_data_is_empty() {
    let (_dir, store) = setup_temp_store();
    store_range(&store, "temp", 0, 10);
    store_range(&store, "temp", 20, 10);

    assert!(store.get_range("temp", 12i64, 18i64).unwrap().is_empty());
    assert!(store.get_range("temp", 100i64, 200i64).unwrap().is_empty());
}

#[test]
fn test_get_index_only() {
    let (_dir, store) = setup_temp_store();
    store_range(&store, "temp", 0, 10);
    store_range(&store, "temp", 10, 10);

    let index = store
        .get_index("temp", Some(IndexValue::Int(8)), Some(IndexValue::Float(11.5)))
        .unwrap()
        .unwrap();
    assert_eq!(index, ints(&[8, 9, 10, 11]));
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_new_values_win() {
    let (_dir, store) = setup_temp_store();
    store
        .store_variable("x", &ints(&[1, 3, 5]), &floats(&[10.0, 30.0, 50.0]))
        .unwrap();
    store
        .store_variable("x", &ints(&[2, 3, 4]), &floats(&[20.0, 35.0, 40.0]))
        .unwrap();

    let series = store.get("x", None, None).unwrap();
    assert_eq!(series.index, ints(&[1, 2, 3, 4, 5]));
    assert_eq!(series.records, floats(&[10.0, 20.0, 35.0, 40.0, 50.0]));

    // The merged page replaced the original one
    assert_eq!(store.pages("x").unwrap().len(), 1);
}

#[test]
fn test_store_is_idempotent() {
    let (_dir, store) = setup_temp_store();
    store_range(&store, "temp", 0, 50);
    let first = store.get("temp", None, None).unwrap();

    store_range(&store, "temp", 0, 50);
    let second = store.get("temp", None, None).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.count("temp", None, None).unwrap(), 50);
}

#[test]
fn test_write_spanning_pages_keeps_them_disjoint() {
    let (_dir, store) = setup_temp_store();
    store_range(&store, "temp", 0, 10);
    store_range(&store, "temp", 20, 10);
    store_range(&store, "temp", 40, 10);

    // Overlaps the first two pages, fills the gaps and runs past the end
    let index: Vec<i64> = (5..60).step_by(2).collect();
    let values: Vec<f64> = index.iter().map(|&i| -(i as f64)).collect();
    store
        .store_variable("temp", &IndexArray::from(index.clone()), &Records::scalar(values))
        .unwrap();

    let pages = store.pages("temp").unwrap();
    for pair in pages.windows(2) {
        assert!(pair[0].index_high < pair[1].index_low);
    }

    let series = store.get("temp", None, None).unwrap();
    assert!(series.index.is_strictly_ascending());
    for i in 0..series.len() {
        let key = match series.index.get(i).unwrap() {
            IndexValue::Int(k) => k,
            other => panic!("unexpected index {:?}", other),
        };
        let expected = if key >= 5 && key % 2 == 1 {
            -(key as f64)
        } else {
            key as f64 * 10.0
        };
        assert_eq!(series.records.row(i), Some(Column::Float64(vec![expected])));
    }
}

#[test]
fn test_merge_ragged_records() {
    let (_dir, store) = setup_temp_store();
    store
        .store_variable(
            "tags",
            &ints(&[1, 2]),
            &Records::ragged(vec![1, 2], vec!["a", "b", "c"]).unwrap(),
        )
        .unwrap();
    store
        .store_variable("tags", &ints(&[2, 3]), &Records::ragged(vec![0, 1], vec!["d"]).unwrap())
        .unwrap();

    let series = store.get("tags", None, None).unwrap();
    assert_eq!(series.index, ints(&[1, 2, 3]));
    assert_eq!(series.records.row(0), Some(Column::Text(vec!["a".to_string()])));
    assert_eq!(series.records.row(1), Some(Column::Text(vec![])));
    assert_eq!(series.records.row(2), Some(Column::Text(vec!["d".to_string()])));
}

#[test]
fn test_gzip_store() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .catalog_path(temp_dir.path().join("catalog.db"))
        .compression(Compression::Gzip)
        .build();
    let store = Store::open(config).unwrap();
    store_range(&store, "temp", 0, 100);
    store_range(&store, "temp", 50, 100);

    let pages = store.pages("temp").unwrap();
    assert!(pages.iter().all(|m| m.compression == Compression::Gzip));
    assert_eq!(store.count("temp", None, None).unwrap(), 150);
    assert!(store.verify(None).unwrap().is_empty());
}

#[test]
fn test_float_index_store() {
    let (_dir, store) = setup_temp_store();
    store
        .store_variable(
            "f",
            &IndexArray::from(vec![0.5, 1.5, 2.5]),
            &Records::scalar(vec![1i32, 2, 3]),
        )
        .unwrap();

    let series = store
        .get("f", Some(IndexValue::Int(1)), Some(IndexValue::Int(2)))
        .unwrap();
    assert_eq!(series.index, IndexArray::from(vec![1.5]));
    assert_eq!(series.records, Records::scalar(vec![2i32]));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_empty_store_is_noop() {
    let (_dir, store) = setup_temp_store();
    store
        .store_variable("temp", &ints(&[]), &floats(&[]))
        .unwrap();
    assert!(store.pages("temp").unwrap().is_empty());
}

#[test]
fn test_length_mismatch() {
    let (_dir, store) = setup_temp_store();
    let err = store
        .store_variable("temp", &ints(&[1, 2, 3]), &floats(&[1.0]))
        .unwrap_err();
    assert!(matches!(
        err,
        PageStoreError::LengthMismatch { index: 3, records: 1 }
    ));
}

#[test]
fn test_unsorted_or_duplicate_input() {
    let (_dir, store) = setup_temp_store();
    let err = store
        .store_variable("temp", &ints(&[1, 3, 2]), &floats(&[1.0, 2.0, 3.0]))
        .unwrap_err();
    assert!(matches!(err, PageStoreError::UnsortedInput { position: 2 }));

    let err = store
        .store_variable("temp", &ints(&[1, 1]), &floats(&[1.0, 2.0]))
        .unwrap_err();
    assert!(matches!(err, PageStoreError::UnsortedInput { position: 1 }));

    assert!(store.pages("temp").unwrap().is_empty());
}

#[test]
fn test_mismatched_types_rejected() {
    let (_dir, store) = setup_temp_store();
    store_range(&store, "temp", 0, 10);

    let err = store
        .store_variable("temp", &IndexArray::from(vec![100.0]), &floats(&[1.0]))
        .unwrap_err();
    assert!(matches!(err, PageStoreError::TypeMismatch(_)));

    let err = store
        .store_variable("temp", &ints(&[5]), &Records::scalar(vec![1i32]))
        .unwrap_err();
    assert!(matches!(err, PageStoreError::TypeMismatch(_)));

    assert_eq!(store.count("temp", None, None).unwrap(), 10);
}

#[test]
fn test_mismatched_record_type_past_last_page() {
    let (_dir, store) = setup_temp_store();
    store
        .store_variable("x", &ints(&[1, 2, 3]), &floats(&[1.0, 2.0, 3.0]))
        .unwrap();

    // Lands entirely after the stored page, so no merge would notice
    let err = store
        .store_variable("x", &ints(&[10, 11]), &Records::scalar(vec![1i32, 2]))
        .unwrap_err();
    assert!(matches!(err, PageStoreError::TypeMismatch(_)));
    assert_eq!(store.pages("x").unwrap().len(), 1);
    assert_eq!(store.get("x", None, None).unwrap().len(), 3);

    store
        .store_variable("x", &ints(&[10, 11]), &floats(&[10.0, 11.0]))
        .unwrap();
    assert_eq!(store.count("x", None, None).unwrap(), 5);
}

#[test]
fn test_mismatched_record_type_with_rebalancing() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .catalog_path(temp_dir.path().join("catalog.db"))
        .build();
    let store = Store::open(config).unwrap();
    store
        .store_variable("x", &ints(&[1, 2, 3]), &floats(&[1.0, 2.0, 3.0]))
        .unwrap();

    assert!(matches!(
        store.store_variable("x", &ints(&[10, 11]), &Records::scalar(vec![1i32, 2])),
        Err(PageStoreError::TypeMismatch(_))
    ));
    // Nothing of the rejected write is left behind
    assert_eq!(store.pages("x").unwrap().len(), 1);
    assert_eq!(store.get("x", None, None).unwrap().index, ints(&[1, 2, 3]));
}

#[test]
fn test_nan_index_rejected() {
    let (_dir, store) = setup_temp_store();
    let err = store
        .store_variable(
            "f",
            &IndexArray::from(vec![1.0, f64::NAN]),
            &floats(&[1.0, 2.0]),
        )
        .unwrap_err();
    assert!(matches!(err, PageStoreError::InvalidArgument(_)));
    assert!(store.pages("f").unwrap().is_empty());

    store
        .store_variable("f", &IndexArray::from(vec![1.0, 2.0]), &floats(&[1.0, 2.0]))
        .unwrap();
    assert_eq!(store.get("f", None, None).unwrap().len(), 2);
}

// =============================================================================
// Read-Only & Integrity Tests
// =============================================================================

#[test]
fn test_read_only_store() {
    let (temp_dir, store) = setup_temp_store();
    store_range(&store, "temp", 0, 10);

    let reader = reopen(&temp_dir, true);
    assert!(reader.is_read_only());
    assert_eq!(reader.page_dir(), store.page_dir());
    assert_eq!(reader.count("temp", None, None).unwrap(), 10);

    assert!(matches!(
        reader.store_variable("temp", &ints(&[100]), &floats(&[1.0])),
        Err(PageStoreError::ReadOnly)
    ));
    assert!(matches!(reader.set_var("x", "1"), Err(PageStoreError::ReadOnly)));
    assert!(matches!(
        reader.prune_deleted_pages(None),
        Err(PageStoreError::ReadOnly)
    ));
    assert!(matches!(
        reader.rebalance("%", 1000),
        Err(PageStoreError::ReadOnly)
    ));
}

#[test]
fn test_check_on_read() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .catalog_path(temp_dir.path().join("catalog.db"))
        .check_on_read(true)
        .build();
    let store = Store::open(config).unwrap();
    store_range(&store, "temp", 0, 10);
    assert_eq!(store.get("temp", None, None).unwrap().len(), 10);

    let page = store.page(1).unwrap().unwrap();
    let path = page.record_path();
    let mut bytes = fs::read(&path).unwrap();
    bytes[3] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        store.get("temp", None, None),
        Err(PageStoreError::CorruptPage { page_id: 1, .. })
    ));
}

#[test]
fn test_get_checked_verifies_pages() {
    let (_dir, store) = setup_temp_store();
    store_range(&store, "temp", 0, 10);
    store_range(&store, "temp", 10, 10);
    assert_eq!(store.get_checked("temp", None, None).unwrap().len(), 20);

    let page = store.page(2).unwrap().unwrap();
    let path = page.record_path();
    let mut bytes = fs::read(&path).unwrap();
    bytes[0] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    // The store does not check on read by default
    assert_eq!(store.get("temp", None, None).unwrap().len(), 20);
    assert!(matches!(
        store.get_checked("temp", None, None),
        Err(PageStoreError::CorruptPage { page_id: 2, .. })
    ));
    // Only the corrupt page is read for this range
    assert_eq!(
        store
            .get_checked("temp", Some(IndexValue::Int(0)), Some(IndexValue::Int(9)))
            .unwrap()
            .len(),
        10
    );
}

#[test]
fn test_text_records_round_trip() {
    let (_dir, store) = setup_temp_store();
    let words = vec!["", "héllo", "", "日本語", "x"];
    store
        .store_variable("words", &ints(&[1, 2, 3, 4, 5]), &Records::scalar(words.clone()))
        .unwrap();
    let tags = Records::ragged(vec![2, 0, 3], vec!["", "ü", "", "", "🦀"]).unwrap();
    store
        .store_variable("tags", &ints(&[1, 2, 3]), &tags)
        .unwrap();

    let series = store.get("words", None, None).unwrap();
    assert_eq!(series.records, Records::scalar(words));
    assert_eq!(store.get("tags", None, None).unwrap().records, tags);

    // A merge keeps empty strings intact as well
    store
        .store_variable("words", &ints(&[2, 6]), &Records::scalar(vec!["", "é"]))
        .unwrap();
    let series = store.get("words", None, None).unwrap();
    assert_eq!(
        series.records,
        Records::scalar(vec!["", "", "", "日本語", "x", "é"])
    );
}

// =============================================================================
// Multi-Variable Tests
// =============================================================================

#[test]
fn test_store_batch_and_get_matching() {
    let (_dir, store) = setup_temp_store();
    let mut batch = BTreeMap::new();
    batch.insert(
        "sensor.a".to_string(),
        Series::new(vec![1i64, 2], floats(&[1.0, 2.0])).unwrap(),
    );
    batch.insert(
        "sensor.b".to_string(),
        Series::new(vec![1i64], floats(&[9.0])).unwrap(),
    );
    batch.insert(
        "pump".to_string(),
        Series::new(vec![5i64], floats(&[0.0])).unwrap(),
    );
    store.store(&batch).unwrap();

    assert_eq!(
        store.search("%").unwrap(),
        vec!["pump".to_string(), "sensor.a".to_string(), "sensor.b".to_string()]
    );

    let matching = store.get_matching("sensor%", None, None).unwrap();
    assert_eq!(matching.len(), 2);
    assert_eq!(matching["sensor.a"], batch["sensor.a"]);
    assert_eq!(matching["sensor.b"], batch["sensor.b"]);

    let many = store
        .get_many(["pump", "nothing"], Some(IndexValue::Int(0)), Some(IndexValue::Int(10)))
        .unwrap();
    assert_eq!(many["pump"], batch["pump"]);
    assert!(many["nothing"].is_empty());
}

#[test]
fn test_info() {
    let (_dir, store) = setup_temp_store();
    store_range(&store, "a", 0, 1000);
    store_range(&store, "b", 0, 500);

    let info = store.info(None).unwrap();
    assert_eq!(info.stats.variables, 2);
    assert_eq!(info.stats.pages, 2);
    assert_eq!(info.stats.records, 1500);
    assert_eq!(
        info.to_string(),
        "2 variables, 2 pages, 1.5k records, 12kB total, 6kB/page"
    );

    let info = store.info(Some("a")).unwrap();
    assert_eq!(info.to_string(), "1 pages, 1k records, 8kB total, 8kB/page");

    let info = store.info(Some("missing")).unwrap();
    assert_eq!(info.to_string(), "");
}
