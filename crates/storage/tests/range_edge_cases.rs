//! Offset range edge case tests for `KeyStore::list`.
//!
//! Covers empty stores, ranges past the end, degenerate ranges, ranges that
//! straddle backend page boundaries, and the sentinel counter staying out of
//! every page.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use keyrot_storage::{
    KeyRecord, KeyStore, MemoryBackend,
    testutil::{TEST_TABLE, indexed_key_material},
};

/// Helper: a store with `count` records and a backend page size of `page_size`.
async fn populated_store(count: usize, page_size: usize) -> (KeyStore, Vec<KeyRecord>) {
    let store = KeyStore::builder()
        .backend(Arc::new(MemoryBackend::new()))
        .table(TEST_TABLE)
        .page_size(page_size)
        .build();
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        records.push(store.create(indexed_key_material(i)).await.expect("create"));
    }
    (store, records)
}

// ============================================================================
// Empty store
// ============================================================================

#[tokio::test]
async fn test_empty_store_lists_nothing() {
    let (store, _) = populated_store(0, 10).await;

    let page = store.list(0..10).await.expect("list");
    assert!(page.records.is_empty());
    assert_eq!(page.count, 0);
}

// ============================================================================
// Ranges beyond the listing
// ============================================================================

#[tokio::test]
async fn test_range_past_end_is_empty_but_counts_all() {
    let (store, _) = populated_store(4, 10).await;

    let page = store.list(10..20).await.expect("list");
    assert!(page.records.is_empty());
    assert_eq!(page.count, 4);
}

#[tokio::test]
async fn test_range_overlapping_end_is_truncated() {
    let (store, records) = populated_store(4, 10).await;

    let page = store.list(2..10).await.expect("list");
    assert_eq!(page.records, records[2..]);
}

// ============================================================================
// Degenerate ranges
// ============================================================================

#[tokio::test]
async fn test_start_equals_end_is_empty() {
    let (store, _) = populated_store(3, 10).await;

    let page = store.list(1..1).await.expect("list");
    assert!(page.records.is_empty());
    assert_eq!(page.count, 3);
}

#[tokio::test]
async fn test_single_element_range() {
    let (store, records) = populated_store(3, 10).await;

    let page = store.list(1..2).await.expect("list");
    assert_eq!(page.records, vec![records[1].clone()]);
}

// ============================================================================
// Backend page boundaries
// ============================================================================

#[tokio::test]
async fn test_range_straddling_backend_pages() {
    // Page size 2 with the counter item in the table forces several scan calls
    let (store, records) = populated_store(9, 2).await;

    let page = store.list(3..7).await.expect("list");
    assert_eq!(page.records, records[3..7]);
    assert_eq!(page.count, 9);
}

#[tokio::test]
async fn test_page_size_one_walks_everything() {
    let (store, records) = populated_store(5, 1).await;

    let page = store.list(0..5).await.expect("list");
    assert_eq!(page.records, records);
}

#[tokio::test]
async fn test_scan_page_cursor_walk_matches_list() {
    let (store, records) = populated_store(7, 3).await;

    let mut walked = Vec::new();
    let mut cursor = None;
    loop {
        let page = store.scan_page(cursor, 3).await.expect("scan_page");
        walked.extend(page.records);
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(walked, records);
}
