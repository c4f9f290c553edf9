//! In-memory backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`KvBackend`] suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Items are kept in a [`BTreeMap`] per table, so scans walk keys in
//!   `(partition, sort)` order
//! - **Atomic guarded puts**: the existence check and insert of
//!   [`put_item_if_absent`](KvBackend::put_item_if_absent) happen under one write lock
//!
//! # Example
//!
//! ```
//! use keyrot_storage::{AttributeValue, Item, ItemKey, KvBackend, MemoryBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     let mut item = Item::new();
//!     item.insert("id".into(), AttributeValue::string("PK"));
//!     item.insert("version".into(), AttributeValue::number(1));
//!     backend.put_item("keys", item).await.unwrap();
//!
//!     let found = backend.get_item("keys", &ItemKey::new("PK", 1)).await.unwrap();
//!     assert!(found.is_some());
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Tables are created implicitly on first write

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::Arc,
};

use async_trait::async_trait;
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    backend::KvBackend,
    error::{StorageError, StorageResult},
    scan::{ContinuationToken, ScanOutput, ScanRequest},
    types::{Item, ItemKey},
};

type Table = BTreeMap<ItemKey, Item>;

/// In-memory table backend.
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<BTreeMap<String, Table>>>,
}

impl MemoryBackend {
    /// Creates an empty backend. Items are keyed by their `(id, version)` attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently stored in `table`.
    #[must_use]
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Returns `true` if `table` holds no items.
    #[must_use]
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    #[tracing::instrument(skip(self))]
    async fn get_item(&self, table: &str, key: &ItemKey) -> StorageResult<Option<Item>> {
        let tables = self.tables.read();
        Ok(tables.get(table).and_then(|rows| rows.get(key)).cloned())
    }

    #[tracing::instrument(skip(self, item))]
    async fn put_item(&self, table: &str, item: Item) -> StorageResult<()> {
        let key = ItemKey::of(&item)?;
        let mut tables = self.tables.write();
        tables.entry(table.to_owned()).or_default().insert(key, item);
        Ok(())
    }

    #[tracing::instrument(skip(self, item))]
    async fn put_item_if_absent(&self, table: &str, item: Item) -> StorageResult<()> {
        let key = ItemKey::of(&item)?;
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_owned()).or_default();

        if rows.contains_key(&key) {
            tracing::debug!(%key, "conditional put rejected: key exists");
            return Err(StorageError::conflict());
        }

        rows.insert(key, item);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_item(&self, table: &str, key: &ItemKey) -> StorageResult<Option<Item>> {
        let mut tables = self.tables.write();
        Ok(tables.get_mut(table).and_then(|rows| rows.remove(key)))
    }

    #[tracing::instrument(skip(self, request), fields(limit = ?request.limit))]
    async fn scan(&self, table: &str, request: ScanRequest) -> StorageResult<ScanOutput> {
        let limit = request.limit.unwrap_or(usize::MAX);
        if limit == 0 {
            return Err(StorageError::serialization("scan limit must be at least 1"));
        }

        let tables = self.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(ScanOutput::default());
        };

        let start = match request.exclusive_start_key {
            Some(token) => Bound::Excluded(token.last_evaluated().clone()),
            None => Bound::Unbounded,
        };

        let mut remaining = rows.range((start, Bound::Unbounded)).peekable();
        let mut output = ScanOutput::default();
        let mut last_key = None;

        while output.scanned_count < limit {
            let Some((key, item)) = remaining.next() else {
                break;
            };
            output.scanned_count += 1;
            last_key = Some(key);

            if request.filter.as_ref().is_none_or(|filter| filter.matches(item)) {
                output.items.push(item.clone());
            }
        }

        output.count = output.items.len();
        if remaining.peek().is_some() {
            output.last_evaluated_key = last_key.cloned().map(ContinuationToken::new);
        }

        Ok(output)
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        fail_point!("memory-health-check", |_| {
            Err(StorageError::connection("injected health check failure"))
        });
        // Acquiring the read lock proves we're not deadlocked
        let _unused = self.tables.read();
        Ok(())
    }
}
