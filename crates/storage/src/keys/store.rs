//! The versioned key store.
//!
//! # Allocation Protocol
//!
//! [`KeyStore::create`] runs allocate-then-commit:
//!
//! 1. Read the sequence counter (absent means the next version is 1).
//! 2. Overwrite the counter with the next version. This is the allocation
//!    commit point.
//! 3. Insert the record with an `attribute_not_exists` guard on its
//!    composite key.
//!
//! Two creators that read the same counter value both compute the same
//! version and both overwrite the counter, but only one guarded insert can
//! succeed; the other reports [`KeyStoreError::VersionConflict`]. No two
//! committed records ever share a version. A creator that stops between
//! steps 2 and 3 leaves a permanent gap in the version sequence; gaps are
//! never back-filled.

use std::{fmt, ops::Range, sync::Arc};

use fail::fail_point;

use super::{
    KEY_ATTRIBUTE, KeyRecord, VERSION_ATTRIBUTE, counter_item, counter_key,
    error::{KeyStoreError, KeyStoreResult},
};
use crate::{
    backend::KvBackend,
    error::StorageError,
    scan::{ContinuationToken, Filter, ScanRequest},
    types::{AttributeValue, Version},
};

/// Default number of items evaluated per backend scan call.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One offset-addressed slice of the record listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListPage {
    /// Records inside the requested range, in backend order.
    pub records: Vec<KeyRecord>,
    /// Total number of records matching the listing filter.
    pub count: usize,
}

/// One backend page of records, addressed by continuation token.
#[derive(Clone, Debug)]
pub struct RecordPage {
    /// Records in this page, in backend order.
    pub records: Vec<KeyRecord>,
    /// Cursor for the following page, if any.
    pub next: Option<ContinuationToken>,
}

/// Versioned key store over a [`KvBackend`] table.
///
/// The store takes no locks: concurrent callers coordinate only through the
/// backend's guarded insert.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use keyrot_storage::{MemoryBackend, keys::KeyStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = KeyStore::builder()
///         .backend(Arc::new(MemoryBackend::new()))
///         .table("encryption-keys")
///         .build();
///
///     let first = store.create("A".repeat(32)).await?;
///     let second = store.create("B".repeat(32)).await?;
///     assert!(second.version > first.version);
///
///     let page = store.list(0..10).await?;
///     assert_eq!(page.count, 2);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct KeyStore {
    backend: Arc<dyn KvBackend>,
    table: String,
    page_size: usize,
}

#[bon::bon]
impl KeyStore {
    /// Creates a key store over `table`.
    ///
    /// # Optional Fields
    ///
    /// * `page_size` - Items evaluated per backend scan call (default: [`DEFAULT_PAGE_SIZE`],
    ///   clamped to at least 1).
    #[builder]
    pub fn new(
        backend: Arc<dyn KvBackend>,
        #[builder(into)] table: String,
        #[builder(default = DEFAULT_PAGE_SIZE)] page_size: usize,
    ) -> Self {
        Self { backend, table, page_size: page_size.max(1) }
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("table", &self.table)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Excludes the sequence counter (and any other reserved version).
fn visible_records() -> Filter {
    Filter::greater_than(VERSION_ATTRIBUTE, AttributeValue::number(0))
}

impl KeyStore {
    /// Name of the backing table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Lists records whose position in the filtered scan falls in `range`.
    ///
    /// `count` is the total number of records, independent of the range. The
    /// sequence counter is never included.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Store`] on backend failure and
    /// [`KeyStoreError::MalformedRecord`] if a stored record cannot be decoded.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn list(&self, range: Range<usize>) -> KeyStoreResult<ListPage> {
        self.collect(range, visible_records()).await
    }

    /// Like [`list`](Self::list), restricted further by `filter`.
    ///
    /// # Errors
    ///
    /// Same as [`list`](Self::list).
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn list_filtered(
        &self,
        range: Range<usize>,
        filter: Filter,
    ) -> KeyStoreResult<ListPage> {
        self.collect(range, visible_records().and(filter)).await
    }

    async fn collect(&self, range: Range<usize>, filter: Filter) -> KeyStoreResult<ListPage> {
        let mut records = Vec::with_capacity(range.len().min(self.page_size));
        let mut matched = 0usize;
        let mut cursor = None;

        loop {
            let request = ScanRequest::builder()
                .filter(filter.clone())
                .limit(self.page_size)
                .maybe_exclusive_start_key(cursor)
                .build();
            let page = self.backend.scan(&self.table, request).await?;

            for item in &page.items {
                if range.contains(&matched) {
                    records.push(KeyRecord::from_item(item)?);
                }
                matched += 1;
            }

            match page.last_evaluated_key {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(returned = records.len(), total = matched, "listed key records");
        Ok(ListPage { records, count: matched })
    }

    /// Returns a single backend page of records starting after `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Store`] on backend failure (including a zero
    /// `limit`).
    #[tracing::instrument(skip(self, cursor), fields(table = %self.table))]
    pub async fn scan_page(
        &self,
        cursor: Option<ContinuationToken>,
        limit: usize,
    ) -> KeyStoreResult<RecordPage> {
        let request = ScanRequest::builder()
            .filter(visible_records())
            .limit(limit)
            .maybe_exclusive_start_key(cursor)
            .build();
        let page = self.backend.scan(&self.table, request).await?;
        let records = page.items.iter().map(KeyRecord::from_item).collect::<Result<_, _>>()?;

        Ok(RecordPage { records, next: page.last_evaluated_key })
    }

    /// Looks up the record at `version`.
    ///
    /// Absence is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Store`] on backend failure.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn get_one(&self, version: Version) -> KeyStoreResult<Option<KeyRecord>> {
        let item = self.backend.get_item(&self.table, &KeyRecord::item_key(version)).await?;
        item.as_ref().map(KeyRecord::from_item).transpose()
    }

    /// Looks up several versions, skipping those that don't exist.
    ///
    /// Found records keep the order of `versions`.
    ///
    /// # Errors
    ///
    /// Returns the first backend failure.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn get_many(&self, versions: &[Version]) -> KeyStoreResult<Vec<KeyRecord>> {
        let mut records = Vec::with_capacity(versions.len());
        for &version in versions {
            if let Some(record) = self.get_one(version).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Stores `key` under a freshly allocated version.
    ///
    /// See the [module documentation](self) for the allocation protocol.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::SequenceCorrupt`] if the counter is not a non-negative integer
    /// - [`KeyStoreError::VersionConflict`] if a concurrent creator committed the same version
    /// - [`KeyStoreError::Store`] on backend failure
    #[tracing::instrument(skip(self, key), fields(table = %self.table))]
    pub async fn create(&self, key: impl Into<String>) -> KeyStoreResult<KeyRecord> {
        let version = self.allocate_version().await?;

        fail_point!("keystore-after-allocate", |_| {
            Err(KeyStoreError::Store(StorageError::internal(
                "injected failure between allocation and commit",
            )))
        });

        let record = KeyRecord::new(version, key);
        match self.backend.put_item_if_absent(&self.table, record.to_item()).await {
            Ok(()) => {
                tracing::debug!(%version, "key record committed");
                Ok(record)
            },
            Err(StorageError::Conflict) => {
                tracing::warn!(%version, "version already committed by a concurrent creator");
                Err(KeyStoreError::VersionConflict { version })
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Advances the sequence counter and returns the version it now holds.
    async fn allocate_version(&self) -> KeyStoreResult<Version> {
        let next = match self.backend.get_item(&self.table, &counter_key()).await? {
            None => Version(1),
            Some(item) => {
                let raw = item.get(KEY_ATTRIBUTE).and_then(AttributeValue::as_str);
                let corrupt = || KeyStoreError::SequenceCorrupt { value: raw.map(str::to_owned) };

                let last = raw
                    .and_then(|value| value.parse::<i64>().ok())
                    .filter(|last| *last >= 0)
                    .ok_or_else(corrupt)?;
                Version(last.checked_add(1).ok_or_else(corrupt)?)
            },
        };

        self.backend.put_item(&self.table, counter_item(next)).await?;
        tracing::debug!(version = %next, "sequence counter advanced");
        Ok(next)
    }

    /// Overwrites the record at `version`, creating it if absent.
    ///
    /// This is an upsert: prior existence is not checked.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::ReservedVersion`] for versions `<= 0`
    /// - [`KeyStoreError::Store`] on backend failure
    #[tracing::instrument(skip(self, key), fields(table = %self.table))]
    pub async fn update(
        &self,
        version: Version,
        key: impl Into<String>,
    ) -> KeyStoreResult<KeyRecord> {
        if version.is_reserved() {
            return Err(KeyStoreError::ReservedVersion { version });
        }

        let record = KeyRecord::new(version, key);
        self.backend.put_item(&self.table, record.to_item()).await?;
        Ok(record)
    }

    /// Deletes the record at `version`, returning what it held.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::NotFound`] if nothing was stored at `version`
    /// - [`KeyStoreError::Store`] on backend failure
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn delete(&self, version: Version) -> KeyStoreResult<KeyRecord> {
        match self.backend.delete_item(&self.table, &KeyRecord::item_key(version)).await? {
            Some(item) => KeyRecord::from_item(&item),
            None => Err(KeyStoreError::NotFound { version }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{ItemKey, memory::MemoryBackend};

    const TABLE: &str = "keys";

    fn store_over(backend: &MemoryBackend) -> KeyStore {
        KeyStore::builder().backend(Arc::new(backend.clone())).table(TABLE).page_size(2).build()
    }

    #[tokio::test]
    async fn test_first_create_starts_at_one() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);

        let record = store.create("a").await.unwrap();
        assert_eq!(record.version, Version(1));

        let counter = backend.get_item(TABLE, &counter_key()).await.unwrap().unwrap();
        assert_eq!(counter[KEY_ATTRIBUTE], AttributeValue::string("1"));
    }

    #[tokio::test]
    async fn test_create_continues_from_counter() {
        let backend = MemoryBackend::new();
        backend.put_item(TABLE, counter_item(Version(41))).await.unwrap();
        let store = store_over(&backend);

        assert_eq!(store.create("a").await.unwrap().version, Version(42));
    }

    #[tokio::test]
    async fn test_corrupt_counter_blocks_creation() {
        let backend = MemoryBackend::new();
        let mut counter = counter_item(Version(1));
        counter.insert(KEY_ATTRIBUTE.into(), AttributeValue::string("not-a-number"));
        backend.put_item(TABLE, counter).await.unwrap();
        let store = store_over(&backend);

        let result = store.create("a").await;
        assert!(matches!(
            result,
            Err(KeyStoreError::SequenceCorrupt { value: Some(ref v) }) if v == "not-a-number"
        ));
        // Nothing beyond the counter was written
        assert_eq!(backend.len(TABLE), 1);
    }

    #[tokio::test]
    async fn test_negative_counter_is_corrupt() {
        let backend = MemoryBackend::new();
        let mut counter = counter_item(Version(1));
        counter.insert(KEY_ATTRIBUTE.into(), AttributeValue::string("-4"));
        backend.put_item(TABLE, counter).await.unwrap();

        let result = store_over(&backend).create("a").await;
        assert!(matches!(result, Err(KeyStoreError::SequenceCorrupt { .. })));
    }

    #[tokio::test]
    async fn test_stale_counter_surfaces_conflict() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);
        store.create("a").await.unwrap();

        // Another writer's record at version 2 exists while the counter still says 1
        backend.put_item(TABLE, KeyRecord::new(2, "theirs").to_item()).await.unwrap();

        let result = store.create("mine").await;
        assert!(matches!(result, Err(KeyStoreError::VersionConflict { version: Version(2) })));

        // The committed record was not overwritten
        let kept = store.get_one(Version(2)).await.unwrap().unwrap();
        assert_eq!(kept.key, "theirs");

        // A retry allocates past the conflict
        assert_eq!(store.create("mine").await.unwrap().version, Version(3));
    }

    #[tokio::test]
    async fn test_list_spans_backend_pages() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);
        for i in 0..5 {
            store.create(format!("key-{i}")).await.unwrap();
        }

        let page = store.list(1..4).await.unwrap();
        assert_eq!(page.count, 5);
        let versions: Vec<i64> = page.records.iter().map(|r| r.version.0).collect();
        assert_eq!(versions, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_list_excludes_counter() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);
        store.create("a").await.unwrap();

        let page = store.list(0..10).await.unwrap();
        assert_eq!(page.count, 1);
        assert!(page.records.iter().all(|r| !r.version.is_reserved()));
    }

    #[tokio::test]
    async fn test_list_empty_range() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);
        store.create("a").await.unwrap();

        #[allow(clippy::reversed_empty_ranges)]
        let page = store.list(3..1).await.unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.count, 1);
    }

    #[tokio::test]
    async fn test_list_filtered() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);
        store.create("same").await.unwrap();
        store.create("other").await.unwrap();
        store.create("same").await.unwrap();

        let page = store
            .list_filtered(0..10, Filter::equals(KEY_ATTRIBUTE, AttributeValue::string("same")))
            .await
            .unwrap();
        assert_eq!(page.count, 2);
        assert!(page.records.iter().all(|r| r.key == "same"));
    }

    #[tokio::test]
    async fn test_scan_page_hands_back_cursor() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);
        for i in 0..3 {
            store.create(format!("key-{i}")).await.unwrap();
        }

        let first = store.scan_page(None, 2).await.unwrap();
        assert_eq!(first.records.len(), 2);
        let second = store.scan_page(first.next, 2).await.unwrap();
        assert_eq!(second.records.len(), 1);
    }

    #[tokio::test]
    async fn test_get_many_skips_missing() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);
        store.create("a").await.unwrap();
        store.create("b").await.unwrap();

        let found = store.get_many(&[Version(2), Version(7), Version(1)]).await.unwrap();
        let versions: Vec<i64> = found.iter().map(|r| r.version.0).collect();
        assert_eq!(versions, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_update_is_upsert() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);

        let record = store.update(Version(99), "C".repeat(32)).await.unwrap();
        assert_eq!(record, KeyRecord::new(99, "C".repeat(32)));
        assert_eq!(store.get_one(Version(99)).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_update_rejects_reserved_versions() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);

        for version in [0, -1] {
            let result = store.update(Version(version), "x").await;
            assert!(matches!(result, Err(KeyStoreError::ReservedVersion { .. })));
        }
        assert!(backend.is_empty(TABLE));
    }

    #[tokio::test]
    async fn test_delete_returns_old_record() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);
        let created = store.create("a").await.unwrap();

        assert_eq!(store.delete(created.version).await.unwrap(), created);
        assert_eq!(store.get_one(created.version).await.unwrap(), None);
        assert!(matches!(
            store.delete(created.version).await,
            Err(KeyStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_never_touches_counter() {
        let backend = MemoryBackend::new();
        let store = store_over(&backend);
        store.create("a").await.unwrap();

        assert!(matches!(store.delete(Version(-1)).await, Err(KeyStoreError::NotFound { .. })));
        assert!(
            backend.get_item(TABLE, &ItemKey::new("autoIncrease", -1)).await.unwrap().is_some()
        );
    }
}
