//! Key-value backend trait definition.
//!
//! This module defines the [`KvBackend`] trait, the boundary between the
//! key store and the external table service. The trait mirrors the small
//! set of primitives the key store relies on:
//!
//! - **Point reads** by composite key
//! - **Unconditional puts** that overwrite whatever is stored
//! - **Guarded puts** that fail if the composite key already exists
//!   (`attribute_not_exists`)
//! - **Deletes** that return the prior item
//! - **Filtered scans** with a limit and a native continuation token
//!
//! All coordination between concurrent writers happens inside the backend
//! through the guarded put; callers take no locks of their own.
//!
//! See [`MemoryBackend`](crate::MemoryBackend) for a reference implementation.

use async_trait::async_trait;

use crate::{
    error::StorageResult,
    scan::{ScanOutput, ScanRequest},
    types::{Item, ItemKey},
};

/// Abstract table backend.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations. The trait is object safe so that clients bound to
/// a particular credential can be swapped behind an `Arc<dyn KvBackend>`.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get_item`](KvBackend::get_item) | Retrieve a single item by key |
/// | [`put_item`](KvBackend::put_item) | Store an item, overwriting |
/// | [`put_item_if_absent`](KvBackend::put_item_if_absent) | Store only if the key is free |
/// | [`delete_item`](KvBackend::delete_item) | Remove an item, returning it |
/// | [`scan`](KvBackend::scan) | Filtered, paginated table walk |
/// | [`health_check`](KvBackend::health_check) | Verify backend availability |
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Retrieves an item by composite key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(item))` if the item exists
    /// - `Ok(None)` if it doesn't
    /// - `Err(...)` on backend errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_item(&self, table: &str, key: &ItemKey) -> StorageResult<Option<Item>>;

    /// Stores an item, overwriting any item with the same composite key.
    ///
    /// # Errors
    ///
    /// [`StorageError::Serialization`](crate::StorageError::Serialization) if
    /// the item lacks its key attributes.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn put_item(&self, table: &str, item: Item) -> StorageResult<()>;

    /// Stores an item only if no item with the same composite key exists.
    ///
    /// The existence check and the write are a single atomic step in the
    /// backend; this is the only concurrency primitive the key store uses.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict) if the key is taken
    /// - [`StorageError::Serialization`](crate::StorageError::Serialization) if the item lacks its
    ///   key attributes
    #[must_use = "conditional writes may fail with a conflict and errors must be handled"]
    async fn put_item_if_absent(&self, table: &str, item: Item) -> StorageResult<()>;

    /// Deletes an item, returning the attributes it held.
    ///
    /// Returns `Ok(None)` when nothing was stored under `key`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete_item(&self, table: &str, key: &ItemKey) -> StorageResult<Option<Item>>;

    /// Scans one page of a table.
    ///
    /// At most `request.limit` items are evaluated; the filter is applied to
    /// the evaluated items. `last_evaluated_key` is set when the walk stopped
    /// at the limit with items remaining.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn scan(&self, table: &str, request: ScanRequest) -> StorageResult<ScanOutput>;

    /// Verifies that the backend can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
