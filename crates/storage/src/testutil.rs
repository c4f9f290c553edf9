//! Shared test utilities for key store testing.
//!
//! This module provides helpers for producing key material, building stores
//! over a [`MemoryBackend`], and asserting on [`KeyStoreResult`] values. It
//! is feature-gated behind `testutil` to keep it out of production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! keyrot-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use keyrot_storage::testutil::{key_material, memory_store};
//! ```

use std::sync::Arc;

use crate::{
    keys::{KeyRecord, KeyStore, KeyStoreResult},
    memory::MemoryBackend,
};

/// Table name used by the helpers.
pub const TEST_TABLE: &str = "encryption-keys";

/// Length of valid key material.
pub const KEY_LENGTH: usize = 32;

/// Key material made of a single repeated character, e.g. `"AAAA…A"`.
#[must_use]
pub fn key_material(fill: char) -> String {
    std::iter::repeat_n(fill, KEY_LENGTH).collect()
}

/// Deterministic, distinct key material for index `idx`.
///
/// Produces `"key-000042"` padded with `'x'` to [`KEY_LENGTH`].
#[must_use]
pub fn indexed_key_material(idx: usize) -> String {
    format!("key-{idx:06}{}", "x".repeat(KEY_LENGTH - 10))
}

/// Creates a fresh backend and a store over [`TEST_TABLE`].
///
/// The backend is returned so tests can inspect or tamper with raw items.
#[must_use]
pub fn memory_store() -> (MemoryBackend, KeyStore) {
    let backend = MemoryBackend::new();
    let store = KeyStore::builder().backend(Arc::new(backend.clone())).table(TEST_TABLE).build();
    (backend, store)
}

/// Creates a store pre-populated with `count` records (versions `1..=count`).
///
/// # Panics
///
/// Panics if any create fails (should not happen with `MemoryBackend`).
pub async fn seeded_store(count: usize) -> (MemoryBackend, KeyStore, Vec<KeyRecord>) {
    let (backend, store) = memory_store();
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        records.push(store.create(indexed_key_material(i)).await.expect("seed create failed"));
    }
    (backend, store, records)
}

/// Unwraps a [`KeyStoreResult`], panicking with the error's display text.
///
/// # Panics
///
/// Panics if `result` is an error.
pub fn ok<T>(result: KeyStoreResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("expected Ok, got error: {err}"),
    }
}

/// Assert that a [`KeyStoreResult`] is a [`KeyStoreError::VersionConflict`].
///
/// [`KeyStoreError::VersionConflict`]: crate::keys::KeyStoreError::VersionConflict
#[macro_export]
macro_rules! assert_version_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::keys::KeyStoreError::VersionConflict { .. })),
            "expected KeyStoreError::VersionConflict, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::keys::KeyStoreError::VersionConflict { .. })),
            "{}: expected KeyStoreError::VersionConflict, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`KeyStoreResult`] is a [`KeyStoreError::NotFound`].
///
/// [`KeyStoreError::NotFound`]: crate::keys::KeyStoreError::NotFound
#[macro_export]
macro_rules! assert_record_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::keys::KeyStoreError::NotFound { .. })),
            "expected KeyStoreError::NotFound, got: {:?}",
            $result,
        );
    };
}
