//! Versioned key records.
//!
//! This module contains the [`KeyStore`], which allocates strictly increasing
//! versions for key material and stores one [`KeyRecord`] per version in a
//! single partition of a [`KvBackend`](crate::KvBackend) table.
//!
//! # Table Layout
//!
//! | Item | `id` (S) | `version` (N) | `key` (S) |
//! |------|----------|---------------|-----------|
//! | Key record | `"PK"` | `1, 2, 3, ...` | key material |
//! | Sequence counter | `"autoIncrease"` | `-1` | last issued version, decimal |
//!
//! Records and the counter share one table and are told apart by partition
//! and the sentinel version. Listing filters on `version > 0`, which excludes
//! the counter.

mod error;
mod store;

use serde::{Deserialize, Serialize};

pub use error::{KeyStoreError, KeyStoreResult};
pub use store::{DEFAULT_PAGE_SIZE, KeyStore, ListPage, RecordPage};

use crate::types::{AttributeValue, Item, ItemKey, Version};

/// Partition holding every key record.
pub const RECORD_PARTITION: &str = "PK";

/// Partition holding the sequence counter.
pub const COUNTER_PARTITION: &str = "autoIncrease";

/// Sort value of the sequence counter item.
pub const COUNTER_VERSION: Version = Version(-1);

pub use crate::types::PARTITION_ATTRIBUTE;

/// Attribute carrying the version number: the item's sort attribute.
pub const VERSION_ATTRIBUTE: &str = crate::types::SORT_ATTRIBUTE;

/// Attribute carrying the key material (or the counter value).
pub const KEY_ATTRIBUTE: &str = "key";

/// A versioned piece of key material.
///
/// Serializes as `{"id": <version>, "key": <material>}`, the shape the admin
/// front end works with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Unique, monotonically assigned version.
    #[serde(rename = "id")]
    pub version: Version,
    /// Opaque key material. Length is validated by the presentation layer.
    pub key: String,
}

impl KeyRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(version: impl Into<Version>, key: impl Into<String>) -> Self {
        Self { version: version.into(), key: key.into() }
    }

    /// Composite key of the record at `version`.
    #[must_use]
    pub fn item_key(version: Version) -> ItemKey {
        ItemKey::new(RECORD_PARTITION, version.0)
    }

    /// Encodes the record as a backend item.
    #[must_use]
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(PARTITION_ATTRIBUTE.to_owned(), AttributeValue::string(RECORD_PARTITION));
        item.insert(VERSION_ATTRIBUTE.to_owned(), AttributeValue::number(self.version.0));
        item.insert(KEY_ATTRIBUTE.to_owned(), AttributeValue::string(self.key.clone()));
        item
    }

    /// Decodes a backend item.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::MalformedRecord`] if the item lacks a numeric
    /// `version` or a string `key`.
    pub fn from_item(item: &Item) -> KeyStoreResult<Self> {
        let version = item
            .get(VERSION_ATTRIBUTE)
            .and_then(AttributeValue::as_i64)
            .ok_or_else(|| KeyStoreError::malformed("missing numeric 'version' attribute"))?;
        let key = item
            .get(KEY_ATTRIBUTE)
            .and_then(AttributeValue::as_str)
            .ok_or_else(|| KeyStoreError::malformed("missing string 'key' attribute"))?;
        Ok(Self::new(version, key))
    }
}

/// Composite key of the sequence counter.
pub(crate) fn counter_key() -> ItemKey {
    ItemKey::new(COUNTER_PARTITION, COUNTER_VERSION.0)
}

/// Encodes the sequence counter holding `last_issued`.
pub(crate) fn counter_item(last_issued: Version) -> Item {
    let mut item = Item::new();
    item.insert(PARTITION_ATTRIBUTE.to_owned(), AttributeValue::string(COUNTER_PARTITION));
    item.insert(VERSION_ATTRIBUTE.to_owned(), AttributeValue::number(COUNTER_VERSION.0));
    item.insert(KEY_ATTRIBUTE.to_owned(), AttributeValue::string(last_issued.to_string()));
    item
}
