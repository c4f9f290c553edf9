//! Table backend abstraction and versioned key store for keyrot.
//!
//! This crate provides the [`KvBackend`] trait, the boundary to the external
//! conditional-write table service, and the [`KeyStore`](keys::KeyStore)
//! built on top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Admin Gateway                            │
//! │        (list / get / create / update / delete)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      KeyStore                               │
//! │   (version allocation, record codec, offset pagination)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  KvBackend trait                            │
//! │  (get_item, put_item, put_item_if_absent, delete_item,      │
//! │   scan)                                                     │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBackend│        table service client                  │
//! │   (testing)  │           (production)                       │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use keyrot_storage::{MemoryBackend, Version, keys::KeyStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = KeyStore::builder()
//!         .backend(Arc::new(MemoryBackend::new()))
//!         .table("encryption-keys")
//!         .build();
//!
//!     let record = store.create("0123456789abcdef0123456789abcdef").await?;
//!     assert_eq!(record.version, Version(1));
//!
//!     let removed = store.delete(record.version).await?;
//!     assert_eq!(removed, record);
//!     assert!(store.get_one(record.version).await?.is_none());
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with shared test helpers (key material
//!   generators, seeded stores, assertion macros).
//! - **`failpoints`**: Activates fail point injection sites for failure-path tests.

#![deny(unsafe_code)]

pub mod backend;
pub mod error;
pub mod keys;
pub mod memory;
pub mod scan;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::KvBackend;
pub use error::{BoxError, StorageError, StorageResult};
pub use keys::{KeyRecord, KeyStore, KeyStoreError, KeyStoreResult, ListPage};
pub use memory::MemoryBackend;
pub use scan::{ContinuationToken, Filter, ScanOutput, ScanRequest};
pub use types::{AttributeValue, Item, ItemKey, PARTITION_ATTRIBUTE, SORT_ATTRIBUTE, Version};
