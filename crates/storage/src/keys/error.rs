//! Key store error types.

use thiserror::Error;

use crate::{error::StorageError, types::Version};

/// Result type alias for key store operations.
pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

/// Errors produced by the [`KeyStore`](super::KeyStore).
///
/// Backend failures are wrapped in [`Store`](Self::Store) with the source
/// chain intact; they are never reported as an empty success.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyStoreError {
    /// No record exists at the requested version.
    #[error("Key version {version} not found")]
    NotFound {
        /// The version that was looked up.
        version: Version,
    },

    /// The guarded insert found a record already committed at this version.
    ///
    /// Another creator won the race for the allocated version. Retrying the
    /// whole create allocates a fresh version.
    #[error("Key version {version} was claimed by a concurrent writer")]
    VersionConflict {
        /// The version that could not be claimed.
        version: Version,
    },

    /// The sequence counter holds a value that is not an integer.
    ///
    /// Creation cannot proceed until the counter item is repaired.
    #[error("Sequence counter is corrupt: {value:?}")]
    SequenceCorrupt {
        /// The raw stored value, if any.
        value: Option<String>,
    },

    /// Writes to versions `<= 0` are refused; those belong to the counter.
    #[error("Key version {version} is reserved")]
    ReservedVersion {
        /// The rejected version.
        version: Version,
    },

    /// A stored item could not be decoded as a key record.
    #[error("Malformed key record: {message}")]
    MalformedRecord {
        /// What was wrong with the item.
        message: String,
    },

    /// The backend failed.
    #[error("Storage error: {0}")]
    Store(
        /// The underlying backend error.
        #[from]
        StorageError,
    ),
}

impl KeyStoreError {
    /// Creates a new `MalformedRecord` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord { message: message.into() }
    }

    /// Returns `true` when re-running the whole operation may succeed.
    ///
    /// Version conflicts are retryable because a retried create allocates a
    /// new version; transient backend errors are retryable as well.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::VersionConflict { .. } => true,
            Self::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}
