//! Item model shared by backends and the key store.
//!
//! Items are flat attribute maps whose values are typed scalars, the same
//! shape the backing table exposes on the wire. Two attributes form the
//! composite primary key: the string [`PARTITION_ATTRIBUTE`] and the numeric
//! [`SORT_ATTRIBUTE`].

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// A typed scalar attribute value.
///
/// Numbers are carried as decimal strings, matching the wire format of the
/// backing store; [`as_i64`](Self::as_i64) parses them on demand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String value.
    S(String),
    /// Number value in decimal notation.
    N(String),
}

impl AttributeValue {
    /// Creates a string attribute.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::S(value.into())
    }

    /// Creates a number attribute from any integer.
    #[must_use]
    pub fn number(value: impl Into<i64>) -> Self {
        Self::N(value.into().to_string())
    }

    /// Returns the string payload if this is an `S` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            Self::N(_) => None,
        }
    }

    /// Returns the parsed number if this is an `N` value holding an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::N(n) => n.parse().ok(),
            Self::S(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "{{S: {s}}}"),
            Self::N(n) => write!(f, "{{N: {n}}}"),
        }
    }
}

/// A stored item: attribute name to value.
pub type Item = BTreeMap<String, AttributeValue>;

/// String attribute holding an item's partition value.
pub const PARTITION_ATTRIBUTE: &str = "id";

/// Numeric attribute holding an item's sort value.
pub const SORT_ATTRIBUTE: &str = "version";

/// Composite primary key of an item.
///
/// Ordered by partition first, then sort value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    /// Partition value.
    pub partition: String,
    /// Sort value.
    pub sort: i64,
}

impl ItemKey {
    /// Creates a new composite key.
    #[must_use]
    pub fn new(partition: impl Into<String>, sort: i64) -> Self {
        Self { partition: partition.into(), sort }
    }

    /// Extracts the composite key from an item.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if either key attribute is
    /// missing or has the wrong type.
    pub fn of(item: &Item) -> StorageResult<Self> {
        let partition =
            item.get(PARTITION_ATTRIBUTE).and_then(AttributeValue::as_str).ok_or_else(|| {
                StorageError::serialization(format!(
                    "item is missing string key attribute '{PARTITION_ATTRIBUTE}'"
                ))
            })?;
        let sort = item.get(SORT_ATTRIBUTE).and_then(AttributeValue::as_i64).ok_or_else(|| {
            StorageError::serialization(format!(
                "item is missing numeric key attribute '{SORT_ATTRIBUTE}'"
            ))
        })?;
        Ok(Self::new(partition, sort))
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.sort)
    }
}

/// Macro to define a newtype wrapper around `i64` with standard trait
/// implementations.
///
/// Each generated type:
/// - Is a transparent wrapper around `i64`
/// - Derives `Copy`, `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Derives `Serialize` and `Deserialize` (transparent)
/// - Implements `From<i64>`, `Into<i64>` and `Display`
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Version number of a key record.
    ///
    /// Positive versions identify committed key records. Zero and negative
    /// values are reserved; the sequence counter lives at `-1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use keyrot_storage::Version;
    ///
    /// let v = Version::from(7);
    /// assert_eq!(i64::from(v), 7);
    /// assert_eq!(v.to_string(), "7");
    /// assert!(!v.is_reserved());
    /// assert!(Version::from(0).is_reserved());
    /// ```
    Version
);

impl Version {
    /// Returns `true` for versions that can never hold a key record.
    #[must_use]
    pub fn is_reserved(self) -> bool {
        self.0 <= 0
    }
}
