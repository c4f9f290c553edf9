//! Filtered, paginated table scans.
//!
//! A scan walks a table in backend order, evaluating at most `limit` items
//! per call. The [`Filter`] is applied after evaluation, so a page may hold
//! fewer matches than `limit` while more pages remain. Pagination is driven
//! by the backend's own [`ContinuationToken`].

use std::cmp::Ordering;

use crate::types::{AttributeValue, Item, ItemKey};

/// Predicate evaluated against each scanned item.
///
/// Comparisons follow the backing store's typed semantics: numbers compare
/// numerically, strings lexicographically, and a type mismatch or a missing
/// attribute never matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    /// `attribute > value`
    GreaterThan {
        /// Attribute name.
        attribute: String,
        /// Right-hand side.
        value: AttributeValue,
    },
    /// `attribute = value`
    Equals {
        /// Attribute name.
        attribute: String,
        /// Right-hand side.
        value: AttributeValue,
    },
    /// Conjunction of all inner filters.
    And(Vec<Filter>),
}

impl Filter {
    /// Builds `attribute > value`.
    #[must_use]
    pub fn greater_than(attribute: impl Into<String>, value: AttributeValue) -> Self {
        Self::GreaterThan { attribute: attribute.into(), value }
    }

    /// Builds `attribute = value`.
    #[must_use]
    pub fn equals(attribute: impl Into<String>, value: AttributeValue) -> Self {
        Self::Equals { attribute: attribute.into(), value }
    }

    /// Combines `self` with another filter, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        let mut parts = match self {
            Self::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Self::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Self::And(parts)
    }

    /// Evaluates the filter against an item.
    #[must_use]
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Self::GreaterThan { attribute, value } => {
                compare(item.get(attribute), value) == Some(Ordering::Greater)
            },
            Self::Equals { attribute, value } => {
                compare(item.get(attribute), value) == Some(Ordering::Equal)
            },
            Self::And(parts) => parts.iter().all(|part| part.matches(item)),
        }
    }
}

fn compare(actual: Option<&AttributeValue>, expected: &AttributeValue) -> Option<Ordering> {
    let actual = actual?;
    match (actual, expected) {
        (AttributeValue::N(_), AttributeValue::N(_)) => {
            Some(actual.as_i64()?.cmp(&expected.as_i64()?))
        },
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Backend-native pagination cursor.
///
/// Holds the key of the last item evaluated by the previous page. Key store
/// callers treat it as opaque and only hand it back for the next page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContinuationToken(ItemKey);

impl ContinuationToken {
    /// Wraps the last evaluated key. Intended for backend implementations.
    #[must_use]
    pub fn new(last_evaluated: ItemKey) -> Self {
        Self(last_evaluated)
    }

    /// The last key evaluated by the page that produced this token.
    #[must_use]
    pub fn last_evaluated(&self) -> &ItemKey {
        &self.0
    }
}

/// Parameters of a single scan call.
///
/// # Example
///
/// ```
/// use keyrot_storage::{AttributeValue, Filter, ScanRequest};
///
/// let request = ScanRequest::builder()
///     .filter(Filter::greater_than("version", AttributeValue::number(0)))
///     .limit(25)
///     .build();
/// assert_eq!(request.limit, Some(25));
/// ```
#[derive(Clone, Debug, Default, bon::Builder)]
pub struct ScanRequest {
    /// Post-evaluation filter.
    pub filter: Option<Filter>,
    /// Maximum number of items to evaluate.
    pub limit: Option<usize>,
    /// Resume after this cursor.
    pub exclusive_start_key: Option<ContinuationToken>,
}

/// Result of a single scan call.
#[derive(Clone, Debug, Default)]
pub struct ScanOutput {
    /// Items that matched the filter, in backend order.
    pub items: Vec<Item>,
    /// Number of matching items in this page.
    pub count: usize,
    /// Number of items evaluated before filtering.
    pub scanned_count: usize,
    /// Present when more items remain after this page.
    pub last_evaluated_key: Option<ContinuationToken>,
}
