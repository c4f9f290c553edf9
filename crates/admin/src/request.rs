//! Admin requests.
//!
//! [`AdminRequest`] is the closed set of operations the gateway performs.
//! [`AdminRequest::from_raw`] parses the presentation layer's loosely typed
//! shape (`GET_LIST` plus a JSON params object) into it.

use std::{fmt, ops::Range, str::FromStr};

use keyrot_storage::{
    AttributeValue, Filter, KeyRecord, Version,
    keys::{KEY_ATTRIBUTE, VERSION_ATTRIBUTE},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{AdminError, AdminResult};

/// The raw request kinds understood by [`AdminRequest::from_raw`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `GET_LIST`
    List,
    /// `GET_ONE`
    GetOne,
    /// `CREATE`
    Create,
    /// `UPDATE`
    Update,
    /// `DELETE`
    Delete,
    /// `DELETE_MANY`
    DeleteMany,
    /// `GET_MANY`
    BatchGet,
    /// `GET_MANY_REFERENCE`
    ListByReference,
}

impl RequestKind {
    /// All kinds, in declaration order.
    pub const ALL: [RequestKind; 8] = [
        Self::List,
        Self::GetOne,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::DeleteMany,
        Self::BatchGet,
        Self::ListByReference,
    ];

    /// The raw kind string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "GET_LIST",
            Self::GetOne => "GET_ONE",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::DeleteMany => "DELETE_MANY",
            Self::BatchGet => "GET_MANY",
            Self::ListByReference => "GET_MANY_REFERENCE",
        }
    }

    /// Returns `true` for kinds whose response carries a `total`.
    #[must_use]
    pub fn is_list_like(self) -> bool {
        matches!(self, Self::List | Self::ListByReference)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s).ok_or_else(|| AdminError::unsupported(s))
    }
}

/// 1-based page addressing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Page number, starting at 1.
    pub page: usize,
    /// Records per page.
    pub per_page: usize,
}

impl Pagination {
    /// Creates a pagination for `page` (1-based) of `per_page` records.
    #[must_use]
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    /// Offset range covered by this page: `(page - 1) * per_page .. page * per_page`.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::InvalidRequest`] if `page` or `per_page` is zero,
    /// or the range overflows.
    pub fn range(self) -> AdminResult<Range<usize>> {
        if self.page == 0 {
            return Err(AdminError::invalid_request("page numbers start at 1"));
        }
        if self.per_page == 0 {
            return Err(AdminError::invalid_request("perPage must be at least 1"));
        }
        let end = self
            .page
            .checked_mul(self.per_page)
            .ok_or_else(|| AdminError::invalid_request("page range overflows"))?;
        Ok(end - self.per_page..end)
    }
}

/// Field a listing can be sorted by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    /// Record version (`id` on the wire).
    #[default]
    Id,
    /// Key material.
    Key,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// Sort applied to the records of one page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    /// Field to sort by.
    pub field: SortField,
    /// Direction.
    pub order: SortOrder,
}

impl Sort {
    /// Sorts `records` in place.
    pub fn apply(self, records: &mut [KeyRecord]) {
        match self.field {
            SortField::Id => records.sort_by(|a, b| a.version.cmp(&b.version)),
            SortField::Key => records.sort_by(|a, b| a.key.cmp(&b.key)),
        }
        if self.order == SortOrder::Desc {
            records.reverse();
        }
    }
}

/// Parameters of a listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListParams {
    /// Which page to return.
    pub pagination: Pagination,
    /// Sort applied within the page. Absent leaves backend order.
    #[serde(default)]
    pub sort: Option<Sort>,
    /// Equality filters on `id` or `key`.
    #[serde(default)]
    pub filter: Map<String, Value>,
}

impl ListParams {
    /// A listing of one page with no sort and no filter.
    #[must_use]
    pub fn page(page: usize, per_page: usize) -> Self {
        Self { pagination: Pagination::new(page, per_page), sort: None, filter: Map::new() }
    }

    /// Sets the sort.
    #[must_use]
    pub fn sorted(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort = Some(Sort { field, order });
        self
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn filtered(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    /// Translates the filter map into a store filter.
    ///
    /// `None` when no filter was given.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::InvalidRequest`] for fields other than `id` and
    /// `key`, or values of the wrong type.
    pub fn store_filter(&self) -> AdminResult<Option<Filter>> {
        let mut clauses = Vec::with_capacity(self.filter.len());
        for (field, value) in &self.filter {
            let clause = match field.as_str() {
                "id" => Filter::equals(VERSION_ATTRIBUTE, AttributeValue::number(version_from(value)?)),
                "key" => {
                    let key = value.as_str().ok_or_else(|| {
                        AdminError::invalid_request("filter on 'key' must be a string")
                    })?;
                    Filter::equals(KEY_ATTRIBUTE, AttributeValue::string(key))
                },
                other => {
                    return Err(AdminError::invalid_request(format!(
                        "unsupported filter field '{other}'"
                    )));
                },
            };
            clauses.push(clause);
        }

        Ok(clauses.into_iter().reduce(Filter::and))
    }
}

/// Parameters of a list-by-reference: a listing restricted to records whose
/// `target` field equals `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceParams {
    /// Referencing field.
    pub target: String,
    /// Referenced value.
    pub id: Value,
    /// The listing itself.
    #[serde(flatten)]
    pub list: ListParams,
}

impl ReferenceParams {
    /// Folds the reference into the listing's filter.
    #[must_use]
    pub fn into_list(self) -> ListParams {
        let Self { target, id, mut list } = self;
        list.filter.insert(target, id);
        list
    }
}

/// Record payload for create and update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    /// Key material.
    pub key: String,
}

impl KeyInput {
    /// Creates a payload.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// A typed admin request.
#[derive(Clone, Debug, PartialEq)]
pub enum AdminRequest {
    /// One page of records with the total count.
    List(ListParams),
    /// A single record.
    GetOne {
        /// Version to fetch.
        id: Version,
    },
    /// A new record under a fresh version.
    Create(KeyInput),
    /// Overwrite (or create) the record at `id`.
    Update {
        /// Version to write.
        id: Version,
        /// New payload.
        data: KeyInput,
    },
    /// Remove one record.
    Delete {
        /// Version to remove.
        id: Version,
    },
    /// Remove several records.
    DeleteMany {
        /// Versions to remove.
        ids: Vec<Version>,
    },
    /// Several records by version.
    BatchGet {
        /// Versions to fetch.
        ids: Vec<Version>,
    },
    /// One page of records referencing a value, with the total count.
    ListByReference(ReferenceParams),
}

#[derive(Deserialize)]
struct IdParams {
    #[serde(deserialize_with = "deserialize_version")]
    id: Version,
}

#[derive(Deserialize)]
struct IdsParams {
    #[serde(deserialize_with = "deserialize_versions")]
    ids: Vec<Version>,
}

#[derive(Deserialize)]
struct DataParams {
    data: KeyInput,
}

#[derive(Deserialize)]
struct UpdateParams {
    #[serde(deserialize_with = "deserialize_version")]
    id: Version,
    data: KeyInput,
}

impl AdminRequest {
    /// Parses a raw request.
    ///
    /// Ids are accepted as JSON numbers or numeric strings. Fields the
    /// gateway does not use (such as `previousData`) are ignored.
    ///
    /// # Errors
    ///
    /// - [`AdminError::UnsupportedOperation`] if `kind` is not a known kind
    /// - [`AdminError::InvalidRequest`] if `params` does not fit the kind
    ///
    /// # Example
    ///
    /// ```
    /// use keyrot_admin::AdminRequest;
    /// use serde_json::json;
    ///
    /// let request = AdminRequest::from_raw(
    ///     "GET_LIST",
    ///     json!({"pagination": {"page": 2, "perPage": 10}, "sort": {"field": "id", "order": "DESC"}}),
    /// )?;
    /// assert!(matches!(request, AdminRequest::List(_)));
    /// # Ok::<(), keyrot_admin::AdminError>(())
    /// ```
    pub fn from_raw(kind: &str, params: Value) -> AdminResult<Self> {
        let kind: RequestKind = kind.parse()?;
        let request = match kind {
            RequestKind::List => Self::List(parse(kind, params)?),
            RequestKind::GetOne => Self::GetOne { id: parse::<IdParams>(kind, params)?.id },
            RequestKind::Create => Self::Create(parse::<DataParams>(kind, params)?.data),
            RequestKind::Update => {
                let UpdateParams { id, data } = parse(kind, params)?;
                Self::Update { id, data }
            },
            RequestKind::Delete => Self::Delete { id: parse::<IdParams>(kind, params)?.id },
            RequestKind::DeleteMany => {
                Self::DeleteMany { ids: parse::<IdsParams>(kind, params)?.ids }
            },
            RequestKind::BatchGet => Self::BatchGet { ids: parse::<IdsParams>(kind, params)?.ids },
            RequestKind::ListByReference => Self::ListByReference(parse(kind, params)?),
        };
        Ok(request)
    }

    /// The kind of this request.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::List(_) => RequestKind::List,
            Self::GetOne { .. } => RequestKind::GetOne,
            Self::Create(_) => RequestKind::Create,
            Self::Update { .. } => RequestKind::Update,
            Self::Delete { .. } => RequestKind::Delete,
            Self::DeleteMany { .. } => RequestKind::DeleteMany,
            Self::BatchGet { .. } => RequestKind::BatchGet,
            Self::ListByReference(_) => RequestKind::ListByReference,
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(kind: RequestKind, params: Value) -> AdminResult<T> {
    serde_json::from_value(params)
        .map_err(|e| AdminError::invalid_request(format!("malformed {kind} params: {e}")))
}

/// Reads a version from a JSON number or numeric string.
fn version_from(value: &Value) -> AdminResult<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| AdminError::invalid_request(format!("'{value}' is not a record id")))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn into_version<E: serde::de::Error>(self) -> Result<Version, E> {
        match self {
            Self::Number(n) => Ok(Version(n)),
            Self::Text(s) => s
                .trim()
                .parse()
                .map(Version)
                .map_err(|_| E::custom(format!("'{s}' is not a record id"))),
        }
    }
}

fn deserialize_version<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
    RawId::deserialize(deserializer)?.into_version()
}

fn deserialize_versions<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Version>, D::Error> {
    Vec::<RawId>::deserialize(deserializer)?.into_iter().map(RawId::into_version).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in RequestKind::ALL {
            assert_eq!(kind.as_str().parse::<RequestKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let result = AdminRequest::from_raw("GET_EVERYTHING", json!({}));
        assert!(matches!(
            result,
            Err(AdminError::UnsupportedOperation { ref kind }) if kind == "GET_EVERYTHING"
        ));
    }

    #[test]
    fn test_pagination_range() {
        assert_eq!(Pagination::new(1, 10).range().unwrap(), 0..10);
        assert_eq!(Pagination::new(3, 25).range().unwrap(), 50..75);
    }

    #[test]
    fn test_pagination_rejects_zero() {
        assert!(matches!(Pagination::new(0, 10).range(), Err(AdminError::InvalidRequest { .. })));
        assert!(matches!(Pagination::new(1, 0).range(), Err(AdminError::InvalidRequest { .. })));
        assert!(matches!(
            Pagination::new(usize::MAX, 2).range(),
            Err(AdminError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_parse_list() {
        let request = AdminRequest::from_raw(
            "GET_LIST",
            json!({
                "pagination": {"page": 2, "perPage": 5},
                "sort": {"field": "key", "order": "DESC"},
                "filter": {}
            }),
        )
        .unwrap();

        let AdminRequest::List(params) = request else { panic!("expected a list request") };
        assert_eq!(params.pagination, Pagination::new(2, 5));
        assert_eq!(params.sort, Some(Sort { field: SortField::Key, order: SortOrder::Desc }));
        assert!(params.store_filter().unwrap().is_none());
    }

    #[test]
    fn test_parse_ids_as_numbers_or_strings() {
        assert_eq!(
            AdminRequest::from_raw("GET_ONE", json!({"id": "7"})).unwrap(),
            AdminRequest::GetOne { id: Version(7) }
        );
        assert_eq!(
            AdminRequest::from_raw("DELETE", json!({"id": 7, "previousData": {"id": 7}})).unwrap(),
            AdminRequest::Delete { id: Version(7) }
        );
        assert_eq!(
            AdminRequest::from_raw("GET_MANY", json!({"ids": [1, "2", 3]})).unwrap(),
            AdminRequest::BatchGet { ids: vec![Version(1), Version(2), Version(3)] }
        );
    }

    #[test]
    fn test_parse_update_ignores_extra_data_fields() {
        let request = AdminRequest::from_raw(
            "UPDATE",
            json!({"id": 99, "data": {"id": 99, "key": "CCCC"}, "previousData": {"id": 99}}),
        )
        .unwrap();
        assert_eq!(request, AdminRequest::Update { id: Version(99), data: KeyInput::new("CCCC") });
    }

    #[test]
    fn test_malformed_params_are_invalid() {
        for (kind, params) in [
            ("GET_LIST", json!({"pagination": {"page": 1}})),
            ("GET_ONE", json!({"id": "seven"})),
            ("GET_ONE", json!({"id": true})),
            ("CREATE", json!({"data": {}})),
            ("DELETE_MANY", json!({"ids": "1,2"})),
            ("GET_MANY_REFERENCE", json!({"id": 1})),
        ] {
            let result = AdminRequest::from_raw(kind, params);
            assert!(
                matches!(result, Err(AdminError::InvalidRequest { .. })),
                "{kind} should be invalid, got: {result:?}"
            );
        }
    }

    #[test]
    fn test_reference_folds_into_filter() {
        let request = AdminRequest::from_raw(
            "GET_MANY_REFERENCE",
            json!({
                "target": "key",
                "id": "AAAA",
                "pagination": {"page": 1, "perPage": 10},
                "sort": {"field": "id", "order": "ASC"},
                "filter": {}
            }),
        )
        .unwrap();

        let AdminRequest::ListByReference(params) = request else {
            panic!("expected a reference request")
        };
        let list = params.into_list();
        assert_eq!(list.filter.get("key"), Some(&json!("AAAA")));
        assert!(list.store_filter().unwrap().is_some());
    }

    #[test]
    fn test_unsupported_filter_field() {
        let params = ListParams::page(1, 10).filtered("owner", "me");
        assert!(matches!(params.store_filter(), Err(AdminError::InvalidRequest { .. })));
    }

    #[test]
    fn test_sort_apply() {
        let mut records =
            vec![KeyRecord::new(2, "b"), KeyRecord::new(3, "a"), KeyRecord::new(1, "c")];

        Sort { field: SortField::Id, order: SortOrder::Desc }.apply(&mut records);
        let versions: Vec<i64> = records.iter().map(|r| r.version.0).collect();
        assert_eq!(versions, vec![3, 2, 1]);

        Sort { field: SortField::Key, order: SortOrder::Asc }.apply(&mut records);
        let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
