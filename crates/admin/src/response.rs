//! Admin responses.

use keyrot_storage::{KeyRecord, Version};
use serde::Serialize;

/// Payload of an [`AdminResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// A single record.
    Record(KeyRecord),
    /// Several records.
    Records(Vec<KeyRecord>),
    /// Versions affected by a bulk operation.
    Ids(Vec<Version>),
}

/// Gateway response, serialized as `{"data": ..., "total": ...}`.
///
/// `total` is present only for listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdminResponse {
    /// The response payload.
    pub data: ResponseData,
    /// Total matching records, for listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl AdminResponse {
    /// A single-record response.
    #[must_use]
    pub fn record(record: KeyRecord) -> Self {
        Self { data: ResponseData::Record(record), total: None }
    }

    /// A multi-record response without a total.
    #[must_use]
    pub fn records(records: Vec<KeyRecord>) -> Self {
        Self { data: ResponseData::Records(records), total: None }
    }

    /// One page of a listing with the total count.
    #[must_use]
    pub fn page(records: Vec<KeyRecord>, total: usize) -> Self {
        Self { data: ResponseData::Records(records), total: Some(total) }
    }

    /// A response listing affected versions.
    #[must_use]
    pub fn ids(ids: Vec<Version>) -> Self {
        Self { data: ResponseData::Ids(ids), total: None }
    }

    /// The single record, if this is a single-record response.
    #[must_use]
    pub fn as_record(&self) -> Option<&KeyRecord> {
        match &self.data {
            ResponseData::Record(record) => Some(record),
            _ => None,
        }
    }

    /// The records, if this is a multi-record response.
    #[must_use]
    pub fn as_records(&self) -> Option<&[KeyRecord]> {
        match &self.data {
            ResponseData::Records(records) => Some(records),
            _ => None,
        }
    }

    /// The versions, if this is a bulk-operation response.
    #[must_use]
    pub fn as_ids(&self) -> Option<&[Version]> {
        match &self.data {
            ResponseData::Ids(ids) => Some(ids),
            _ => None,
        }
    }
}
