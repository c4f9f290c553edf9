//! Request routing onto key stores.
//!
//! The gateway resolves the resource first, so an unknown name never reaches
//! a backend, then maps each [`AdminRequest`] onto one or more
//! [`KeyStore`](keyrot_storage::KeyStore) calls and shapes the result into an
//! [`AdminResponse`].

use std::sync::Arc;

use keyrot_storage::{KeyStore, KeyStoreError, KvBackend, Version};

use crate::{
    config::{ConsoleConfig, CreateRetryConfig},
    error::{AdminError, AdminResult},
    registry::StoreRegistry,
    request::{AdminRequest, ListParams},
    response::AdminResponse,
    retry::with_create_retry,
};

/// Routes admin requests to registered key stores.
#[derive(Clone, Debug)]
pub struct AdminGateway {
    registry: StoreRegistry,
    create_retry: CreateRetryConfig,
}

#[bon::bon]
impl AdminGateway {
    /// Creates a gateway over `registry`.
    ///
    /// # Optional Fields
    ///
    /// * `create_retry` - Retry policy for conflicting creates (default: a single attempt).
    #[builder]
    pub fn new(registry: StoreRegistry, #[builder(default)] create_retry: CreateRetryConfig) -> Self {
        Self { registry, create_retry }
    }
}

impl AdminGateway {
    /// Gateway exposing the configured resource over `backend`.
    #[must_use]
    pub fn from_config(config: &ConsoleConfig, backend: Arc<dyn KvBackend>) -> Self {
        Self::builder()
            .registry(StoreRegistry::from_config(config, backend))
            .create_retry(config.create_retry().clone())
            .build()
    }

    /// The resources this gateway serves.
    #[must_use]
    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// Executes `request` against the store registered as `resource`.
    ///
    /// # Errors
    ///
    /// - [`AdminError::UnknownResource`] if `resource` is not registered
    /// - [`AdminError::InvalidRequest`] for bad pagination or filters
    /// - [`AdminError::NotFound`] if a single-record lookup or delete misses
    /// - [`AdminError::VersionConflict`] if a create loses every attempt
    /// - [`AdminError::SequenceCorrupt`] if the sequence counter is unreadable
    /// - [`AdminError::Store`] on backend failure
    #[tracing::instrument(skip(self, request), fields(kind = %request.kind()))]
    pub async fn handle(&self, resource: &str, request: AdminRequest) -> AdminResult<AdminResponse> {
        let store = self.registry.get(resource)?;

        match request {
            AdminRequest::List(params) => list(store, params).await,
            AdminRequest::ListByReference(params) => list(store, params.into_list()).await,
            AdminRequest::GetOne { id } => store
                .get_one(id)
                .await?
                .map(AdminResponse::record)
                .ok_or(AdminError::NotFound { version: id }),
            AdminRequest::BatchGet { ids } => {
                Ok(AdminResponse::records(store.get_many(&ids).await?))
            },
            AdminRequest::Create(input) => {
                let (store, key): (&KeyStore, &str) = (store, &input.key);
                let record =
                    with_create_retry(&self.create_retry, move || store.create(key)).await?;
                Ok(AdminResponse::record(record))
            },
            AdminRequest::Update { id, data } => {
                Ok(AdminResponse::record(store.update(id, data.key).await?))
            },
            AdminRequest::Delete { id } => Ok(AdminResponse::record(store.delete(id).await?)),
            AdminRequest::DeleteMany { ids } => delete_many(store, ids).await,
        }
    }
}

async fn list(store: &KeyStore, params: ListParams) -> AdminResult<AdminResponse> {
    let range = params.pagination.range()?;
    let page = match params.store_filter()? {
        Some(filter) => store.list_filtered(range, filter).await?,
        None => store.list(range).await?,
    };

    let mut records = page.records;
    if let Some(sort) = params.sort {
        sort.apply(&mut records);
    }
    Ok(AdminResponse::page(records, page.count))
}

/// Deletes each version in turn; versions that are already gone are skipped.
async fn delete_many(store: &KeyStore, ids: Vec<Version>) -> AdminResult<AdminResponse> {
    let mut deleted = Vec::with_capacity(ids.len());
    for id in ids {
        match store.delete(id).await {
            Ok(record) => deleted.push(record.version),
            Err(KeyStoreError::NotFound { version }) => {
                tracing::debug!(%version, "skipping missing version");
            },
            Err(err) => return Err(err.into()),
        }
    }
    Ok(AdminResponse::ids(deleted))
}
