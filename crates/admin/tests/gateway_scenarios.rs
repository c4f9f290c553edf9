//! Gateway scenarios over an in-memory table.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use keyrot_admin::{
    AdminError, AdminGateway, AdminRequest, ConsoleConfig, CreateRetryConfig, KeyInput,
    ListParams, SortField, SortOrder, StoreRegistry,
};
use keyrot_storage::{
    AttributeValue, Item, ItemKey, KeyRecord, KeyStore, KvBackend, MemoryBackend, ScanOutput,
    ScanRequest, StorageError, StorageResult, Version,
    keys::{COUNTER_PARTITION, COUNTER_VERSION, KEY_ATTRIBUTE, PARTITION_ATTRIBUTE, VERSION_ATTRIBUTE},
    testutil::{TEST_TABLE, key_material},
};
use serde_json::json;

const RESOURCE: &str = "Encryption";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Forwards to a `MemoryBackend`, counting every call.
#[derive(Default)]
struct CountingBackend {
    inner: MemoryBackend,
    calls: AtomicUsize,
}

impl CountingBackend {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvBackend for CountingBackend {
    async fn get_item(&self, table: &str, key: &ItemKey) -> StorageResult<Option<Item>> {
        self.tick();
        self.inner.get_item(table, key).await
    }

    async fn put_item(&self, table: &str, item: Item) -> StorageResult<()> {
        self.tick();
        self.inner.put_item(table, item).await
    }

    async fn put_item_if_absent(&self, table: &str, item: Item) -> StorageResult<()> {
        self.tick();
        self.inner.put_item_if_absent(table, item).await
    }

    async fn delete_item(&self, table: &str, key: &ItemKey) -> StorageResult<Option<Item>> {
        self.tick();
        self.inner.delete_item(table, key).await
    }

    async fn scan(&self, table: &str, request: ScanRequest) -> StorageResult<ScanOutput> {
        self.tick();
        self.inner.scan(table, request).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.tick();
        self.inner.health_check().await
    }
}

/// Commits guarded inserts, then reports a timeout as if the reply was lost.
#[derive(Default)]
struct LostAckBackend {
    inner: MemoryBackend,
}

#[async_trait]
impl KvBackend for LostAckBackend {
    async fn get_item(&self, table: &str, key: &ItemKey) -> StorageResult<Option<Item>> {
        self.inner.get_item(table, key).await
    }

    async fn put_item(&self, table: &str, item: Item) -> StorageResult<()> {
        self.inner.put_item(table, item).await
    }

    async fn put_item_if_absent(&self, table: &str, item: Item) -> StorageResult<()> {
        self.inner.put_item_if_absent(table, item).await?;
        Err(StorageError::timeout())
    }

    async fn delete_item(&self, table: &str, key: &ItemKey) -> StorageResult<Option<Item>> {
        self.inner.delete_item(table, key).await
    }

    async fn scan(&self, table: &str, request: ScanRequest) -> StorageResult<ScanOutput> {
        self.inner.scan(table, request).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}

fn retrying_config(max_attempts: u32) -> ConsoleConfig {
    ConsoleConfig::builder()
        .table_name(TEST_TABLE)
        .create_retry(
            CreateRetryConfig::builder()
                .max_attempts(max_attempts)
                .initial_backoff(Duration::from_millis(1))
                .max_backoff(Duration::from_millis(2))
                .build(),
        )
        .build()
        .unwrap()
}

fn config() -> ConsoleConfig {
    ConsoleConfig::builder().table_name(TEST_TABLE).scan_page_size(3).build().unwrap()
}

fn gateway_over(backend: Arc<dyn KvBackend>) -> AdminGateway {
    AdminGateway::from_config(&config(), backend)
}

async fn create(gateway: &AdminGateway, key: &str) -> KeyRecord {
    gateway
        .handle(RESOURCE, AdminRequest::Create(KeyInput::new(key)))
        .await
        .expect("create")
        .as_record()
        .cloned()
        .expect("single record")
}

fn counter_item(raw: &str) -> Item {
    Item::from([
        (PARTITION_ATTRIBUTE.to_owned(), AttributeValue::string(COUNTER_PARTITION)),
        (VERSION_ATTRIBUTE.to_owned(), AttributeValue::number(COUNTER_VERSION.0)),
        (KEY_ATTRIBUTE.to_owned(), AttributeValue::string(raw)),
    ])
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_resource_fails_before_touching_backend() {
    let backend = Arc::new(CountingBackend::default());
    let gateway = gateway_over(backend.clone());

    for request in [
        AdminRequest::List(ListParams::page(1, 10)),
        AdminRequest::GetOne { id: Version(1) },
        AdminRequest::Create(KeyInput::new(key_material('A'))),
        AdminRequest::Delete { id: Version(1) },
    ] {
        let result = gateway.handle("Users", request).await;
        assert!(matches!(result, Err(AdminError::UnknownResource { ref name }) if name == "Users"));
    }
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn additional_resources_are_routed_to_their_own_tables() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
    let registry = StoreRegistry::from_config(&config(), backend.clone()).with_store(
        "Signing",
        KeyStore::builder().backend(backend).table("signing-keys").build(),
    );
    let gateway = AdminGateway::builder().registry(registry).build();

    gateway.handle("Signing", AdminRequest::Create(KeyInput::new("S"))).await.unwrap();
    let encryption =
        gateway.handle(RESOURCE, AdminRequest::List(ListParams::page(1, 10))).await.unwrap();
    let signing =
        gateway.handle("Signing", AdminRequest::List(ListParams::page(1, 10))).await.unwrap();

    assert_eq!(encryption.total, Some(0));
    assert_eq!(signing.total, Some(1));
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_list_delete_scenario() {
    let gateway = gateway_over(Arc::new(MemoryBackend::new()));

    assert_eq!(create(&gateway, &key_material('A')).await.version, Version(1));
    assert_eq!(create(&gateway, &key_material('B')).await.version, Version(2));

    let listed = gateway.handle(RESOURCE, AdminRequest::List(ListParams::page(1, 10))).await.unwrap();
    assert_eq!(listed.total, Some(2));
    assert_eq!(listed.as_records().unwrap().len(), 2);

    let deleted = gateway.handle(RESOURCE, AdminRequest::Delete { id: Version(1) }).await.unwrap();
    assert_eq!(deleted.as_record(), Some(&KeyRecord::new(1, key_material('A'))));

    let result = gateway.handle(RESOURCE, AdminRequest::GetOne { id: Version(1) }).await;
    assert!(matches!(result, Err(AdminError::NotFound { version: Version(1) })));
}

#[tokio::test]
async fn update_of_missing_version_creates_it() {
    let gateway = gateway_over(Arc::new(MemoryBackend::new()));

    let request = AdminRequest::Update { id: Version(99), data: KeyInput::new(key_material('C')) };
    gateway.handle(RESOURCE, request).await.unwrap();

    let fetched = gateway.handle(RESOURCE, AdminRequest::GetOne { id: Version(99) }).await.unwrap();
    assert_eq!(fetched.as_record(), Some(&KeyRecord::new(99, key_material('C'))));
}

#[tokio::test]
async fn update_of_reserved_version_is_invalid() {
    let gateway = gateway_over(Arc::new(MemoryBackend::new()));

    for id in [Version(0), COUNTER_VERSION] {
        let request = AdminRequest::Update { id, data: KeyInput::new("x") };
        let result = gateway.handle(RESOURCE, request).await;
        assert!(matches!(result, Err(AdminError::InvalidRequest { .. })), "{id}: {result:?}");
    }
}

#[tokio::test]
async fn delete_of_missing_version_is_not_found() {
    let gateway = gateway_over(Arc::new(MemoryBackend::new()));
    let result = gateway.handle(RESOURCE, AdminRequest::Delete { id: Version(3) }).await;
    assert!(matches!(result, Err(AdminError::NotFound { version: Version(3) })));
}

#[tokio::test]
async fn batch_get_skips_missing_and_keeps_order() {
    let gateway = gateway_over(Arc::new(MemoryBackend::new()));
    for fill in ['A', 'B', 'C'] {
        create(&gateway, &key_material(fill)).await;
    }

    let response = gateway
        .handle(RESOURCE, AdminRequest::BatchGet { ids: vec![Version(3), Version(9), Version(1)] })
        .await
        .unwrap();

    let versions: Vec<Version> =
        response.as_records().unwrap().iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![Version(3), Version(1)]);
    assert_eq!(response.total, None);
}

#[tokio::test]
async fn list_pages_partition_the_records() {
    let gateway = gateway_over(Arc::new(MemoryBackend::new()));
    for i in 0..7 {
        create(&gateway, &format!("key-{i}")).await;
    }

    let mut seen = Vec::new();
    for page in 1..=3 {
        let params = ListParams::page(page, 3).sorted(SortField::Id, SortOrder::Asc);
        let response = gateway.handle(RESOURCE, AdminRequest::List(params)).await.unwrap();
        assert_eq!(response.total, Some(7));
        seen.extend(response.as_records().unwrap().iter().map(|r| r.version.0));
    }

    seen.sort_unstable();
    assert_eq!(seen, (1..=7).collect::<Vec<_>>());
}

#[tokio::test]
async fn list_by_reference_filters_on_target() {
    let gateway = gateway_over(Arc::new(MemoryBackend::new()));
    create(&gateway, "shared").await;
    create(&gateway, "other").await;
    create(&gateway, "shared").await;

    let request = AdminRequest::from_raw(
        "GET_MANY_REFERENCE",
        json!({
            "target": "key",
            "id": "shared",
            "pagination": {"page": 1, "perPage": 10},
            "sort": {"field": "id", "order": "DESC"},
            "filter": {}
        }),
    )
    .unwrap();
    let response = gateway.handle(RESOURCE, request).await.unwrap();

    let versions: Vec<i64> = response.as_records().unwrap().iter().map(|r| r.version.0).collect();
    assert_eq!(versions, vec![3, 1]);
    assert_eq!(response.total, Some(2));
}

#[tokio::test]
async fn list_with_unsupported_filter_is_invalid() {
    let gateway = gateway_over(Arc::new(MemoryBackend::new()));
    let params = ListParams::page(1, 10).filtered("owner", "alice");
    let result = gateway.handle(RESOURCE, AdminRequest::List(params)).await;
    assert!(matches!(result, Err(AdminError::InvalidRequest { .. })));
}

#[tokio::test]
async fn zero_page_is_invalid() {
    let gateway = gateway_over(Arc::new(MemoryBackend::new()));
    let result = gateway.handle(RESOURCE, AdminRequest::List(ListParams::page(0, 10))).await;
    assert!(matches!(result, Err(AdminError::InvalidRequest { .. })));
}

// ---------------------------------------------------------------------------
// Sequence failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corrupt_counter_blocks_creation() {
    let backend = Arc::new(MemoryBackend::new());
    backend.put_item(TEST_TABLE, counter_item("not-a-number")).await.unwrap();
    let gateway = gateway_over(backend.clone());

    let result = gateway.handle(RESOURCE, AdminRequest::Create(KeyInput::new("x"))).await;
    assert!(matches!(
        result,
        Err(AdminError::SequenceCorrupt { value: Some(ref v) }) if v == "not-a-number"
    ));

    // Only the counter remains.
    assert_eq!(backend.len(TEST_TABLE), 1);
}

#[tokio::test]
async fn conflicting_create_surfaces_without_retry() {
    let backend = Arc::new(MemoryBackend::new());
    let gateway = gateway_over(backend);

    // An upsert at version 1 leaves the counter untouched, so the next
    // allocation lands on an occupied version.
    gateway
        .handle(RESOURCE, AdminRequest::Update { id: Version(1), data: KeyInput::new("planted") })
        .await
        .unwrap();

    let result = gateway.handle(RESOURCE, AdminRequest::Create(KeyInput::new("new"))).await;
    assert!(matches!(result, Err(AdminError::VersionConflict { version: Version(1) })));

    let kept = gateway.handle(RESOURCE, AdminRequest::GetOne { id: Version(1) }).await.unwrap();
    assert_eq!(kept.as_record().unwrap().key, "planted");
}

#[tokio::test]
async fn conflicting_create_succeeds_under_retry_policy() {
    let gateway = AdminGateway::from_config(&retrying_config(2), Arc::new(MemoryBackend::new()));

    gateway
        .handle(RESOURCE, AdminRequest::Update { id: Version(1), data: KeyInput::new("planted") })
        .await
        .unwrap();

    let created = create(&gateway, "new").await;
    assert_eq!(created, KeyRecord::new(2, "new"));
}

#[tokio::test]
async fn create_with_lost_acknowledgement_is_not_repeated() {
    let backend = Arc::new(LostAckBackend::default());
    let gateway = AdminGateway::from_config(&retrying_config(3), backend.clone());

    let result = gateway.handle(RESOURCE, AdminRequest::Create(KeyInput::new("once"))).await;
    assert!(matches!(result, Err(AdminError::Store(_))), "got: {result:?}");

    // One record plus the counter: the ambiguous failure was not retried.
    assert_eq!(backend.inner.len(TEST_TABLE), 2);
    let listed = gateway.handle(RESOURCE, AdminRequest::List(ListParams::page(1, 10))).await.unwrap();
    assert_eq!(listed.total, Some(1));
    assert_eq!(listed.as_records().unwrap(), [KeyRecord::new(1, "once")]);
}
