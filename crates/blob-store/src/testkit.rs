//! Shared fixtures for unit tests.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    ClientOptions, GetOptions, GetResult, GetResultPayload, ListResult, MultipartUpload,
    ObjectMeta, ObjectStore, PutMultipartOpts, PutOptions, PutPayload, PutResult, RetryConfig,
};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::content::{ContentModel, FieldTable, StaticContentModel, Template, TemplateField};
use crate::database::Database;
use crate::error::{BlobStoreError, Result};
use crate::provider::BlobProvider;
use crate::storage::Storage;
use crate::sweep::{RetryPolicy, SweepConfig};

/// In-memory provider with no grace window and fast retries.
pub async fn ephemeral_provider() -> BlobProvider {
    BlobProvider::new_ephemeral()
        .await
        .unwrap()
        .with_sweep_config(SweepConfig {
            grace_window: Duration::ZERO,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        })
}

/// Provider over a [`HookedStore`] with an in-memory ledger.
pub async fn hooked_provider(hook: Hook) -> BlobProvider {
    let db = Database::in_memory().await.unwrap();
    let storage = Storage::from_store(Arc::new(HookedStore::new(hook)), Duration::from_secs(5));
    BlobProvider::from_parts(db, storage)
}

/// S3 storage pointed at a port nothing listens on.
pub fn unreachable_storage() -> Storage {
    let store = AmazonS3Builder::new()
        .with_bucket_name("unreachable")
        .with_region("us-east-1")
        .with_endpoint("http://127.0.0.1:9")
        .with_allow_http(true)
        .with_access_key_id("test")
        .with_secret_access_key("test")
        .with_client_options(ClientOptions::new().with_timeout(Duration::from_secs(2)))
        .with_retry(RetryConfig {
            max_retries: 0,
            retry_timeout: Duration::from_millis(100),
            ..Default::default()
        })
        .build()
        .unwrap();
    Storage::from_store(Arc::new(store), Duration::from_secs(5))
}

/// A content model with one template holding a blob field and a text field.
pub struct TestContent {
    pub model: StaticContentModel,
    pub blob_field: Uuid,
    pub text_field: Uuid,
}

impl TestContent {
    pub fn new() -> Self {
        let blob_field = Uuid::new_v4();
        let text_field = Uuid::new_v4();
        let model = StaticContentModel::new(vec![template("Image", blob_field, text_field)]);
        Self {
            model,
            blob_field,
            text_field,
        }
    }

    /// Two templates declaring the same blob field.
    pub fn with_duplicate_template() -> Self {
        let blob_field = Uuid::new_v4();
        let text_field = Uuid::new_v4();
        let model = StaticContentModel::new(vec![
            template("Image", blob_field, text_field),
            template("Thumbnail", blob_field, text_field),
        ]);
        Self {
            model,
            blob_field,
            text_field,
        }
    }
}

fn template(name: &str, blob_field: Uuid, text_field: Uuid) -> Template {
    Template {
        id: Uuid::new_v4(),
        name: name.to_string(),
        fields: vec![
            TemplateField {
                id: blob_field,
                name: "Blob".to_string(),
                is_blob: true,
            },
            TemplateField {
                id: text_field,
                name: "Alt".to_string(),
                is_blob: false,
            },
        ],
    }
}

/// Store a field value for a fresh item.
pub async fn set_field(db: &Database, table: FieldTable, field_id: Uuid, value: &str) {
    let sql = match table {
        FieldTable::Archived => format!(
            "INSERT INTO {} (id, archival_id, item_id, field_id, value) VALUES (?, ?, ?, ?, ?)",
            table.table_name()
        ),
        _ => format!(
            "INSERT INTO {} (id, item_id, field_id, value) VALUES (?, ?, ?, ?)",
            table.table_name()
        ),
    };

    let mut query = sqlx::query(&sql).bind(Uuid::new_v4().to_string());
    if table == FieldTable::Archived {
        query = query.bind(Uuid::new_v4().to_string());
    }
    query
        .bind(Uuid::new_v4().to_string())
        .bind(field_id.to_string())
        .bind(value.to_string())
        .execute(db.pool())
        .await
        .unwrap();
}

/// Fails its first `failures` calls, then delegates.
pub struct FlakyContent {
    inner: StaticContentModel,
    failures: u32,
    calls: AtomicU32,
}

impl FlakyContent {
    pub fn new(inner: StaticContentModel, failures: u32) -> Self {
        Self {
            inner,
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContentModel for FlakyContent {
    async fn templates(&self) -> Result<Vec<Template>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(BlobStoreError::ContentModel(format!(
                "content database unavailable (call {call})"
            )));
        }
        self.inner.templates().await
    }
}

/// Lets a test hold object deletes mid-flight.
#[derive(Debug, Default)]
pub struct DeleteGate {
    /// Notified when a delete reaches the store
    pub started: Notify,
    /// Notify once to let the pending delete through
    pub release: Notify,
}

#[derive(Debug)]
pub enum Hook {
    /// Deletes wait on the gate
    GateDeletes(Arc<DeleteGate>),
    /// Listings never yield
    StallList,
    /// Reads yield the first half of the object, then never yield again
    StallReads,
}

/// In-memory object store with one misbehaving call.
#[derive(Debug)]
pub struct HookedStore {
    inner: InMemory,
    hook: Hook,
}

impl HookedStore {
    pub fn new(hook: Hook) -> Self {
        Self {
            inner: InMemory::new(),
            hook,
        }
    }
}

impl fmt::Display for HookedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HookedStore({})", self.inner)
    }
}

#[async_trait::async_trait]
impl ObjectStore for HookedStore {
    async fn put_opts(
        &self,
        location: &ObjectPath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &ObjectPath,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &ObjectPath,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        let result = self.inner.get_opts(location, options).await?;
        if !matches!(self.hook, Hook::StallReads) {
            return Ok(result);
        }

        let meta = result.meta.clone();
        let range = result.range.clone();
        let attributes = result.attributes.clone();
        let data = result.bytes().await?;
        let head = data.slice(..data.len() / 2);
        let payload = futures::stream::once(async move { Ok::<_, object_store::Error>(head) })
            .chain(futures::stream::pending())
            .boxed();
        Ok(GetResult {
            payload: GetResultPayload::Stream(payload),
            meta,
            range,
            attributes,
        })
    }

    async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
        if let Hook::GateDeletes(gate) = &self.hook {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&ObjectPath>) -> BoxStream<'_, object_store::Result<ObjectMeta>> {
        match self.hook {
            Hook::StallList => futures::stream::pending().boxed(),
            _ => self.inner.list(prefix),
        }
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&ObjectPath>,
    ) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(
        &self,
        from: &ObjectPath,
        to: &ObjectPath,
    ) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}
