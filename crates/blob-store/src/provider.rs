//! Blob storage provider: the entry point used by the content layer.
//!
//! Bytes go to object storage; the SQLite ledger records which blob ids
//! exist. Writers of the same blob id are serialized in-process, writers of
//! different ids run in parallel.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::Stream;
use tracing::{debug, error, info, warn};

use crate::blob_id::BlobId;
use crate::content::ContentModel;
use crate::database::Database;
use crate::error::Result;
use crate::locks::BlobLocks;
use crate::storage::{ObjectStoreConfig, Storage, StorageOptions};
use crate::sweep::{Sweep, SweepConfig, SweepReport};

/// Stream of blob bytes handed out by reads.
pub type BlobStream = BoxStream<'static, Result<Bytes>>;

/// Stream of bytes accepted by writes.
pub type UploadStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Per-call context supplied by the host.
#[derive(Clone)]
pub struct CallContext {
    /// Content model consulted by cleanup
    pub content: Arc<dyn ContentModel>,
    /// Overrides the configured object storage timeout for this call
    pub timeout: Option<Duration>,
}

impl CallContext {
    pub fn new(content: Arc<dyn ContentModel>) -> Self {
        Self {
            content,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Blob storage as seen by the content layer.
#[async_trait::async_trait]
pub trait BlobStorage: Send + Sync {
    /// Open a blob for reading.
    async fn get_blob_stream(&self, blob_id: &BlobId, ctx: &CallContext) -> Result<BlobStream>;

    /// Whether the ledger knows the blob.
    async fn blob_stream_exists(&self, blob_id: &BlobId, ctx: &CallContext) -> Result<bool>;

    /// Remove a blob. Returns whether it was known.
    async fn remove_blob_stream(&self, blob_id: &BlobId, ctx: &CallContext) -> Result<bool>;

    /// Store a blob, replacing any previous content. Returns the bytes written.
    async fn set_blob_stream(
        &self,
        stream: UploadStream,
        blob_id: &BlobId,
        ctx: &CallContext,
    ) -> Result<u64>;

    /// Remove blobs no longer referenced by content.
    async fn cleanup_blobs(&self, ctx: &CallContext) -> Result<SweepReport>;
}

/// Object storage + SQLite ledger blob provider.
#[derive(Debug, Clone)]
pub struct BlobProvider {
    db: Database,
    storage: Storage,
    locks: BlobLocks,
    sweep: SweepConfig,
}

impl BlobProvider {
    /// Create a new provider with a file-based SQLite ledger.
    pub async fn new(
        db_path: &Path,
        config: ObjectStoreConfig,
        options: &StorageOptions,
    ) -> Result<Self> {
        let db = Database::new(db_path).await?;
        let storage = Storage::new(config, options).await?;
        Ok(Self::from_parts(db, storage))
    }

    /// Create a new provider with an in-memory SQLite ledger.
    pub async fn in_memory(config: ObjectStoreConfig, options: &StorageOptions) -> Result<Self> {
        let db = Database::in_memory().await?;
        let storage = Storage::new(config, options).await?;
        Ok(Self::from_parts(db, storage))
    }

    /// Create a new provider backed by the local filesystem.
    ///
    /// The ledger lives at `data_dir/blobs.sqlite`, objects under `data_dir/objects/`.
    pub async fn new_local(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("blobs.sqlite");
        let config = ObjectStoreConfig::Local {
            path: data_dir.join("objects"),
        };
        Self::new(&db_path, config, &StorageOptions::default()).await
    }

    /// Create a fully ephemeral provider (in-memory ledger + in-memory objects).
    pub async fn new_ephemeral() -> Result<Self> {
        Self::in_memory(ObjectStoreConfig::Memory, &StorageOptions::default()).await
    }

    pub(crate) fn from_parts(db: Database, storage: Storage) -> Self {
        Self {
            db,
            storage,
            locks: BlobLocks::new(),
            sweep: SweepConfig::default(),
        }
    }

    pub fn with_sweep_config(mut self, sweep: SweepConfig) -> Self {
        self.sweep = sweep;
        self
    }

    pub fn sweep_config(&self) -> &SweepConfig {
        &self.sweep
    }

    /// The blob ledger.
    pub fn index(&self) -> &Database {
        &self.db
    }

    /// Read a whole blob.
    pub async fn read(&self, blob_id: &BlobId) -> Result<Bytes> {
        debug!(blob_id = %blob_id, "reading blob");
        self.storage.get(blob_id).await
    }

    /// Open a blob as a stream of chunks.
    pub async fn read_stream(&self, blob_id: &BlobId) -> Result<BlobStream> {
        Self::open(&self.storage, blob_id).await
    }

    async fn open(storage: &Storage, blob_id: &BlobId) -> Result<BlobStream> {
        debug!(blob_id = %blob_id, "opening blob stream");
        storage.get_stream(blob_id).await
    }

    /// Whether the ledger knows the blob.
    pub async fn exists(&self, blob_id: &BlobId) -> Result<bool> {
        self.db.has_blob(blob_id).await
    }

    /// Store `data` under `blob_id`, replacing any previous content.
    ///
    /// The ledger row is only written once the upload succeeded.
    pub async fn write(&self, blob_id: &BlobId, data: Bytes) -> Result<()> {
        let size = data.len();
        let _guard = self.locks.acquire(blob_id).await;

        debug!(blob_id = %blob_id, size = size, "storing blob");
        if let Err(e) = self.storage.put(blob_id, data).await {
            warn!(blob_id = %blob_id, error = %e, "blob upload failed");
            return Err(e);
        }
        self.record(blob_id).await?;

        info!(blob_id = %blob_id, size = size, "blob stored successfully");
        Ok(())
    }

    /// Store a stream of chunks under `blob_id`. Returns the bytes written.
    pub async fn write_stream<S>(&self, blob_id: &BlobId, stream: S) -> Result<u64>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin,
    {
        self.write_stream_to(&self.storage, blob_id, stream).await
    }

    async fn write_stream_to<S>(&self, storage: &Storage, blob_id: &BlobId, stream: S) -> Result<u64>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin,
    {
        let _guard = self.locks.acquire(blob_id).await;

        debug!(blob_id = %blob_id, "streaming blob");
        let size = match storage.put_stream(blob_id, stream).await {
            Ok(size) => size,
            Err(e) => {
                warn!(blob_id = %blob_id, error = %e, "blob upload failed");
                return Err(e);
            }
        };
        self.record(blob_id).await?;

        info!(blob_id = %blob_id, size = size, "blob stored successfully");
        Ok(size)
    }

    async fn record(&self, blob_id: &BlobId) -> Result<()> {
        if let Err(e) = self.db.insert_blob(blob_id).await {
            error!(
                blob_id = %blob_id,
                error = %e,
                "blob uploaded but not recorded in the ledger"
            );
            return Err(e);
        }
        Ok(())
    }

    /// Remove a blob from the ledger and from object storage.
    ///
    /// Returns whether the ledger knew the blob. The ledger goes first, so a
    /// failed object deletion leaks bytes rather than leaving a ledger entry
    /// without content.
    pub async fn delete(&self, blob_id: &BlobId) -> Result<bool> {
        self.delete_from(&self.storage, blob_id).await
    }

    async fn delete_from(&self, storage: &Storage, blob_id: &BlobId) -> Result<bool> {
        let _guard = self.locks.acquire(blob_id).await;

        let rows = self.db.delete_blob(blob_id).await?;
        storage.delete(blob_id).await?;

        info!(blob_id = %blob_id, rows = rows, "blob deleted");
        Ok(rows > 0)
    }

    /// Sweep blobs not referenced by `content`, retrying per the sweep config.
    pub async fn cleanup(&self, content: &dyn ContentModel) -> Result<SweepReport> {
        self.cleanup_with(&self.storage, content).await
    }

    async fn cleanup_with(&self, storage: &Storage, content: &dyn ContentModel) -> Result<SweepReport> {
        let sweep = Sweep::new(
            &self.db,
            storage,
            &self.locks,
            content,
            self.sweep.grace_window,
        );
        let report = sweep.run_with_retry(&self.sweep.retry).await?;

        info!(
            referenced = report.referenced,
            malformed_references = report.malformed_references,
            orphans = report.orphans.len(),
            objects_failed = report.objects_failed.len(),
            objects_skipped = report.objects_skipped.len(),
            attempts = report.attempts,
            "cleanup sweep finished"
        );
        Ok(report)
    }
}

#[async_trait::async_trait]
impl BlobStorage for BlobProvider {
    async fn get_blob_stream(&self, blob_id: &BlobId, ctx: &CallContext) -> Result<BlobStream> {
        Self::open(&self.storage.with_timeout(ctx.timeout), blob_id).await
    }

    async fn blob_stream_exists(&self, blob_id: &BlobId, _ctx: &CallContext) -> Result<bool> {
        self.exists(blob_id).await
    }

    async fn remove_blob_stream(&self, blob_id: &BlobId, ctx: &CallContext) -> Result<bool> {
        self.delete_from(&self.storage.with_timeout(ctx.timeout), blob_id)
            .await
    }

    async fn set_blob_stream(
        &self,
        stream: UploadStream,
        blob_id: &BlobId,
        ctx: &CallContext,
    ) -> Result<u64> {
        self.write_stream_to(&self.storage.with_timeout(ctx.timeout), blob_id, stream)
            .await
    }

    async fn cleanup_blobs(&self, ctx: &CallContext) -> Result<SweepReport> {
        self.cleanup_with(&self.storage.with_timeout(ctx.timeout), ctx.content.as_ref())
            .await
    }
}
