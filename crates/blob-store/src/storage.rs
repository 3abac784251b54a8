//! Object storage backend abstraction (S3/MinIO/local filesystem/memory).
//!
//! Blobs are stored flat within the bucket, keyed by the hyphenated form of
//! their [`BlobId`]. Every remote call is bounded by a request timeout, and
//! failures are surfaced to the caller: a missing key is
//! [`BlobStoreError::NotFound`], anything else keeps its cause.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, ObjectStore, RetryConfig, WriteMultipart};
use serde::{Deserialize, Serialize};

use crate::blob_id::BlobId;
use crate::error::{BlobStoreError, Result};

/// Number of multipart parts allowed in flight during a streamed upload.
const MAX_PART_CONCURRENCY: usize = 4;

/// Configuration for the object storage backend.
///
/// S3 credentials are deliberately absent: they are read from the standard
/// AWS environment variables (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
/// `AWS_SESSION_TOKEN`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to the environment, then "us-east-1")
        #[serde(default)]
        region: Option<String>,
        /// Optional endpoint URL (e.g., "http://localhost:9000" for MinIO)
        #[serde(default)]
        endpoint: Option<String>,
        /// Allow plain HTTP endpoints
        #[serde(default)]
        allow_http: bool,
    },
}

/// Limits applied to every object storage call.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Upper bound on a single call, including transport retries
    pub request_timeout: Duration,
    /// Transport-level retries for S3 requests
    pub max_retries: usize,
    /// Total time budget for transport-level retries of one request
    pub retry_timeout: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_timeout: Duration::from_secs(20),
        }
    }
}

/// Wrapper around different object storage backends.
#[derive(Debug, Clone)]
pub(crate) struct Storage {
    inner: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl Storage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig, options: &StorageOptions) -> Result<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),

            ObjectStoreConfig::Local { path } => {
                // Ensure directory exists
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?,
                )
            }

            ObjectStoreConfig::S3 {
                bucket,
                region,
                endpoint,
                allow_http,
            } => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_allow_http(*allow_http)
                    .with_client_options(ClientOptions::new().with_timeout(options.request_timeout))
                    .with_retry(RetryConfig {
                        max_retries: options.max_retries,
                        retry_timeout: options.retry_timeout,
                        ..Default::default()
                    });
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint);
                }

                let store: Arc<dyn ObjectStore> = Arc::new(
                    builder
                        .build()
                        .map_err(|e| BlobStoreError::InvalidConfig(e.to_string()))?,
                );

                Self::from_store(store.clone(), options.request_timeout)
                    .check_bucket(bucket)
                    .await?;

                store
            }
        };

        Ok(Self {
            inner,
            timeout: options.request_timeout,
        })
    }

    /// Wrap an already constructed object store.
    pub(crate) fn from_store(inner: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// A handle to the same backend with a caller-supplied timeout.
    pub fn with_timeout(&self, timeout: Option<Duration>) -> Self {
        Self {
            inner: self.inner.clone(),
            timeout: timeout.unwrap_or(self.timeout),
        }
    }

    /// Fail fast if the bucket is missing, by listing its first object.
    async fn check_bucket(&self, bucket: &str) -> Result<()> {
        let prefix = ObjectPath::from("");
        let mut listing = self.inner.list(Some(&prefix));
        match self.bounded("list", listing.try_next()).await {
            Ok(_) => Ok(()),
            Err(BlobStoreError::ObjectStore(object_store::Error::NotFound { .. })) => {
                Err(BlobStoreError::BucketNotFound(bucket.to_string()))
            }
            Err(BlobStoreError::ObjectStore(e)) if e.to_string().contains("NoSuchBucket") => {
                Err(BlobStoreError::BucketNotFound(bucket.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Build the object path for a blob.
    fn object_path(id: &BlobId) -> ObjectPath {
        ObjectPath::from(id.to_string())
    }

    /// Run an object store call under the request timeout.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = object_store::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(BlobStoreError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }

    /// Put blob data into storage, replacing any existing object.
    pub async fn put(&self, id: &BlobId, data: Bytes) -> Result<()> {
        let path = Self::object_path(id);
        self.bounded("put", self.inner.put(&path, data.into())).await?;
        Ok(())
    }

    /// Upload a stream of chunks as a multipart object.
    ///
    /// Returns the number of bytes written. The upload is aborted if the
    /// source stream or any part upload fails.
    pub async fn put_stream<S>(&self, id: &BlobId, mut stream: S) -> Result<u64>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin,
    {
        let path = Self::object_path(id);
        let upload = self.bounded("put", self.inner.put_multipart(&path)).await?;
        let mut writer = WriteMultipart::new(upload);
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };
            let capacity = self
                .bounded("put", writer.wait_for_capacity(MAX_PART_CONCURRENCY))
                .await;
            if let Err(e) = capacity {
                let _ = writer.abort().await;
                return Err(e);
            }
            writer.write(&chunk);
            written += chunk.len() as u64;
        }

        // Some backends reject a multipart upload without parts
        if written == 0 {
            let _ = writer.abort().await;
            self.put(id, Bytes::new()).await?;
            return Ok(0);
        }

        self.bounded("put", writer.finish()).await?;
        Ok(written)
    }

    /// Get blob data from storage.
    pub async fn get(&self, id: &BlobId) -> Result<Bytes> {
        let path = Self::object_path(id);
        let result = self
            .bounded("get", self.inner.get(&path))
            .await
            .map_err(|e| not_found_as(id, e))?;
        self.bounded("get", result.bytes())
            .await
            .map_err(|e| not_found_as(id, e))
    }

    /// Open blob data from storage as a stream of chunks.
    ///
    /// Each chunk is awaited under the request timeout. The stream ends
    /// after the first error.
    pub async fn get_stream(&self, id: &BlobId) -> Result<BoxStream<'static, Result<Bytes>>> {
        let path = Self::object_path(id);
        let result = self
            .bounded("get", self.inner.get(&path))
            .await
            .map_err(|e| not_found_as(id, e))?;

        let id = *id;
        let timeout = self.timeout;
        let chunks = stream::unfold(Some(result.into_stream()), move |state| async move {
            let mut inner = match state {
                Some(inner) => inner,
                None => return None,
            };
            match tokio::time::timeout(timeout, inner.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(inner))),
                Ok(Some(Err(e))) => Some((Err(not_found_as(&id, e.into())), None)),
                Ok(None) => None,
                Err(_) => Some((
                    Err(BlobStoreError::Timeout {
                        operation: "get",
                        after: timeout,
                    }),
                    None,
                )),
            }
        });
        Ok(chunks.boxed())
    }

    /// Delete blob data from storage.
    pub async fn delete(&self, id: &BlobId) -> Result<()> {
        let path = Self::object_path(id);
        // Ignore NotFound errors - the blob may already be deleted
        match self.bounded("delete", self.inner.delete(&path)).await {
            Ok(()) => Ok(()),
            Err(BlobStoreError::ObjectStore(object_store::Error::NotFound { .. })) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn not_found_as(id: &BlobId, err: BlobStoreError) -> BlobStoreError {
    match err {
        BlobStoreError::ObjectStore(object_store::Error::NotFound { .. }) => {
            BlobStoreError::NotFound(*id)
        }
        other => other,
    }
}

#[cfg(test)]
impl Storage {
    /// Create an in-memory storage backend (test-only).
    pub fn memory() -> Self {
        Self::from_store(
            Arc::new(InMemory::new()),
            StorageOptions::default().request_timeout,
        )
    }

    /// Check if blob data exists in storage.
    pub async fn has(&self, id: &BlobId) -> Result<bool> {
        let path = Self::object_path(id);
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
