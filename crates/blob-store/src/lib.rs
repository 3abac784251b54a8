//! Object storage blob provider with a SQLite blob ledger
//!
//! This crate stores binary media blobs for a content management system.
//! Blob bytes live in object storage (S3/MinIO/local filesystem/memory); a
//! SQLite ledger records every write so existence checks and cleanup never
//! need to list the bucket.
//!
//! # Features
//!
//! - Read, write, exists and delete keyed by [`BlobId`]
//! - Writers of the same blob are serialized in-process
//! - Cleanup sweep that removes blobs no content field references anymore,
//!   transactional on the ledger side, retried with backoff, and protected
//!   by a grace window for freshly written blobs
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use cloudblob_store::{BlobId, BlobProvider, StaticContentModel};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), cloudblob_store::BlobStoreError> {
//! let provider = BlobProvider::new_local(Path::new("/tmp/blobs")).await?;
//!
//! let id = BlobId::new();
//! provider.write(&id, Bytes::from("hello")).await?;
//! assert!(provider.exists(&id).await?);
//!
//! let report = provider.cleanup(&StaticContentModel::default()).await?;
//! println!("swept {} orphans", report.orphans.len());
//! # Ok(())
//! # }
//! ```

mod blob_id;
mod content;
mod database;
mod error;
mod locks;
mod provider;
mod references;
mod storage;
mod sweep;

#[cfg(test)]
mod testkit;

pub use blob_id::{BlobId, REFERENCE_LEN};
pub use content::{ContentModel, FieldTable, StaticContentModel, Template, TemplateField};
pub use database::{Database, IndexEntry};
pub use error::{BlobStoreError, Result};
pub use locks::{BlobGuard, BlobLocks};
pub use provider::{BlobProvider, BlobStorage, BlobStream, CallContext, UploadStream};
pub use references::{ReferenceScanner, ScanReport};
pub use storage::{ObjectStoreConfig, StorageOptions};
pub use sweep::{spawn_scheduled_cleanup, RetryPolicy, SweepConfig, SweepReport};
