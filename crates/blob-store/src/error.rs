//! Error types for the blob store.

use std::time::Duration;

use crate::blob_id::BlobId;

/// Errors that can occur when working with the blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Blob not found in object storage
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// An object storage call did not finish in time
    #[error("object storage {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before starting the store.")]
    BucketNotFound(String),

    /// The content model could not produce its templates
    #[error("content model error: {0}")]
    ContentModel(String),

    /// Every attempt of a cleanup sweep failed
    #[error("cleanup sweep failed after {attempts} attempts: {last_error}")]
    SweepExhausted {
        attempts: u32,
        last_error: Box<BlobStoreError>,
    },
}

impl BlobStoreError {
    /// The blob does not exist in object storage.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobStoreError::NotFound(_))
    }

    /// A remote failure worth retrying, as opposed to a missing blob or a
    /// configuration problem.
    pub fn is_transient(&self) -> bool {
        match self {
            BlobStoreError::ObjectStore(object_store::Error::NotFound { .. }) => false,
            BlobStoreError::ObjectStore(_) | BlobStoreError::Timeout { .. } => true,
            BlobStoreError::SweepExhausted { last_error, .. } => last_error.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, BlobStoreError>;
