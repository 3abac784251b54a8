use std::path::PathBuf;

use blob_store::{BlobStoreError, Database, ObjectStoreConfig};
use clap::Args;

use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// S3 bucket to store blobs in (must already exist)
    #[arg(long, conflicts_with = "local")]
    pub bucket: Option<String>,

    /// S3 region (defaults to the AWS environment)
    #[arg(long, requires = "bucket")]
    pub region: Option<String>,

    /// S3-compatible endpoint, e.g. http://localhost:9000 for MinIO
    #[arg(long, requires = "bucket")]
    pub endpoint: Option<String>,

    /// Allow plain HTTP endpoints
    #[arg(long, requires = "bucket")]
    pub allow_http: bool,

    /// Store blobs in a local directory (defaults to <config dir>/objects)
    #[arg(long)]
    pub local: Option<PathBuf>,

    /// Seconds a fresh blob is protected from sweeps
    #[arg(long)]
    pub grace_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),

    #[error("failed to create blob ledger: {0}")]
    Ledger(#[from] BlobStoreError),
}

impl Init {
    fn object_store(&self, app_dir: &std::path::Path) -> ObjectStoreConfig {
        if let Some(bucket) = &self.bucket {
            return ObjectStoreConfig::S3 {
                bucket: bucket.clone(),
                region: self.region.clone(),
                endpoint: self.endpoint.clone(),
                allow_http: self.allow_http,
            };
        }
        match &self.local {
            Some(path) => ObjectStoreConfig::Local { path: path.clone() },
            None => AppState::default_object_store(app_dir),
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let app_dir = AppState::app_dir(ctx.config_path.clone())?;

        let mut config = AppConfig {
            object_store: self.object_store(&app_dir),
            ..AppConfig::default()
        };
        if let Some(grace_secs) = self.grace_secs {
            config.sweep.grace_secs = grace_secs;
        }

        let state = AppState::init(Some(app_dir), config)?;

        // Creates the file and runs migrations
        Database::new(&state.db_path).await?;

        let store = match &state.config.object_store {
            ObjectStoreConfig::Memory => "memory".to_string(),
            ObjectStoreConfig::Local { path } => format!("local ({})", path.display()),
            ObjectStoreConfig::S3 { bucket, .. } => format!("s3 (bucket {})", bucket),
        };

        let output = format!(
            "Initialized cloudblob directory at: {}\n\
             - Ledger: {}\n\
             - Config: {}\n\
             - Object store: {}\n\
             - Grace window: {}s",
            state.app_dir.display(),
            state.db_path.display(),
            state.config_path.display(),
            store,
            state.config.sweep.grace_secs
        );

        Ok(output)
    }
}
