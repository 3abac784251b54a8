use std::path::PathBuf;

use blob_store::{BlobId, BlobStoreError, UploadStream};
use bytes::Bytes;
use clap::Args;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::state::StateError;

/// Read size used when streaming a file into the store.
const CHUNK_SIZE: usize = 256 * 1024;

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// File to upload
    pub file: PathBuf,

    /// Store under this id instead of a fresh one (replaces existing content)
    #[arg(long)]
    pub id: Option<BlobId>,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] BlobStoreError),

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
}

async fn next_chunk(mut file: File) -> std::io::Result<Option<(Bytes, File)>> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let n = file.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some((Bytes::from(buf), file)))
}

/// Stream a file in fixed-size chunks.
fn file_chunks(file: File) -> UploadStream {
    futures::stream::try_unfold(file, next_chunk).boxed()
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Put {
    type Error = PutError;
    type Output = BlobId;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let provider = ctx.state()?.provider().await?;

        let file = File::open(&self.file).await.map_err(|source| PutError::Open {
            path: self.file.clone(),
            source,
        })?;

        let id = self.id.unwrap_or_default();
        let size = provider.write_stream(&id, file_chunks(file)).await?;
        tracing::info!(blob_id = %id, size = size, file = %self.file.display(), "uploaded file");

        Ok(id)
    }
}
