use std::path::PathBuf;

use blob_store::{BlobId, BlobStoreError};
use clap::Args;
use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Blob id
    pub id: BlobId,

    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] BlobStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

async fn copy_blob<W>(
    provider: &blob_store::BlobProvider,
    id: &BlobId,
    out: &mut W,
) -> Result<u64, CatError>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut stream = provider.read_stream(id).await?;
    let mut written = 0u64;
    while let Some(chunk) = stream.try_next().await? {
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cat {
    type Error = CatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let provider = ctx.state()?.provider().await?;

        match &self.output {
            Some(path) => {
                let mut file = tokio::fs::File::create(path).await?;
                let written = copy_blob(&provider, &self.id, &mut file).await?;
                Ok(format!("wrote {} bytes to {}", written, path.display()))
            }
            None => {
                let mut stdout = tokio::io::stdout();
                copy_blob(&provider, &self.id, &mut stdout).await?;
                Ok(String::new())
            }
        }
    }
}
