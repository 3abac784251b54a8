use blob_store::{BlobId, BlobStoreError};
use clap::Args;

use crate::state::StateError;

/// Remove a blob from the ledger and from object storage.
#[derive(Args, Debug, Clone)]
pub struct Rm {
    /// Blob id
    pub id: BlobId,
}

#[derive(Debug, thiserror::Error)]
pub enum RmError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Rm {
    type Error = RmError;
    type Output = bool;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let provider = ctx.state()?.provider().await?;
        Ok(provider.delete(&self.id).await?)
    }
}
