use blob_store::{BlobId, BlobStoreError};
use clap::Args;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Exists {
    /// Blob id
    pub id: BlobId,
}

#[derive(Debug, thiserror::Error)]
pub enum ExistsError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Exists {
    type Error = ExistsError;
    type Output = bool;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let provider = ctx.state()?.provider().await?;
        Ok(provider.exists(&self.id).await?)
    }
}
