use std::sync::Arc;
use std::time::Duration;

use blob_store::{spawn_scheduled_cleanup, BlobStorage, BlobStoreError, CallContext};
use clap::Args;
use tokio::sync::watch;

use crate::state::StateError;

/// Sweep on a schedule until interrupted.
#[derive(Args, Debug, Clone)]
pub struct Watch {
    /// Seconds between sweeps (defaults to the configured interval)
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] BlobStoreError),

    #[error("failed to listen for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),

    #[error("sweep task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Watch {
    type Error = WatchError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let provider: Arc<dyn BlobStorage> = Arc::new(state.provider().await?);
        let interval_secs = self
            .interval_secs
            .unwrap_or(state.config.sweep.interval_secs)
            .max(1);
        let interval = Duration::from_secs(interval_secs);

        let context = CallContext::new(Arc::new(state.content_model()));
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = spawn_scheduled_cleanup(provider, context, interval, shutdown_rx);

        tracing::info!(interval_secs = interval_secs, "watching for orphaned blobs");
        tokio::signal::ctrl_c().await?;

        let _ = shutdown_tx.send(());
        handle.await?;

        Ok("stopped".to_string())
    }
}
