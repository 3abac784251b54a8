use blob_store::{BlobStoreError, SweepReport};
use clap::Args;

use crate::state::StateError;

/// Run one cleanup sweep with the configured templates.
#[derive(Args, Debug, Clone)]
pub struct Sweep;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

/// Human-readable sweep summary.
#[derive(Debug)]
pub struct SweepOutput(pub SweepReport);

impl std::fmt::Display for SweepOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let report = &self.0;
        writeln!(f, "referenced blobs:     {}", report.referenced)?;
        writeln!(f, "malformed references: {}", report.malformed_references)?;
        writeln!(f, "orphans removed:      {}", report.orphans.len())?;
        writeln!(f, "objects deleted:      {}", report.objects_deleted)?;
        write!(f, "attempts:             {}", report.attempts)?;
        for id in &report.orphans {
            write!(f, "\n  - {}", id)?;
        }
        if !report.objects_failed.is_empty() {
            write!(f, "\nobjects leaked:       {}", report.objects_failed.len())?;
            for id in &report.objects_failed {
                write!(f, "\n  ! {}", id)?;
            }
        }
        if !report.objects_skipped.is_empty() {
            write!(f, "\nobjects kept:         {}", report.objects_skipped.len())?;
            for id in &report.objects_skipped {
                write!(f, "\n  = {}", id)?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Sweep {
    type Error = SweepError;
    type Output = SweepOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let provider = state.provider().await?;
        let report = provider.cleanup(&state.content_model()).await?;
        Ok(SweepOutput(report))
    }
}
