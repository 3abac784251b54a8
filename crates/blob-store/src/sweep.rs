//! Cleanup sweep: removes blobs that no content references anymore.
//!
//! The ledger side runs in a single transaction: references are captured on
//! the same connection that decides and deletes orphans, so a reference
//! committed before the sweep begins is always seen. Object deletion follows
//! the commit and is best effort; a failure there leaks storage but never
//! loses referenced data.
//!
//! Each object is deleted under the blob's write lock, and only if the
//! ledger still has no row for it. A rewrite that lands after the commit
//! keeps its bytes.
//!
//! Blobs whose newest ledger row is younger than the grace window are never
//! considered orphans. This covers the gap between a write and the moment
//! the content layer persists its reference to the new blob.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::blob_id::BlobId;
use crate::content::ContentModel;
use crate::database::Database;
use crate::error::{BlobStoreError, Result};
use crate::locks::BlobLocks;
use crate::provider::{BlobStorage, CallContext};
use crate::references::ReferenceScanner;
use crate::storage::Storage;

/// How often a failed sweep is retried, and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Run once, never retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after `attempt` (1-based) failed: `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Blobs written more recently than this are never orphans
    pub grace_window: Duration,
    pub retry: RetryPolicy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(60 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a successful sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Distinct blobs referenced by content
    pub referenced: usize,
    /// Blob field values that could not be parsed
    pub malformed_references: usize,
    /// Blobs removed from the ledger, sorted
    pub orphans: Vec<BlobId>,
    /// Ledger rows removed
    pub rows_deleted: u64,
    /// Orphans whose object was deleted (or already absent)
    pub objects_deleted: usize,
    /// Orphans whose object could not be deleted and is now leaked
    pub objects_failed: Vec<BlobId>,
    /// Orphans rewritten after the ledger commit; their object was kept
    pub objects_skipped: Vec<BlobId>,
    /// Attempts it took, including the successful one
    pub attempts: u32,
}

/// One cleanup sweep over a ledger and its object store.
pub(crate) struct Sweep<'a> {
    db: &'a Database,
    storage: &'a Storage,
    locks: &'a BlobLocks,
    content: &'a dyn ContentModel,
    grace_window: Duration,
}

impl<'a> Sweep<'a> {
    pub fn new(
        db: &'a Database,
        storage: &'a Storage,
        locks: &'a BlobLocks,
        content: &'a dyn ContentModel,
        grace_window: Duration,
    ) -> Self {
        Self {
            db,
            storage,
            locks,
            content,
            grace_window,
        }
    }

    fn cutoff(&self) -> Result<DateTime<Utc>> {
        let window = chrono::Duration::from_std(self.grace_window)
            .map_err(|e| BlobStoreError::InvalidConfig(format!("grace window: {}", e)))?;
        Ok(Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    /// Run a single attempt.
    pub async fn run(&self) -> Result<SweepReport> {
        let cutoff = self.cutoff()?;

        let mut tx = self.db.begin().await?;
        Database::create_in_use_table(&mut tx).await?;

        let scan = ReferenceScanner::new(self.content).scan_on(&mut tx).await?;
        for id in &scan.references {
            Database::mark_in_use(&mut tx, id).await?;
        }

        let mut orphans = Database::unused_blobs(&mut tx, cutoff).await?;
        orphans.sort();
        let rows_deleted = Database::delete_unused_blobs(&mut tx, cutoff).await?;

        Database::drop_in_use_table(&mut tx).await?;
        tx.commit().await?;

        debug!(
            orphans = orphans.len(),
            rows_deleted = rows_deleted,
            "ledger sweep committed"
        );

        let mut objects_deleted = 0;
        let mut objects_failed = Vec::new();
        let mut objects_skipped = Vec::new();
        for id in &orphans {
            let _guard = self.locks.acquire(id).await;

            match self.db.has_blob(id).await {
                Ok(true) => {
                    debug!(blob_id = %id, "orphan rewritten since the ledger commit, keeping object");
                    objects_skipped.push(*id);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(blob_id = %id, error = %e, "could not recheck orphan, keeping object");
                    objects_failed.push(*id);
                    continue;
                }
            }

            match self.storage.delete(id).await {
                Ok(()) => objects_deleted += 1,
                Err(e) => {
                    warn!(blob_id = %id, error = %e, "failed to delete orphaned blob object, storage leaked");
                    objects_failed.push(*id);
                }
            }
        }

        Ok(SweepReport {
            referenced: scan.references.len(),
            malformed_references: scan.malformed,
            orphans,
            rows_deleted,
            objects_deleted,
            objects_failed,
            objects_skipped,
            attempts: 1,
        })
    }

    /// Run attempts until one succeeds or the policy is exhausted.
    ///
    /// Each attempt starts from scratch; nothing carries over between them.
    pub async fn run_with_retry(&self, policy: &RetryPolicy) -> Result<SweepReport> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.run().await {
                Ok(mut report) => {
                    report.attempts = attempt;
                    return Ok(report);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "cleanup sweep failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(BlobStoreError::SweepExhausted {
                        attempts: attempt,
                        last_error: Box::new(e),
                    });
                }
            }
        }
    }
}

/// Run `cleanup_blobs` every `interval` until `shutdown` fires or its sender
/// is dropped. The first sweep starts immediately; failed sweeps are logged
/// and the schedule continues.
pub fn spawn_scheduled_cleanup(
    storage: Arc<dyn BlobStorage>,
    context: CallContext,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match storage.cleanup_blobs(&context).await {
                        Ok(report) => info!(
                            orphans = report.orphans.len(),
                            objects_failed = report.objects_failed.len(),
                            attempts = report.attempts,
                            "scheduled cleanup finished"
                        ),
                        Err(e) => error!(error = %e, "scheduled cleanup failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduled cleanup stopping");
                    break;
                }
            }
        }
    })
}
