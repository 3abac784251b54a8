//! Per-blob write locks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::blob_id::BlobId;

/// Exclusive hold on one blob id. Released on drop.
pub type BlobGuard = OwnedMutexGuard<()>;

/// Serializes writers of the same blob within this process.
///
/// Locks are created on first use and kept for the lifetime of the set.
/// Writers of different blobs never contend beyond the brief map lookup.
#[derive(Debug, Clone, Default)]
pub struct BlobLocks {
    locks: Arc<Mutex<HashMap<BlobId, Arc<AsyncMutex<()>>>>>,
}

impl BlobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: &BlobId) -> BlobGuard {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(*id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of blob ids that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
