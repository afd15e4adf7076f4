//! Remote Log Store Adapter — the per-user remote document collection.
//!
//! [`RemoteLog`] is the user-implemented transport trait (HTTP, Firestore-like
//! SDK, etc.); [`MemoryRemoteLog`] is the in-process reference implementation
//! used by tests and local runs. The adapter keeps no dedup logic — that is
//! the sync engine's job — but it does own timestamp normalization: `append`
//! fills a missing timestamp with the current time.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::RemoteError;
use crate::types::{NutritionRecord, RecordDraft};

pub mod memory;

pub use memory::MemoryRemoteLog;

/// Snapshot listener: receives the full current record set (descending by
/// timestamp) on every remote mutation. Whole-state payloads, not deltas, so
/// out-of-order delivery self-corrects on the next push.
pub type SnapshotCallback = dyn Fn(Vec<NutritionRecord>) + Send + Sync;

// ============================================================================
// Subscription
// ============================================================================

/// Cancellation handle for a live feed.
///
/// `unsubscribe` is idempotent — safe to call when already torn down — and
/// also runs on drop, so a replaced handle cannot leak its listener.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn unsubscribe(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ============================================================================
// RemoteLog
// ============================================================================

/// CRUD + subscribe operations against one user's remote log collection.
#[async_trait]
pub trait RemoteLog: Send + Sync {
    /// Full read of a user's log, ordered by `timestamp` descending.
    async fn list_all(&self, uid: &str) -> Result<Vec<NutritionRecord>, RemoteError>;

    /// Create one entry; the store assigns the id and fills a missing
    /// timestamp with the current time. Safe to retry — dedup happens above.
    async fn append(&self, uid: &str, draft: RecordDraft) -> Result<NutritionRecord, RemoteError>;

    /// Delete one entry; no-op if already absent.
    async fn remove(&self, uid: &str, id: &str) -> Result<(), RemoteError>;

    /// Establish a live feed. Implementations invoke `on_change` with the
    /// full current set on every mutation (and may fire immediately with the
    /// current snapshot); on transport error they deliver an empty snapshot
    /// and log rather than panic.
    fn subscribe(&self, uid: &str, on_change: Arc<SnapshotCallback>) -> Subscription;

    /// Idempotent upsert of the per-user profile document so per-item writes
    /// satisfy any ownership precondition. Best-effort.
    async fn ensure_owner_record(&self, uid: &str, profile: Value) -> Result<(), RemoteError>;
}
