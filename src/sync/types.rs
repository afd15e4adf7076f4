//! Sync-specific types: engine phases, migration accounting, and options.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::LocalCache;
use crate::remote::RemoteLog;

/// Engine state per identity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No identity callback received yet.
    Uninitialized,
    /// Identity is null — the local day bucket is the data source.
    LocalOnly,
    /// Identity present; migration/subscribe in flight.
    Syncing,
    /// Identity present; remote subscription active.
    Live,
}

/// Outcome accounting for one migration pass. Best-effort semantics — the
/// report records partial failure, it never aborts the pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Records newly written to the destination.
    pub appended: usize,
    /// Records skipped because their dedup key was already present.
    pub skipped: usize,
    /// Records whose append failed (logged, not retried this pass).
    pub failed: usize,
    /// Local day buckets removed after processing.
    pub buckets_removed: usize,
    /// Buckets retained because they could not be parsed.
    pub buckets_retained: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Configuration for [`super::SyncEngine`].
pub struct SyncEngineOptions {
    pub cache: Arc<LocalCache>,
    pub remote: Arc<dyn RemoteLog>,
    /// Patch applied to the per-user profile document on sign-in
    /// (`None` = empty patch).
    pub owner_profile: Option<Value>,
}
