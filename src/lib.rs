//! mealsync — offline-first synchronization core for a meal-logging client.
//!
//! Users log food entries into per-day buckets on the device; once they sign
//! in (anonymously or with credentials) the log lives in a per-user remote
//! store observed through a live subscription. This crate owns the part with
//! real invariants: reconciling the two stores, migrating local data into the
//! remote log exactly once per session, deduplicating entries across stores,
//! and carrying data across the anonymous → permanent identity upgrade.
//!
//! Layering, leaf to root:
//!   - [`cache`] — per-day key-value persistence on the device.
//!   - [`remote`] — the per-user remote log adapter (trait + in-memory impl).
//!   - [`identity`] — auth-state transitions as an ordered channel.
//!   - [`sync`] — the [`sync::SyncEngine`] composing the three.
//!
//! Nothing in this crate surfaces a user-blocking error: remote failures and
//! malformed local data degrade to best-known state and are reported through
//! `tracing`.

pub mod error;
pub mod types;

pub mod cache;
pub mod identity;
pub mod remote;
pub mod sync;

pub use error::{CacheError, MealSyncError, RemoteError, Result};
pub use identity::IdentityTracker;
pub use sync::{MigrationReport, SyncEngine, SyncEngineOptions, SyncPhase};
pub use types::{Identity, MacroGoals, MacroTotals, NutritionRecord, RecordDraft};
