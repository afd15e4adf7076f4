//! Synchronization Engine — orchestrates the local cache and the remote log
//! according to the current identity.

pub mod engine;
pub mod migration;
pub mod types;

pub use engine::SyncEngine;
pub use types::{MigrationReport, SyncEngineOptions, SyncPhase};
