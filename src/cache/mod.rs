//! Local Cache Store — per-day key-value persistence on the device.
//!
//! `CacheBackend` is the narrow raw string I/O trait implemented by concrete
//! backends (in-memory, SQLite). `LocalCache` layers the key scheme,
//! serialization, and degrade semantics on top: loads of malformed data
//! return empty with a logged warning, saves fail silently-but-logged.
//! Migration is the one caller that needs to tell "malformed" apart from
//! "empty" — it uses the strict [`LocalCache::try_load_day`].

use std::sync::Arc;

use tracing::warn;

use crate::error::CacheError;
use crate::types::{MacroGoals, NutritionRecord};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// Prefix of per-day bucket keys: `foodLog-<YYYY-MM-DD>`.
pub const DAY_KEY_PREFIX: &str = "foodLog-";
/// Marker recording an anonymous uid whose data has not yet been merged into
/// a permanent account.
pub const MARKER_PENDING_ANON_UID: &str = "pendingAnonUid";
/// Key holding the serialized macro goal object.
pub const MARKER_MACRO_GOALS: &str = "macroGoals";

// ============================================================================
// CacheBackend
// ============================================================================

/// Low-level cache backend — raw string key-value I/O, no log semantics.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    /// Every stored key, in no particular order.
    fn keys(&self) -> Result<Vec<String>, CacheError>;
}

// ============================================================================
// LocalCache
// ============================================================================

/// Serialization + key-scheme layer over a [`CacheBackend`].
pub struct LocalCache {
    backend: Arc<dyn CacheBackend>,
}

impl LocalCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    fn storage_key(day_key: &str) -> String {
        format!("{DAY_KEY_PREFIX}{day_key}")
    }

    // -----------------------------------------------------------------------
    // Day buckets
    // -----------------------------------------------------------------------

    /// Load one day bucket, degrading to empty on absence, backend error, or
    /// malformed data.
    pub fn load_day(&self, day_key: &str) -> Vec<NutritionRecord> {
        match self.try_load_day(day_key) {
            Ok(records) => records,
            Err(e) => {
                warn!(day_key, error = %e, "treating unreadable day bucket as empty");
                Vec::new()
            }
        }
    }

    /// Strict bucket load. Migration uses this so a malformed bucket is
    /// retained for a future attempt instead of being silently dropped.
    pub fn try_load_day(&self, day_key: &str) -> Result<Vec<NutritionRecord>, CacheError> {
        let key = Self::storage_key(day_key);
        match self.backend.get(&key)? {
            None => Ok(Vec::new()),
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|source| CacheError::Malformed { key, source })
            }
        }
    }

    /// Persist one day bucket. Failures are logged and swallowed — callers
    /// treat local saves as non-fatal.
    pub fn save_day(&self, day_key: &str, records: &[NutritionRecord]) {
        let key = Self::storage_key(day_key);
        let raw = match serde_json::to_string(records) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(day_key, error = %e, "failed to serialize day bucket");
                return;
            }
        };
        if let Err(e) = self.backend.set(&key, &raw) {
            warn!(day_key, error = %e, "failed to persist day bucket");
        }
    }

    /// Every persisted day key (`YYYY-MM-DD`, prefix stripped). Used only
    /// during migration; backend errors degrade to empty.
    pub fn list_day_keys(&self) -> Vec<String> {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to enumerate cache keys");
                return Vec::new();
            }
        };
        keys.into_iter()
            .filter_map(|k| k.strip_prefix(DAY_KEY_PREFIX).map(str::to_string))
            .collect()
    }

    pub fn remove_day(&self, day_key: &str) {
        if let Err(e) = self.backend.remove(&Self::storage_key(day_key)) {
            warn!(day_key, error = %e, "failed to remove day bucket");
        }
    }

    // -----------------------------------------------------------------------
    // Markers
    // -----------------------------------------------------------------------

    pub fn get_marker(&self, name: &str) -> Option<String> {
        match self.backend.get(name) {
            Ok(value) => value,
            Err(e) => {
                warn!(marker = name, error = %e, "failed to read marker");
                None
            }
        }
    }

    pub fn set_marker(&self, name: &str, value: &str) {
        if let Err(e) = self.backend.set(name, value) {
            warn!(marker = name, error = %e, "failed to write marker");
        }
    }

    pub fn remove_marker(&self, name: &str) {
        if let Err(e) = self.backend.remove(name) {
            warn!(marker = name, error = %e, "failed to remove marker");
        }
    }

    // -----------------------------------------------------------------------
    // Macro goals
    // -----------------------------------------------------------------------

    pub fn load_goals(&self) -> Option<MacroGoals> {
        let raw = self.get_marker(MARKER_MACRO_GOALS)?;
        match serde_json::from_str(&raw) {
            Ok(goals) => Some(goals),
            Err(e) => {
                warn!(error = %e, "treating malformed macro goals as unset");
                None
            }
        }
    }

    pub fn save_goals(&self, goals: &MacroGoals) {
        match serde_json::to_string(goals) {
            Ok(raw) => self.set_marker(MARKER_MACRO_GOALS, &raw),
            Err(e) => warn!(error = %e, "failed to serialize macro goals"),
        }
    }
}
