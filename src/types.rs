//! Core data types: logged records, identity, macro goals, and the day-key /
//! dedup-key helpers shared by the cache, remote, and sync layers.
//!
//! Field defaulting happens here, once, at the serde boundary: a document
//! missing `timestamp` (or `id`, for remote documents keyed externally)
//! deserializes cleanly instead of every call site probing loose fields.

use chrono::{Local, LocalResult, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

// ============================================================================
// NutritionRecord / RecordDraft
// ============================================================================

/// One logged food item.
///
/// `timestamp` is integer milliseconds since epoch. It decides which logical
/// day the entry belongs to and provides ordering; legacy/local-only records
/// may lack it entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecord {
    /// Unique within one owner's log. Assigned by the remote store on
    /// creation, or synthesized locally while offline.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    /// Free-text portion descriptor, may be empty.
    #[serde(default)]
    pub portion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl NutritionRecord {
    /// Attach an id to a draft, producing a full record.
    pub fn from_draft(id: impl Into<String>, draft: RecordDraft) -> Self {
        Self {
            id: id.into(),
            name: draft.name,
            calories: draft.calories,
            protein: draft.protein,
            carbs: draft.carbs,
            fat: draft.fat,
            portion: draft.portion,
            timestamp: draft.timestamp,
        }
    }

    /// The id-less payload of this record, for `append` calls.
    pub fn draft(&self) -> RecordDraft {
        RecordDraft {
            name: self.name.clone(),
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            portion: self.portion.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Dedup key using `fallback_ts` when the record has no timestamp.
    pub fn dedup_key_or(&self, fallback_ts: i64) -> String {
        dedup_key(&self.name, self.timestamp.unwrap_or(fallback_ts))
    }
}

/// A record without an id — what `append` sends; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(default)]
    pub portion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// The `(name, timestamp)` dedup key: two records sharing it are treated as
/// the same logged event across stores.
pub fn dedup_key(name: &str, timestamp_ms: i64) -> String {
    format!("{name}::{timestamp_ms}")
}

// ============================================================================
// Identity
// ============================================================================

/// The currently active auth identity. Exactly one is active at a time;
/// every auth event re-evaluates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: Option<String>,
    pub is_anonymous: bool,
}

impl Identity {
    /// No user — local-only operation.
    pub fn signed_out() -> Self {
        Self {
            uid: None,
            is_anonymous: false,
        }
    }

    /// A temporary device-local account, eligible for later upgrade.
    pub fn anonymous(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            is_anonymous: true,
        }
    }

    /// A credentialed account.
    pub fn permanent(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            is_anonymous: false,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.uid.is_some()
    }
}

// ============================================================================
// Macro goals / totals
// ============================================================================

/// Daily macro targets, persisted under the `macroGoals` cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroGoals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

/// Summed nutrients over a set of records, compared against [`MacroGoals`]
/// by the tracking widget.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MacroTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

/// Fold a record list into totals.
pub fn macro_totals(records: &[NutritionRecord]) -> MacroTotals {
    let mut totals = MacroTotals::default();
    for r in records {
        totals.calories += r.calories;
        totals.protein += r.protein;
        totals.carbs += r.carbs;
        totals.fat += r.fat;
    }
    totals
}

// ============================================================================
// Time / day-key helpers
// ============================================================================

/// Current wall-clock time in milliseconds since epoch.
pub fn now_ms() -> i64 {
    Local::now().timestamp_millis()
}

/// The `YYYY-MM-DD` calendar-day key (local timezone) for a millisecond
/// timestamp.
pub fn day_key_for_ms(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
            dt.format("%Y-%m-%d").to_string()
        }
        // Out-of-range timestamp — bucket it with the epoch rather than panic.
        LocalResult::None => "1970-01-01".to_string(),
    }
}

/// Whether `timestamp_ms` falls on the calendar day named by `day_key`.
pub fn is_same_day(timestamp_ms: i64, day_key: &str) -> bool {
    day_key_for_ms(timestamp_ms) == day_key
}

/// A timestamp on the given day, carrying the current wall-clock time of
/// day — what a newly added record defaults to while the user is viewing a
/// past (or future) day. Falls back to now on an unparseable key.
pub fn timestamp_for_day(day_key: &str) -> i64 {
    let Ok(date) = NaiveDate::parse_from_str(day_key, "%Y-%m-%d") else {
        return now_ms();
    };
    match Local.from_local_datetime(&date.and_time(Local::now().time())) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.timestamp_millis(),
        LocalResult::None => now_ms(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
