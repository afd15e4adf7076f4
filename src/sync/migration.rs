//! One-way, deduplicated migration routines.
//!
//! Two flavors share the same dedup rule (`name::timestamp` against a
//! snapshot of the destination) and the same best-effort policy: individual
//! append failures are logged and counted, never propagated, and never stop
//! the rest of the pass. The engine owns the gating state around these
//! routines (migration watermark, pending-anonymous marker) — they are pure
//! store-to-store passes.

use std::collections::HashSet;

use tracing::warn;

use crate::cache::LocalCache;
use crate::remote::RemoteLog;
use crate::types::{dedup_key, now_ms, NutritionRecord};

use super::types::MigrationReport;

/// Dedup keys of a destination snapshot. Records without a timestamp cannot
/// be keyed and are left out — they can never match a migrating record.
pub(crate) fn dedup_set(records: &[NutritionRecord]) -> HashSet<String> {
    records
        .iter()
        .filter_map(|r| r.timestamp.map(|ts| dedup_key(&r.name, ts)))
        .collect()
}

/// Read the destination snapshot, degrading a failed read to empty — a
/// remote outage must not crash the session, it just weakens dedup for this
/// pass (appends stay retry-safe).
async fn snapshot_or_empty(remote: &dyn RemoteLog, uid: &str) -> Vec<NutritionRecord> {
    match remote.list_all(uid).await {
        Ok(records) => records,
        Err(e) => {
            warn!(uid, error = %e, "remote read failed; continuing with empty snapshot");
            Vec::new()
        }
    }
}

// ============================================================================
// Local → Remote
// ============================================================================

/// Migrate every local day bucket into `uid`'s remote log, deduplicated
/// against the current remote snapshot.
///
/// Processed buckets are removed even when some of their appends failed —
/// the partial-loss risk is surfaced through the report and a `warn!`, not
/// masked. The one exception is a bucket that cannot be parsed: it is
/// retained (and counted) so a future pass can retry it.
///
/// The caller gates this behind the session migration watermark; running it
/// twice is safe regardless because of the dedup check.
pub async fn migrate_local_to_remote(
    cache: &LocalCache,
    remote: &dyn RemoteLog,
    uid: &str,
) -> MigrationReport {
    let seen = dedup_set(&snapshot_or_empty(remote, uid).await);
    let mut report = MigrationReport::default();
    let mut removable: Vec<String> = Vec::new();

    for day_key in cache.list_day_keys() {
        let records = match cache.try_load_day(&day_key) {
            Ok(records) => records,
            Err(e) => {
                warn!(day_key = %day_key, error = %e, "unreadable day bucket retained for a future attempt");
                report.buckets_retained += 1;
                continue;
            }
        };

        for record in records {
            // Source buckets are assumed internally unique per day, so the
            // set is only checked against the initial remote snapshot, not
            // updated within the batch.
            let ts = record.timestamp.unwrap_or_else(now_ms);
            if seen.contains(&dedup_key(&record.name, ts)) {
                report.skipped += 1;
                continue;
            }
            let mut draft = record.draft();
            draft.timestamp = Some(ts);
            match remote.append(uid, draft).await {
                Ok(_) => report.appended += 1,
                Err(e) => {
                    warn!(uid, day_key = %day_key, name = %record.name, error = %e, "record failed to migrate");
                    report.failed += 1;
                }
            }
        }

        removable.push(day_key);
    }

    for day_key in &removable {
        cache.remove_day(day_key);
        report.buckets_removed += 1;
    }

    if report.failed > 0 {
        // Operator callout: these records were dropped with their buckets.
        warn!(
            uid,
            failed = report.failed,
            buckets_removed = report.buckets_removed,
            "local buckets removed although some records failed to migrate"
        );
    }

    report
}

// ============================================================================
// Anonymous → Permanent
// ============================================================================

/// Copy `anon_uid`'s remote records into `uid`'s log, skipping entries whose
/// dedup key is already present. Guarantees logged data survives the
/// anonymous → permanent promotion without duplication.
///
/// The caller clears the pending-anonymous marker after one pass regardless
/// of individual append outcomes.
pub async fn merge_anonymous_into(
    remote: &dyn RemoteLog,
    anon_uid: &str,
    uid: &str,
) -> MigrationReport {
    let mut report = MigrationReport::default();

    let source = snapshot_or_empty(remote, anon_uid).await;
    if source.is_empty() {
        return report;
    }

    let seen = dedup_set(&snapshot_or_empty(remote, uid).await);

    for record in source {
        let ts = record.timestamp.unwrap_or_else(now_ms);
        if seen.contains(&dedup_key(&record.name, ts)) {
            report.skipped += 1;
            continue;
        }
        let mut draft = record.draft();
        draft.timestamp = Some(ts);
        match remote.append(uid, draft).await {
            Ok(_) => report.appended += 1,
            Err(e) => {
                warn!(uid, anon_uid, name = %record.name, error = %e, "record failed to merge");
                report.failed += 1;
            }
        }
    }

    report
}
