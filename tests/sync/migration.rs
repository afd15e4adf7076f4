//! Migration routine tests — dedup correctness, idempotence, partial failure,
//! malformed-bucket retention, anonymous merge.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use mealsync::cache::{CacheBackend, LocalCache, MemoryBackend, DAY_KEY_PREFIX};
use mealsync::error::RemoteError;
use mealsync::remote::{MemoryRemoteLog, RemoteLog, SnapshotCallback, Subscription};
use mealsync::sync::migration::{merge_anonymous_into, migrate_local_to_remote};
use mealsync::types::{NutritionRecord, RecordDraft};

/// Route `tracing` output through the test writer so migration warnings
/// (retained buckets, failed appends) show up in captured test output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn record(name: &str, ts: Option<i64>) -> NutritionRecord {
    NutritionRecord {
        id: format!("local-{name}"),
        name: name.to_string(),
        calories: 100.0,
        protein: 10.0,
        carbs: 20.0,
        fat: 5.0,
        portion: String::new(),
        timestamp: ts,
    }
}

fn draft(name: &str, ts: Option<i64>) -> RecordDraft {
    record(name, ts).draft()
}

async fn seed_remote(remote: &MemoryRemoteLog, uid: &str, entries: &[(&str, i64)]) {
    for (name, ts) in entries {
        remote.append(uid, draft(name, Some(*ts))).await.unwrap();
    }
}

/// Delegating remote that fails appends for a chosen set of record names.
struct FlakyRemote {
    inner: MemoryRemoteLog,
    fail_names: HashSet<String>,
}

impl FlakyRemote {
    fn failing(names: &[&str]) -> Self {
        Self {
            inner: MemoryRemoteLog::new(),
            fail_names: names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl RemoteLog for FlakyRemote {
    async fn list_all(&self, uid: &str) -> Result<Vec<NutritionRecord>, RemoteError> {
        self.inner.list_all(uid).await
    }

    async fn append(&self, uid: &str, draft: RecordDraft) -> Result<NutritionRecord, RemoteError> {
        if self.fail_names.contains(&draft.name) {
            return Err(RemoteError::Transport("injected append failure".to_string()));
        }
        self.inner.append(uid, draft).await
    }

    async fn remove(&self, uid: &str, id: &str) -> Result<(), RemoteError> {
        self.inner.remove(uid, id).await
    }

    fn subscribe(&self, uid: &str, on_change: Arc<SnapshotCallback>) -> Subscription {
        self.inner.subscribe(uid, on_change)
    }

    async fn ensure_owner_record(&self, uid: &str, profile: Value) -> Result<(), RemoteError> {
        self.inner.ensure_owner_record(uid, profile).await
    }
}

// ============================================================================
// Local → Remote
// ============================================================================

#[tokio::test]
async fn migrate_moves_buckets_and_dedups_against_remote() {
    let cache = LocalCache::new(Arc::new(MemoryBackend::new()));
    let remote = MemoryRemoteLog::new();
    seed_remote(&remote, "u1", &[("Apple", 1000)]).await;

    cache.save_day(
        "2024-01-01",
        &[record("Apple", Some(1000)), record("Toast", Some(2000))],
    );
    cache.save_day("2024-01-02", &[record("Eggs", Some(3000))]);

    let report = migrate_local_to_remote(&cache, &remote, "u1").await;
    assert_eq!(report.appended, 2);
    assert_eq!(report.skipped, 1, "Apple::1000 already remote");
    assert_eq!(report.failed, 0);
    assert_eq!(report.buckets_removed, 2);
    assert_eq!(report.buckets_retained, 0);

    assert_eq!(remote.list_all("u1").await.unwrap().len(), 3);
    assert!(cache.list_day_keys().is_empty());
}

#[tokio::test]
async fn migrate_twice_yields_no_duplicates() {
    let cache = LocalCache::new(Arc::new(MemoryBackend::new()));
    let remote = MemoryRemoteLog::new();
    let bucket = vec![record("Apple", Some(1000)), record("Toast", Some(2000))];
    cache.save_day("2024-01-01", &bucket);

    let first = migrate_local_to_remote(&cache, &remote, "u1").await;
    assert_eq!(first.appended, 2);

    // Buckets were removed, so a second pass is a no-op.
    let second = migrate_local_to_remote(&cache, &remote, "u1").await;
    assert!(second.is_noop());

    // Even with the same bucket restored, the dedup keys are now present
    // remotely and nothing is appended twice.
    cache.save_day("2024-01-01", &bucket);
    let third = migrate_local_to_remote(&cache, &remote, "u1").await;
    assert_eq!(third.appended, 0);
    assert_eq!(third.skipped, 2);
    assert_eq!(remote.list_all("u1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_bucket_is_retained_for_retry() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    backend
        .set(&format!("{DAY_KEY_PREFIX}2024-01-01"), "{not json")
        .unwrap();
    let cache = LocalCache::new(Arc::clone(&backend) as Arc<dyn CacheBackend>);
    cache.save_day("2024-01-02", &[record("Toast", Some(2000))]);

    let remote = MemoryRemoteLog::new();
    let report = migrate_local_to_remote(&cache, &remote, "u1").await;
    assert_eq!(report.appended, 1);
    assert_eq!(report.buckets_removed, 1);
    assert_eq!(report.buckets_retained, 1);

    // The malformed bucket is still there for a future attempt.
    assert_eq!(cache.list_day_keys(), vec!["2024-01-01"]);
    assert!(backend
        .get(&format!("{DAY_KEY_PREFIX}2024-01-01"))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn records_without_timestamp_are_stamped_during_migration() {
    let cache = LocalCache::new(Arc::new(MemoryBackend::new()));
    cache.save_day("2024-01-01", &[record("Apple", None)]);

    let remote = MemoryRemoteLog::new();
    let report = migrate_local_to_remote(&cache, &remote, "u1").await;
    assert_eq!(report.appended, 1);

    let migrated = remote.list_all("u1").await.unwrap();
    assert!(migrated[0].timestamp.is_some());
}

#[tokio::test]
async fn partial_failure_still_removes_the_bucket() {
    init_tracing();
    let cache = LocalCache::new(Arc::new(MemoryBackend::new()));
    cache.save_day(
        "2024-01-01",
        &[record("Good", Some(1000)), record("Bad", Some(2000))],
    );

    let remote = FlakyRemote::failing(&["Bad"]);
    let report = migrate_local_to_remote(&cache, &remote, "u1").await;
    assert_eq!(report.appended, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.buckets_removed, 1, "bucket removed despite the failure");

    assert!(cache.list_day_keys().is_empty());
    assert_eq!(remote.list_all("u1").await.unwrap().len(), 1);
}

// ============================================================================
// Anonymous → Permanent
// ============================================================================

#[tokio::test]
async fn merge_skips_records_already_present() {
    let remote = MemoryRemoteLog::new();
    seed_remote(&remote, "A", &[("Apple", 1000)]).await;
    seed_remote(&remote, "B", &[("Apple", 1000)]).await;

    let report = merge_anonymous_into(&remote, "A", "B").await;
    assert_eq!(report.appended, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(remote.list_all("B").await.unwrap().len(), 1, "count unchanged");
}

#[tokio::test]
async fn merge_copies_missing_records() {
    let remote = MemoryRemoteLog::new();
    seed_remote(&remote, "A", &[("Apple", 1000), ("Banana", 2000)]).await;
    seed_remote(&remote, "B", &[("Apple", 1000)]).await;

    let report = merge_anonymous_into(&remote, "A", "B").await;
    assert_eq!(report.appended, 1);
    assert_eq!(report.skipped, 1);

    let names: Vec<String> = remote
        .list_all("B")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert!(names.contains(&"Banana".to_string()));
    assert_eq!(names.len(), 2);
}

#[tokio::test]
async fn merge_with_empty_source_is_a_noop() {
    let remote = MemoryRemoteLog::new();
    seed_remote(&remote, "B", &[("Apple", 1000)]).await;

    let report = merge_anonymous_into(&remote, "A", "B").await;
    assert!(report.is_noop());
    assert_eq!(remote.list_all("B").await.unwrap().len(), 1);
}

#[tokio::test]
async fn merge_counts_append_failures_without_stopping() {
    init_tracing();
    let remote = FlakyRemote::failing(&["Bad"]);
    seed_remote(&remote.inner, "A", &[("Bad", 1000), ("Good", 2000)]).await;

    let report = merge_anonymous_into(&remote, "A", "B").await;
    assert_eq!(report.appended, 1);
    assert_eq!(report.failed, 1);
}
