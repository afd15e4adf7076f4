//! SyncEngine — the identity-driven orchestrator over the local cache and
//! the remote log.
//!
//! One engine exists per process. It owns the phase machine, the session
//! migration watermark, the active remote subscription, and the in-memory
//! working list the UI renders from. Public methods never return `Err`:
//! every failure degrades to best-known state and is reported through
//! `tracing`.
//!
//! Concurrency model: identity transitions are handled one at a time (the
//! [`SyncEngine::run`] loop consumes the tracker channel sequentially, and a
//! transition mutex covers direct `handle_identity` calls). Async work
//! started for one transition may outlive it — a stale migration is allowed
//! to finish against its original uid — but the per-transition generation
//! token keeps stale work from touching shared state: neither the watermark
//! nor the subscription nor the working list accepts writes from a
//! superseded generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

use crate::cache::{LocalCache, MARKER_PENDING_ANON_UID};
use crate::remote::{RemoteLog, SnapshotCallback, Subscription};
use crate::types::{
    day_key_for_ms, is_same_day, now_ms, timestamp_for_day, Identity, NutritionRecord, RecordDraft,
};

use super::migration;
use super::types::{SyncEngineOptions, SyncPhase};

// ============================================================================
// SyncEngine
// ============================================================================

struct EngineState {
    phase: SyncPhase,
    identity: Identity,
    /// Session migration watermark — local→remote migration has already run
    /// for this uid during this runtime session. Never persisted.
    last_migrated_uid: Option<String>,
    subscription: Option<Subscription>,
    /// Bumped on every identity transition; stale async work compares its
    /// captured value before mutating state.
    generation: u64,
    /// The record set the UI renders from. While `Live` this is the full
    /// subscribed remote set; while `LocalOnly` it is the active day bucket.
    working: Vec<NutritionRecord>,
    /// `YYYY-MM-DD` key of the day currently on screen.
    active_day: String,
}

pub struct SyncEngine {
    cache: Arc<LocalCache>,
    remote: Arc<dyn RemoteLog>,
    owner_profile: Value,
    state: Arc<Mutex<EngineState>>,
    /// Serializes handle_identity when called outside the run loop.
    transition_lock: TokioMutex<()>,
    next_local_id: AtomicU64,
}

impl SyncEngine {
    pub fn new(options: SyncEngineOptions) -> Self {
        Self {
            cache: options.cache,
            remote: options.remote,
            owner_profile: options.owner_profile.unwrap_or_else(|| Value::Object(Default::default())),
            state: Arc::new(Mutex::new(EngineState {
                phase: SyncPhase::Uninitialized,
                identity: Identity::signed_out(),
                last_migrated_uid: None,
                subscription: None,
                generation: 0,
                working: Vec::new(),
                active_day: day_key_for_ms(now_ms()),
            })),
            transition_lock: TokioMutex::new(()),
            next_local_id: AtomicU64::new(1),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> SyncPhase {
        self.state.lock().phase
    }

    pub fn identity(&self) -> Identity {
        self.state.lock().identity.clone()
    }

    pub fn active_day(&self) -> String {
        self.state.lock().active_day.clone()
    }

    /// Snapshot of the full working list.
    pub fn records(&self) -> Vec<NutritionRecord> {
        self.state.lock().working.clone()
    }

    /// The on-screen list for the active day. While authenticated this is
    /// the subscribed remote set filtered by calendar day — records lacking
    /// a timestamp pass every day's filter (legacy pass-through). While
    /// unauthenticated the working list already is the day bucket.
    pub fn day_records(&self) -> Vec<NutritionRecord> {
        let state = self.state.lock();
        if state.identity.is_signed_in() {
            state
                .working
                .iter()
                .filter(|r| r.timestamp.map_or(true, |ts| is_same_day(ts, &state.active_day)))
                .cloned()
                .collect()
        } else {
            state.working.clone()
        }
    }

    /// Switch the viewed day. Unauthenticated, the working list reloads from
    /// that day's bucket; authenticated, the view is derived by filtering.
    pub fn set_active_day(&self, day_key: &str) {
        let mut state = self.state.lock();
        if state.active_day == day_key {
            return;
        }
        state.active_day = day_key.to_string();
        if !state.identity.is_signed_in() {
            state.working = self.cache.load_day(day_key);
        }
    }

    // -----------------------------------------------------------------------
    // Identity transitions
    // -----------------------------------------------------------------------

    /// Drive the engine from an identity feed until the tracker is dropped.
    pub async fn run(&self, mut transitions: mpsc::UnboundedReceiver<Identity>) {
        while let Some(identity) = transitions.recv().await {
            self.handle_identity(identity).await;
        }
    }

    /// React to one identity transition: tear down, migrate, resubscribe.
    pub async fn handle_identity(&self, identity: Identity) {
        let _guard = self.transition_lock.lock().await;

        // Teardown first so two snapshot streams never feed the working list.
        let (generation, was_uninitialized) = {
            let mut state = self.state.lock();
            state.generation += 1;
            if let Some(subscription) = state.subscription.take() {
                subscription.unsubscribe();
            }
            let was_uninitialized = state.phase == SyncPhase::Uninitialized;
            state.identity = identity.clone();
            (state.generation, was_uninitialized)
        };

        match identity.uid {
            None => {
                debug!("identity cleared; falling back to local day bucket");
                let mut state = self.state.lock();
                state.phase = SyncPhase::LocalOnly;
                // First callback loads today's bucket; a sign-out clears the
                // list and the UI reloads the bucket on next day change.
                let bucket = if was_uninitialized {
                    let day = state.active_day.clone();
                    self.cache.load_day(&day)
                } else {
                    Vec::new()
                };
                state.working = bucket;
            }
            Some(uid) => {
                debug!(uid = %uid, anonymous = identity.is_anonymous, "identity active; syncing");
                self.state.lock().phase = SyncPhase::Syncing;
                self.sync_in(&uid, identity.is_anonymous, generation).await;
            }
        }
    }

    /// The `SYNCING` sequence for an active uid.
    async fn sync_in(&self, uid: &str, is_anonymous: bool, generation: u64) {
        // 1. One-shot local→remote migration per (session, uid).
        let needs_migration = {
            let state = self.state.lock();
            state.last_migrated_uid.as_deref() != Some(uid)
        };
        if needs_migration {
            let report = migration::migrate_local_to_remote(&self.cache, self.remote.as_ref(), uid).await;
            if !report.is_noop() {
                info!(
                    uid,
                    appended = report.appended,
                    skipped = report.skipped,
                    failed = report.failed,
                    buckets_removed = report.buckets_removed,
                    buckets_retained = report.buckets_retained,
                    "local to remote migration finished"
                );
            }
            let mut state = self.state.lock();
            if state.generation == generation {
                state.last_migrated_uid = Some(uid.to_string());
            }
        }

        // 2. Merge a pending anonymous identity into this one.
        if let Some(anon_uid) = self.cache.get_marker(MARKER_PENDING_ANON_UID) {
            if anon_uid != uid {
                let report = migration::merge_anonymous_into(self.remote.as_ref(), &anon_uid, uid).await;
                info!(
                    uid,
                    anon_uid = %anon_uid,
                    appended = report.appended,
                    skipped = report.skipped,
                    failed = report.failed,
                    "anonymous log merged"
                );
                // Cleared regardless of append outcomes — one pass only.
                self.cache.remove_marker(MARKER_PENDING_ANON_UID);
            }
        }

        // 3. An anonymous session leaves its uid behind so a later permanent
        // sign-in can pick the data up.
        if is_anonymous {
            self.cache.set_marker(MARKER_PENDING_ANON_UID, uid);
        }

        // 4. Best-effort profile upsert; per-item writes proceed either way.
        if let Err(e) = self
            .remote
            .ensure_owner_record(uid, self.owner_profile.clone())
            .await
        {
            warn!(uid, error = %e, "owner record upsert failed");
        }

        // 5. Go live. The callback checks the generation so a superseded
        // stream can never write into the working list.
        let callback: Arc<SnapshotCallback> = {
            let state = Arc::clone(&self.state);
            Arc::new(move |records: Vec<NutritionRecord>| {
                let mut state = state.lock();
                if state.generation == generation {
                    state.working = records;
                }
            })
        };
        let subscription = self.remote.subscribe(uid, callback);

        let mut state = self.state.lock();
        if state.generation == generation {
            state.subscription = Some(subscription);
            state.phase = SyncPhase::Live;
        } else {
            drop(state);
            subscription.unsubscribe();
        }
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    /// Append records optimistically: they are visible in the working list
    /// before any durable write completes. With an active identity each
    /// record is then appended remotely (failures logged, optimistic copy
    /// retained — local-first beats strict durability here); without one,
    /// the day-scoped save persists them.
    pub async fn add_records(&self, drafts: Vec<RecordDraft>) {
        let (uid, staged) = {
            let mut state = self.state.lock();
            let default_ts = timestamp_for_day(&state.active_day);
            let staged: Vec<NutritionRecord> = drafts
                .into_iter()
                .map(|mut draft| {
                    if draft.timestamp.is_none() {
                        draft.timestamp = Some(default_ts);
                    }
                    let id = format!(
                        "local-{}",
                        self.next_local_id.fetch_add(1, Ordering::Relaxed)
                    );
                    NutritionRecord::from_draft(id, draft)
                })
                .collect();
            state.working.extend(staged.iter().cloned());
            let uid = state.identity.uid.clone();
            if uid.is_none() {
                self.persist_active_day(&state);
            }
            (uid, staged)
        };

        if let Some(uid) = uid {
            for record in staged {
                if let Err(e) = self.remote.append(&uid, record.draft()).await {
                    warn!(uid = %uid, name = %record.name, error = %e, "remote append failed; keeping optimistic copy");
                }
            }
        }
    }

    /// Remove a record optimistically. Remote failure is logged only — the
    /// stores may diverge until the next subscription push reconciles them.
    pub async fn remove_record(&self, id: &str) {
        let uid = {
            let mut state = self.state.lock();
            state.working.retain(|r| r.id != id);
            let uid = state.identity.uid.clone();
            if uid.is_none() {
                self.persist_active_day(&state);
            }
            uid
        };

        if let Some(uid) = uid {
            if let Err(e) = self.remote.remove(&uid, id).await {
                warn!(uid = %uid, id, error = %e, "remote remove failed");
            }
        }
    }

    /// Offline mirror: while unauthenticated, every working-list change
    /// writes the active day bucket back to the cache.
    fn persist_active_day(&self, state: &EngineState) {
        self.cache.save_day(&state.active_day, &state.working);
    }
}
