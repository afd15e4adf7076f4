//! MemoryRemoteLog — in-process implementation of [`RemoteLog`].
//!
//! Per-uid record vectors plus a profile document, with snapshot push to all
//! registered listeners after every mutation and once at subscribe time.
//! Locks are released before any callback runs, so listeners can freely call
//! back into the store (matching the reentrancy of a real SDK feed).

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::RemoteError;
use crate::types::{now_ms, NutritionRecord, RecordDraft};

use super::{RemoteLog, SnapshotCallback, Subscription};

#[derive(Default)]
struct UserLog {
    records: Vec<NutritionRecord>,
    profile: Option<Value>,
}

type ListenerMap = HashMap<String, Vec<(u64, Arc<SnapshotCallback>)>>;

#[derive(Default)]
pub struct MemoryRemoteLog {
    users: Mutex<HashMap<String, UserLog>>,
    listeners: Arc<Mutex<ListenerMap>>,
    next_listener_id: AtomicU64,
    next_record_id: AtomicU64,
}

impl MemoryRemoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot for one uid, descending by timestamp (timestamp-less
    /// records sort last).
    fn snapshot(&self, uid: &str) -> Vec<NutritionRecord> {
        let users = self.users.lock();
        let mut records = users
            .get(uid)
            .map(|log| log.records.clone())
            .unwrap_or_default();
        records.sort_by_key(|r| Reverse(r.timestamp.unwrap_or(i64::MIN)));
        records
    }

    /// Push the current snapshot to every listener on `uid`.
    fn emit(&self, uid: &str) {
        let snapshot = self.snapshot(uid);
        // Snapshot the listener Arcs under the lock, call outside it.
        let callbacks: Vec<Arc<SnapshotCallback>> = {
            let listeners = self.listeners.lock();
            listeners
                .get(uid)
                .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };
        for cb in callbacks {
            cb(snapshot.clone());
        }
    }

    /// Stored profile document for a uid, if any.
    pub fn profile(&self, uid: &str) -> Option<Value> {
        self.users.lock().get(uid).and_then(|log| log.profile.clone())
    }

    /// Number of live listeners on a uid (test introspection).
    pub fn listener_count(&self, uid: &str) -> usize {
        self.listeners.lock().get(uid).map_or(0, Vec::len)
    }
}

#[async_trait]
impl RemoteLog for MemoryRemoteLog {
    async fn list_all(&self, uid: &str) -> Result<Vec<NutritionRecord>, RemoteError> {
        Ok(self.snapshot(uid))
    }

    async fn append(&self, uid: &str, mut draft: RecordDraft) -> Result<NutritionRecord, RemoteError> {
        if draft.timestamp.is_none() {
            draft.timestamp = Some(now_ms());
        }
        let id = format!("rec-{}", self.next_record_id.fetch_add(1, Ordering::Relaxed));
        let record = NutritionRecord::from_draft(id, draft);
        {
            let mut users = self.users.lock();
            users
                .entry(uid.to_string())
                .or_default()
                .records
                .push(record.clone());
        }
        self.emit(uid);
        Ok(record)
    }

    async fn remove(&self, uid: &str, id: &str) -> Result<(), RemoteError> {
        let removed = {
            let mut users = self.users.lock();
            match users.get_mut(uid) {
                Some(log) => {
                    let before = log.records.len();
                    log.records.retain(|r| r.id != id);
                    log.records.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.emit(uid);
        }
        Ok(())
    }

    fn subscribe(&self, uid: &str, on_change: Arc<SnapshotCallback>) -> Subscription {
        let listener_id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .entry(uid.to_string())
            .or_default()
            .push((listener_id, Arc::clone(&on_change)));

        // Fire immediately with the current snapshot, like a real-time feed.
        on_change(self.snapshot(uid));

        let listeners = Arc::clone(&self.listeners);
        let uid = uid.to_string();
        Subscription::new(move || {
            let mut listeners = listeners.lock();
            if let Some(subs) = listeners.get_mut(&uid) {
                subs.retain(|(id, _)| *id != listener_id);
            }
        })
    }

    async fn ensure_owner_record(&self, uid: &str, profile: Value) -> Result<(), RemoteError> {
        let mut users = self.users.lock();
        let log = users.entry(uid.to_string()).or_default();
        match (&mut log.profile, profile) {
            // Shallow-merge object patches into an existing object document.
            (Some(Value::Object(existing)), Value::Object(patch)) => {
                existing.extend(patch);
            }
            (slot, patch) => *slot = Some(patch),
        }
        Ok(())
    }
}
