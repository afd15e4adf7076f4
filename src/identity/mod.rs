//! Identity Tracker — auth-state transitions as an ordered channel.
//!
//! The auth integration calls [`IdentityTracker::signal`] on every auth event
//! (sign-in, sign-out, anonymous upgrade). Each subscriber receives the
//! current identity immediately, then every transition in order. The sync
//! engine consumes its receiver from a single task, so the handler for
//! transition N+1 never begins before the handler for transition N returns —
//! the non-overlap guarantee the engine's teardown/setup sequence relies on.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::types::Identity;

pub struct IdentityTracker {
    current: Mutex<Identity>,
    senders: Mutex<Vec<mpsc::UnboundedSender<Identity>>>,
}

impl IdentityTracker {
    /// Start signed out.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Identity::signed_out()),
            senders: Mutex::new(Vec::new()),
        }
    }

    /// The latest delivered identity. UI feature gating (e.g. restricting
    /// calendar browsing to non-anonymous users) reads this.
    pub fn current(&self) -> Identity {
        self.current.lock().clone()
    }

    /// Open a transition feed. The current identity is delivered immediately,
    /// transitions follow in signal order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Identity> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Hold the current lock across registration so a concurrent signal
        // cannot slip between the initial send and the sender registration.
        let current = self.current.lock();
        let _ = tx.send(current.clone());
        self.senders.lock().push(tx);
        rx
    }

    /// Record an auth event and forward it to all subscribers. Closed
    /// subscriptions are pruned here.
    pub fn signal(&self, identity: Identity) {
        let mut current = self.current.lock();
        *current = identity.clone();
        self.senders
            .lock()
            .retain(|tx| tx.send(identity.clone()).is_ok());
    }
}

impl Default for IdentityTracker {
    fn default() -> Self {
        Self::new()
    }
}
