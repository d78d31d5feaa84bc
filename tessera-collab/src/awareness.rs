//! Presence tracking: who else is in the session, and are we online.
//!
//! Presence is derived, not stored: every poll response carries the
//! full set of other clients, so the tracker simply replaces its peer
//! list each tick. A peer whose server-reported idle time exceeds the
//! timeout renders as disconnected but stays listed until the server
//! expires it. The local client's own connectivity is inferred from
//! consecutive transport failures, since with a poll transport there is
//! no connection to observe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tessera_core::SelectionCursor;
use uuid::Uuid;

use crate::config::CollabConfig;
use crate::protocol::{CollaboratorInfo, PeerPresence, PresencePayload};

type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// One other participant, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Collaborator {
    pub client_id: Uuid,
    pub info: CollaboratorInfo,
    pub selection: Option<SelectionCursor>,
    pub is_connected: bool,
}

struct LocalPresence {
    info: CollaboratorInfo,
    selection: Option<SelectionCursor>,
}

/// Presence state for one session.
pub struct PresenceTracker {
    local: Mutex<LocalPresence>,
    peers: Mutex<Vec<PeerPresence>>,
    consecutive_failures: AtomicU32,
    peer_timeout_ms: u64,
    failure_threshold: u32,
    /// The list as of the last notification, for change coalescing.
    published: Mutex<Vec<Collaborator>>,
    callbacks: Mutex<HashMap<u64, ChangeCallback>>,
    next_callback_id: AtomicU64,
}

impl PresenceTracker {
    pub fn new(info: CollaboratorInfo, config: &CollabConfig) -> Self {
        Self {
            local: Mutex::new(LocalPresence {
                info,
                selection: None,
            }),
            peers: Mutex::new(Vec::new()),
            consecutive_failures: AtomicU32::new(0),
            peer_timeout_ms: config.peer_timeout().as_millis() as u64,
            failure_threshold: config.failure_threshold,
            published: Mutex::new(Vec::new()),
            callbacks: Mutex::new(HashMap::new()),
            next_callback_id: AtomicU64::new(1),
        }
    }

    fn local(&self) -> MutexGuard<'_, LocalPresence> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn peers(&self) -> MutexGuard<'_, Vec<PeerPresence>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the local caret reported on the next poll.
    pub fn set_selection(&self, selection: Option<SelectionCursor>) {
        self.local().selection = selection;
    }

    /// The heartbeat piggybacked on every poll request.
    pub fn payload(&self) -> PresencePayload {
        let local = self.local();
        PresencePayload {
            info: local.info.clone(),
            selection: local.selection,
        }
    }

    /// Replace the peer list with the latest server-reported batch.
    ///
    /// Subscribers are notified at most once per batch, and only when
    /// the computed collaborator list actually changed.
    pub fn record_batch(&self, batch: Vec<PeerPresence>) {
        let was_disconnected = self.is_disconnected();
        *self.peers() = batch;
        self.consecutive_failures.store(0, Ordering::Relaxed);

        let current = self.collaborators();
        let changed = {
            let mut published = self
                .published
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *published == current {
                false
            } else {
                *published = current;
                true
            }
        };
        if changed || was_disconnected {
            self.notify();
        }
    }

    /// Note a failed poll. Returns the new consecutive-failure count.
    pub fn record_failure(&self) -> u32 {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        // Crossing the threshold flips the visible connection state.
        if failures == self.failure_threshold {
            self.notify();
        }
        failures
    }

    /// Subscribe to presence changes: joins, leaves, selection moves,
    /// connection flips. Returns an id for [`PresenceTracker::unsubscribe`].
    pub fn on_change(&self, callback: impl Fn() + Send + Sync + 'static) -> u64 {
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(callback));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn notify(&self) {
        // Invoked without the lock held so a callback may subscribe or
        // unsubscribe without deadlocking.
        let callbacks: Vec<ChangeCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    /// Everyone else in the session. Never includes the local client;
    /// the server strips the requester from every response.
    pub fn collaborators(&self) -> Vec<Collaborator> {
        self.peers()
            .iter()
            .map(|p| Collaborator {
                client_id: p.client_id,
                info: p.info.clone(),
                selection: p.selection,
                is_connected: p.idle_ms <= self.peer_timeout_ms,
            })
            .collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers().len()
    }

    /// True once enough polls have failed in a row.
    pub fn is_disconnected(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) >= self.failure_threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}
