//! Document session: one client's view of one synced object.
//!
//! The session owns the CRDT document plus everything that must stay
//! consistent with it under one lock: the queue of updates awaiting
//! server acknowledgement and the per-user undo history. Local edits,
//! undo/redo replays and remote integration all funnel through here;
//! the poll driver only ever talks to the session through
//! [`DocumentSession::build_request`] and
//! [`DocumentSession::absorb_response`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tessera_core::{Applied, BlockDocument, BlockOp, DocError, DocumentSnapshot};
use uuid::Uuid;

use crate::config::CollabConfig;
use crate::protocol::{PendingUpdate, PollRequest, PollResponse, PresencePayload, SessionKey};
use crate::undo::UndoHistory;

/// Updates applied locally but not yet acked by the server.
struct PendingQueue {
    items: VecDeque<PendingUpdate>,
    next_seq: u64,
    max: usize,
}

impl PendingQueue {
    fn new(max: usize) -> Self {
        Self {
            items: VecDeque::new(),
            next_seq: 1,
            max,
        }
    }

    fn enqueue(&mut self, bytes: Vec<u8>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push_back(PendingUpdate { seq, bytes });
        seq
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.max
    }

    /// Replace the whole queue with one update carrying `bytes` under a
    /// fresh sequence number. The relay's ack cursor is already past
    /// every replaced sequence or will be after this one, so nothing
    /// applies twice.
    fn collapse(&mut self, bytes: Vec<u8>) -> u64 {
        self.items.clear();
        self.enqueue(bytes)
    }

    fn snapshot(&self) -> Vec<PendingUpdate> {
        self.items.iter().cloned().collect()
    }

    fn ack_through(&mut self, seq: u64) {
        while self.items.front().is_some_and(|u| u.seq <= seq) {
            self.items.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

struct SessionInner {
    doc: BlockDocument,
    pending: PendingQueue,
    undo: UndoHistory,
    /// The server state vector from the last successful merge.
    merged_remote_version: Vec<u8>,
}

/// One client's session on one synced object.
pub struct DocumentSession {
    key: SessionKey,
    client_id: Uuid,
    inner: Mutex<SessionInner>,
}

impl DocumentSession {
    pub fn new(key: SessionKey, config: &CollabConfig) -> Self {
        Self {
            key,
            client_id: Uuid::new_v4(),
            inner: Mutex::new(SessionInner {
                doc: BlockDocument::new(),
                pending: PendingQueue::new(config.max_pending_updates),
                undo: UndoHistory::new(config.undo_capture_window, config.undo_depth),
                merged_remote_version: Vec::new(),
            }),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Local editing ───────────────────────────────────────────────

    /// Apply a local edit: records its inverse for undo and queues the
    /// resulting update for sync.
    pub fn apply_local(&self, op: &BlockOp) -> Applied {
        let mut inner = self.lock();
        // The inverse must see the pre-edit state.
        let inverse = inner.doc.invert(op);
        let outcome = inner.doc.apply(op);
        if outcome.applied == Applied::Changed {
            Self::queue_update(&mut inner, outcome.update);
            if let Some(inverse) = inverse {
                inner.undo.record(op.clone(), inverse);
            }
        }
        outcome.applied
    }

    /// Queue an encoded update for the next poll. When the queue is at
    /// capacity it is collapsed into a single diff against the last
    /// merged server state, which covers every unacked change including
    /// the new one; no edit is ever dropped.
    fn queue_update(inner: &mut SessionInner, bytes: Vec<u8>) {
        if !inner.pending.is_full() {
            inner.pending.enqueue(bytes);
            return;
        }
        // The diff is computed after the new edit applied, so it
        // subsumes `bytes` as well as everything already queued.
        let collapsed = if inner.merged_remote_version.is_empty() {
            inner.doc.full_state()
        } else {
            inner
                .doc
                .diff(&inner.merged_remote_version)
                .unwrap_or_else(|_| inner.doc.full_state())
        };
        let seq = inner.pending.collapse(collapsed);
        log::warn!("[session] pending queue full, collapsed into one diff (seq {seq})");
    }

    /// Apply an op without touching undo history (undo/redo replays).
    fn apply_replay(inner: &mut SessionInner, op: &BlockOp) -> Applied {
        let outcome = inner.doc.apply(op);
        if outcome.applied == Applied::Changed {
            Self::queue_update(inner, outcome.update);
        }
        outcome.applied
    }

    /// Undo this client's most recent step. Inverses whose target a
    /// remote edit already removed are skipped silently. Returns false
    /// when there is nothing to undo.
    pub fn undo(&self) -> bool {
        let mut inner = self.lock();
        let Some(group) = inner.undo.pop_undo() else {
            return false;
        };
        for op in &group.inverse {
            if Self::apply_replay(&mut inner, op) == Applied::Skipped {
                log::debug!("[session {}] undo op degraded to no-op", self.key);
            }
        }
        inner.undo.push_redo(group);
        true
    }

    /// Re-apply the most recently undone step.
    pub fn redo(&self) -> bool {
        let mut inner = self.lock();
        let Some(group) = inner.undo.pop_redo() else {
            return false;
        };
        for op in &group.forward {
            if Self::apply_replay(&mut inner, op) == Applied::Skipped {
                log::debug!("[session {}] redo op degraded to no-op", self.key);
            }
        }
        inner.undo.push_undo(group);
        true
    }

    /// Close the open undo group, e.g. when the caret moves.
    pub fn break_undo_group(&self) {
        self.lock().undo.break_group();
    }

    // ─── Sync plumbing ───────────────────────────────────────────────

    /// Build the next poll request: current state vector plus every
    /// unacked queued update.
    pub fn build_request(&self, presence: Option<PresencePayload>) -> PollRequest {
        let inner = self.lock();
        let mut req = PollRequest::new(self.key.clone(), self.client_id, inner.doc.state_vector());
        req.updates = inner.pending.snapshot();
        req.presence = presence;
        req
    }

    /// Integrate a poll response: drop acked updates, merge the diff.
    pub fn absorb_response(&self, resp: &PollResponse) -> Result<(), DocError> {
        let mut inner = self.lock();
        inner.pending.ack_through(resp.ack);
        inner.doc.apply_remote(&resp.update)?;
        inner.merged_remote_version = resp.server_state_vector.clone();
        Ok(())
    }

    /// Merge a remote update outside the poll cycle (tests, local relay).
    pub fn integrate_remote(&self, update: &[u8]) -> Result<(), DocError> {
        self.lock().doc.apply_remote(update)
    }

    // ─── Observation ─────────────────────────────────────────────────

    pub fn snapshot(&self) -> DocumentSnapshot {
        self.lock().doc.snapshot()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// True while edits are queued that the server has not acked.
    pub fn has_unsynced(&self) -> bool {
        self.pending_len() > 0
    }

    /// The server state vector as of the last successful merge. Empty
    /// before the first completed poll.
    pub fn merged_remote_version(&self) -> Vec<u8> {
        self.lock().merged_remote_version.clone()
    }

    pub fn undo_depth(&self) -> usize {
        self.lock().undo.undo_depth()
    }

    pub fn redo_depth(&self) -> usize {
        self.lock().undo.redo_depth()
    }
}
