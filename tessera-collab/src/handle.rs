//! The editor-facing surface of one collaborative session.
//!
//! A [`CollabHandle`] is what a consumer holds while it shows a synced
//! object: apply edits, drive undo/redo, report the caret, read the
//! peer list. Dropping the handle releases its registry reference;
//! dropping the last one flushes and tears the session down.

use std::sync::Arc;

use tessera_core::{absolute_index, Applied, BlockOp, DocumentSnapshot, SelectionCursor};
use uuid::Uuid;

use crate::awareness::{Collaborator, PresenceTracker};
use crate::manager::CollabRegistry;
use crate::protocol::SessionKey;
use crate::session::DocumentSession;

/// Diagnostic snapshot for support tooling.
#[derive(Debug, Clone)]
pub struct DebugData {
    pub session: SessionKey,
    pub client_id: Uuid,
    pub pending_updates: usize,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub peer_count: usize,
    pub consecutive_failures: u32,
}

/// A reference-counted view of one session.
pub struct CollabHandle {
    registry: Arc<CollabRegistry>,
    key: SessionKey,
    session: Arc<DocumentSession>,
    presence: Arc<PresenceTracker>,
}

impl CollabHandle {
    pub(crate) fn new(
        registry: Arc<CollabRegistry>,
        key: SessionKey,
        session: Arc<DocumentSession>,
        presence: Arc<PresenceTracker>,
    ) -> Self {
        Self {
            registry,
            key,
            session,
            presence,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn client_id(&self) -> Uuid {
        self.session.client_id()
    }

    // ─── Editing ─────────────────────────────────────────────────────

    pub fn apply(&self, op: &BlockOp) -> Applied {
        self.session.apply_local(op)
    }

    pub fn undo(&self) -> bool {
        self.session.undo()
    }

    pub fn redo(&self) -> bool {
        self.session.redo()
    }

    /// Close the open undo group, e.g. on caret movement.
    pub fn break_undo_group(&self) {
        self.session.break_undo_group()
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        self.session.snapshot()
    }

    // ─── Presence ────────────────────────────────────────────────────

    /// Report the local caret; sent with the next poll.
    pub fn set_selection(&self, selection: Option<SelectionCursor>) {
        self.presence.set_selection(selection)
    }

    /// Everyone else in the session, never including this client.
    pub fn collaborators(&self) -> Vec<Collaborator> {
        self.presence.collaborators()
    }

    /// Subscribe to coalesced presence changes. The callback fires once
    /// per batch that changed the collaborator list or the connection
    /// state, not once per field.
    pub fn on_presence_change(&self, callback: impl Fn() + Send + Sync + 'static) -> u64 {
        self.presence.on_change(callback)
    }

    pub fn unsubscribe_presence(&self, id: u64) {
        self.presence.unsubscribe(id)
    }

    /// A peer's caret flattened to an absolute index over the current
    /// document, `None` when their block is gone or their offset stale.
    pub fn absolute_position(&self, cursor: SelectionCursor) -> Option<usize> {
        absolute_index(&self.session.snapshot().blocks, cursor)
    }

    /// True once enough consecutive polls have failed.
    pub fn is_disconnected(&self) -> bool {
        self.presence.is_disconnected()
    }

    /// True while local edits await server acknowledgement.
    pub fn has_unsynced(&self) -> bool {
        self.session.has_unsynced()
    }

    // ─── Diagnostics ─────────────────────────────────────────────────

    pub fn debug_data(&self) -> DebugData {
        DebugData {
            session: self.key.clone(),
            client_id: self.session.client_id(),
            pending_updates: self.session.pending_len(),
            undo_depth: self.session.undo_depth(),
            redo_depth: self.session.redo_depth(),
            peer_count: self.presence.peer_count(),
            consecutive_failures: self.presence.consecutive_failures(),
        }
    }

    /// Ask the poll loop for an immediate tick.
    pub fn nudge_sync(&self) {
        self.registry.nudge(&self.key)
    }
}

impl Drop for CollabHandle {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollabConfig;
    use crate::protocol::CollaboratorInfo;
    use crate::relay::{RelayConfig, SyncRelay};
    use tessera_core::Block;

    fn handle() -> CollabHandle {
        let relay = Arc::new(SyncRelay::new(RelayConfig::default()));
        let registry = Arc::new(CollabRegistry::with_relay(CollabConfig::default(), relay));
        registry
            .acquire(SessionKey::new("post", "1"), CollaboratorInfo::new("Me"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_edit_and_undo_through_handle() {
        let h = handle();
        let block = Block::paragraph("hello");
        h.apply(&BlockOp::InsertBlock {
            index: 0,
            block: block.clone(),
        });
        assert_eq!(h.snapshot().blocks.len(), 1);
        assert!(h.undo());
        assert!(h.snapshot().blocks.is_empty());
        assert!(h.redo());
        assert_eq!(h.snapshot().blocks[0].id, block.id);
    }

    #[tokio::test]
    async fn test_absolute_position_through_handle() {
        let h = handle();
        let block = Block::paragraph("hello");
        h.apply(&BlockOp::InsertBlock {
            index: 0,
            block: block.clone(),
        });
        let cursor = SelectionCursor {
            block_id: block.id,
            offset: 3,
        };
        assert_eq!(h.absolute_position(cursor), Some(3));
    }

    #[tokio::test]
    async fn test_debug_data_reflects_state() {
        let h = handle();
        h.apply(&BlockOp::SetTitle { title: "T".into() });
        let data = h.debug_data();
        assert_eq!(data.pending_updates, 1);
        assert_eq!(data.undo_depth, 1);
        assert_eq!(data.redo_depth, 0);
        assert_eq!(data.peer_count, 0);
        assert_eq!(data.client_id, h.client_id());
    }
}
