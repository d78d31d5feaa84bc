//! Per-user undo history.
//!
//! The merged CRDT history interleaves everyone's edits, so undoing the
//! last *transaction* would routinely undo someone else's work. Instead
//! each client keeps its own stack of op groups: for every local edit
//! the session records the forward op together with its inverse,
//! computed against the document state at apply time. Undo replays the
//! inverses as ordinary local edits, so an undo is itself synced like
//! any other change and never rewinds remote work.
//!
//! Inverses can go stale when a remote edit removes the target block;
//! the document layer then skips them, which is the intended graceful
//! degradation rather than an error.

use std::time::{Duration, Instant};

use tessera_core::BlockOp;

/// One undoable step: the ops as applied plus their inverses.
///
/// `inverse` is stored newest-first so undo can replay it front to back.
#[derive(Debug, Clone)]
pub struct UndoGroup {
    pub forward: Vec<BlockOp>,
    pub inverse: Vec<BlockOp>,
}

/// Undo/redo stacks for a single client.
pub struct UndoHistory {
    undo: Vec<UndoGroup>,
    redo: Vec<UndoGroup>,
    capture_window: Duration,
    max_depth: usize,
    last_edit: Option<Instant>,
    /// Set by `break_group` so the next edit starts a fresh step even
    /// inside the capture window (e.g. after a selection move).
    force_new_group: bool,
}

impl UndoHistory {
    pub fn new(capture_window: Duration, max_depth: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            capture_window,
            max_depth,
            last_edit: None,
            force_new_group: false,
        }
    }

    /// Record a local edit. Edits within the capture window coalesce
    /// into the open group; anything else starts a new one. Any new
    /// edit invalidates the redo stack.
    pub fn record(&mut self, forward: BlockOp, inverse: BlockOp) {
        self.redo.clear();
        let now = Instant::now();
        let coalesce = !self.force_new_group
            && self
                .last_edit
                .is_some_and(|t| now.duration_since(t) < self.capture_window)
            && !self.undo.is_empty();
        self.force_new_group = false;
        self.last_edit = Some(now);

        if coalesce {
            if let Some(group) = self.undo.last_mut() {
                group.forward.push(forward);
                group.inverse.insert(0, inverse);
                return;
            }
        }

        self.undo.push(UndoGroup {
            forward: vec![forward],
            inverse: vec![inverse],
        });
        if self.undo.len() > self.max_depth {
            self.undo.remove(0);
        }
    }

    /// Close the open group; the next edit starts a new step.
    pub fn break_group(&mut self) {
        self.force_new_group = true;
    }

    /// Pop the most recent step for undoing. The caller replays the
    /// group's inverses and pushes the group onto redo afterwards.
    pub fn pop_undo(&mut self) -> Option<UndoGroup> {
        self.undo.pop()
    }

    pub fn pop_redo(&mut self) -> Option<UndoGroup> {
        self.redo.pop()
    }

    /// Push a group back after undoing it, making it redoable.
    pub fn push_redo(&mut self, group: UndoGroup) {
        self.redo.push(group);
    }

    /// Push a group back after redoing it, making it undoable again
    /// without restarting coalescing.
    pub fn push_undo(&mut self, group: UndoGroup) {
        self.undo.push(group);
        self.force_new_group = true;
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}
