//! Typed block operations — the unit of local editing and of undo.
//!
//! Every local edit is expressed as a [`BlockOp`] applied through
//! [`BlockDocument::apply`](crate::document::BlockDocument::apply). The
//! document can compute the inverse of any op against its current state,
//! which is what makes per-user undo possible without touching the merged
//! CRDT history.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::Block;

/// A single mutation of the block document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockOp {
    /// Insert a block at `index` (clamped to the current block count).
    InsertBlock { index: u32, block: Block },

    /// Remove the block with the given id.
    RemoveBlock { id: Uuid },

    /// Move an existing block to `to_index` (clamped).
    MoveBlock { id: Uuid, to_index: u32 },

    /// Replace `delete` bytes at byte offset `at` of the block's text
    /// with `insert`. Offsets are UTF-8 byte offsets.
    SpliceText {
        id: Uuid,
        at: u32,
        delete: u32,
        insert: String,
    },

    /// Set (`Some`) or remove (`None`) a block attribute.
    SetAttribute {
        id: Uuid,
        key: String,
        value: Option<String>,
    },

    /// Replace the document title.
    SetTitle { title: String },
}

impl BlockOp {
    /// The block this op targets, if any.
    pub fn target(&self) -> Option<Uuid> {
        match self {
            BlockOp::InsertBlock { block, .. } => Some(block.id),
            BlockOp::RemoveBlock { id }
            | BlockOp::MoveBlock { id, .. }
            | BlockOp::SpliceText { id, .. }
            | BlockOp::SetAttribute { id, .. } => Some(*id),
            BlockOp::SetTitle { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_of_insert_is_block_id() {
        let block = Block::paragraph("x");
        let id = block.id;
        let op = BlockOp::InsertBlock { index: 0, block };
        assert_eq!(op.target(), Some(id));
    }

    #[test]
    fn test_title_has_no_target() {
        let op = BlockOp::SetTitle { title: "Doc".into() };
        assert_eq!(op.target(), None);
    }
}
