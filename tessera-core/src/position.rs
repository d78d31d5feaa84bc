//! Position mapping between block-relative cursors and absolute indices.
//!
//! Collaborators report their selection as a block id plus a byte offset
//! inside that block. For rendering ordered peer lists and for features
//! that need a single linear position (e.g. "who is furthest down the
//! document"), that pair is flattened into an absolute index over the
//! concatenation of all block texts, with one synthetic separator byte
//! between adjacent blocks.
//!
//! Both directions are pure functions over a [`DocumentSnapshot`]'s block
//! list; the mapper holds no state and never touches the CRDT.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::Block;

/// A collaborator's cursor: a block plus a UTF-8 byte offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCursor {
    pub block_id: Uuid,
    pub offset: u32,
}

/// Flatten a cursor to an absolute index over the block list.
///
/// Returns `None` when the block no longer exists or the offset points
/// past the end of its text, which happens routinely when a peer's
/// selection races a local edit. Callers treat `None` as "position
/// unknown", never as an error.
pub fn absolute_index(blocks: &[Block], cursor: SelectionCursor) -> Option<usize> {
    let mut base = 0usize;
    for block in blocks {
        if block.id == cursor.block_id {
            if cursor.offset as usize > block.text.len() {
                return None;
            }
            return Some(base + cursor.offset as usize);
        }
        // +1 for the separator between adjacent blocks.
        base += block.text.len() + 1;
    }
    None
}

/// Map an absolute index back to a block-relative cursor.
///
/// The separator position after a block maps to offset 0 of the next
/// block. Returns `None` when `index` lies past the end of the document
/// or the document has no blocks.
pub fn cursor_at(blocks: &[Block], index: usize) -> Option<SelectionCursor> {
    let mut base = 0usize;
    for (i, block) in blocks.iter().enumerate() {
        let end = base + block.text.len();
        if index <= end {
            return Some(SelectionCursor {
                block_id: block.id,
                offset: (index - base) as u32,
            });
        }
        if index == end + 1 && i + 1 == blocks.len() {
            // Separator after the last block has no successor.
            return None;
        }
        base = end + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blocks() -> Vec<Block> {
        vec![
            Block::paragraph("abc"),
            Block::paragraph(""),
            Block::paragraph("defgh"),
        ]
    }

    #[test]
    fn test_first_block_offsets() {
        let blocks = three_blocks();
        let cursor = SelectionCursor {
            block_id: blocks[0].id,
            offset: 2,
        };
        assert_eq!(absolute_index(&blocks, cursor), Some(2));
    }

    #[test]
    fn test_later_blocks_account_for_separators() {
        let blocks = three_blocks();
        // "abc" (3) + sep (1) + "" (0) + sep (1) = base 5 for block 2.
        let cursor = SelectionCursor {
            block_id: blocks[2].id,
            offset: 4,
        };
        assert_eq!(absolute_index(&blocks, cursor), Some(9));
    }

    #[test]
    fn test_deleted_block_maps_to_none() {
        let blocks = three_blocks();
        let cursor = SelectionCursor {
            block_id: Uuid::new_v4(),
            offset: 0,
        };
        assert_eq!(absolute_index(&blocks, cursor), None);
    }

    #[test]
    fn test_offset_past_block_end_maps_to_none() {
        let blocks = three_blocks();
        let cursor = SelectionCursor {
            block_id: blocks[0].id,
            offset: 4,
        };
        assert_eq!(absolute_index(&blocks, cursor), None);
    }

    #[test]
    fn test_round_trip_every_valid_position() {
        let blocks = three_blocks();
        for block in &blocks {
            for offset in 0..=block.text.len() as u32 {
                let cursor = SelectionCursor {
                    block_id: block.id,
                    offset,
                };
                let index = absolute_index(&blocks, cursor).unwrap();
                let back = cursor_at(&blocks, index).unwrap();
                assert_eq!(back, cursor);
            }
        }
    }

    #[test]
    fn test_index_past_document_end_is_none() {
        let blocks = three_blocks();
        assert_eq!(cursor_at(&blocks, 999), None);
        assert_eq!(cursor_at(&[], 0), None);
    }
}
