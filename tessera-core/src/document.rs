//! CRDT-backed block document.
//!
//! [`BlockDocument`] wraps a Yrs `Doc` holding the shared structure:
//!
//! ```text
//! Doc
//! ├── "blocks": YArray
//! │     ├── YMap { "id": str, "kind": str, "text": YText, "attrs": YMap }
//! │     └── …
//! └── "meta":   YMap { "title": str }
//! ```
//!
//! Local edits go through [`BlockDocument::apply`] as typed [`BlockOp`]s;
//! each successful apply is one Yrs transaction and yields the v1-encoded
//! update for that transaction, which the session queues for sync. Remote
//! updates arrive as opaque byte payloads via [`BlockDocument::apply_remote`]
//! and are decoded *before* any mutation, so a malformed payload can never
//! corrupt local state.
//!
//! Concurrent edits merge inside Yrs: deterministic, commutative and
//! idempotent regardless of arrival order, with same-field conflicts
//! resolved by the Yrs logical clock rather than wall-clock time.

use std::collections::BTreeMap;

use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Any, Array, ArrayRef, Doc, GetString, Map, MapPrelim, MapRef, ReadTxn, StateVector, Text,
    TextPrelim, TextRef, Transact, TransactionMut, Update, Value,
};

use crate::block::Block;
use crate::op::BlockOp;

/// Errors produced by the document layer.
#[derive(Debug, Clone)]
pub enum DocError {
    /// The payload could not be decoded as a v1 update.
    MalformedUpdate(String),
    /// The decoded update could not be integrated.
    MergeFailed(String),
}

impl std::fmt::Display for DocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedUpdate(e) => write!(f, "malformed update: {e}"),
            Self::MergeFailed(e) => write!(f, "merge failed: {e}"),
        }
    }
}

impl std::error::Error for DocError {}

impl From<yrs::encoding::read::Error> for DocError {
    fn from(e: yrs::encoding::read::Error) -> Self {
        DocError::MalformedUpdate(e.to_string())
    }
}

/// Whether an op actually mutated the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    /// The op's target no longer exists (or the op was out of range);
    /// nothing was mutated. This is the graceful-degradation path for
    /// edits and undo replays racing a remote removal.
    Skipped,
}

/// Result of applying a local op.
#[derive(Debug, Clone)]
pub struct OpOutcome {
    pub applied: Applied,
    /// The v1-encoded update for the transaction. Empty when skipped.
    pub update: Vec<u8>,
}

/// Read-only view of the document for renderers and position mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub title: String,
    pub blocks: Vec<Block>,
}

/// The shared block document.
pub struct BlockDocument {
    doc: Doc,
    blocks: ArrayRef,
    meta: MapRef,
}

impl Default for BlockDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDocument {
    pub fn new() -> Self {
        let doc = Doc::new();
        let blocks = doc.get_or_insert_array("blocks");
        let meta = doc.get_or_insert_map("meta");
        Self { doc, blocks, meta }
    }

    /// Apply a local op in a single transaction.
    ///
    /// Returns the outcome plus the encoded update to queue for sync.
    /// Ops whose target vanished are skipped, never errors.
    pub fn apply(&self, op: &BlockOp) -> OpOutcome {
        let mut txn = self.doc.transact_mut();
        let applied = self.apply_in(&mut txn, op);
        let update = match applied {
            Applied::Changed => txn.encode_update_v1(),
            Applied::Skipped => Vec::new(),
        };
        drop(txn);

        if applied == Applied::Skipped {
            log::debug!("[doc] skipped op with missing target: {op:?}");
        }
        OpOutcome { applied, update }
    }

    fn apply_in(&self, txn: &mut TransactionMut<'_>, op: &BlockOp) -> Applied {
        match op {
            BlockOp::InsertBlock { index, block } => {
                // Duplicate ids would make later ops ambiguous; treat a
                // re-insert of a live block as already applied.
                if self.find(txn, block.id).is_some() {
                    return Applied::Skipped;
                }
                let index = (*index).min(self.blocks.len(txn));
                self.insert_block_at(txn, index, block);
                Applied::Changed
            }

            BlockOp::RemoveBlock { id } => match self.find(txn, *id) {
                Some((index, _)) => {
                    self.blocks.remove(txn, index);
                    Applied::Changed
                }
                None => Applied::Skipped,
            },

            BlockOp::MoveBlock { id, to_index } => {
                let Some((index, map)) = self.find(txn, *id) else {
                    return Applied::Skipped;
                };
                let Some(block) = self.read_block(txn, &map) else {
                    return Applied::Skipped;
                };
                self.blocks.remove(txn, index);
                let to = (*to_index).min(self.blocks.len(txn));
                self.insert_block_at(txn, to, &block);
                Applied::Changed
            }

            BlockOp::SpliceText {
                id,
                at,
                delete,
                insert,
            } => {
                let Some((_, map)) = self.find(txn, *id) else {
                    return Applied::Skipped;
                };
                let Some(text) = block_text(txn, &map) else {
                    return Applied::Skipped;
                };
                let len = text.len(txn);
                if *at > len {
                    return Applied::Skipped;
                }
                let delete = (*delete).min(len - at);
                if delete > 0 {
                    text.remove_range(txn, *at, delete);
                }
                if !insert.is_empty() {
                    text.insert(txn, *at, insert);
                }
                if delete == 0 && insert.is_empty() {
                    Applied::Skipped
                } else {
                    Applied::Changed
                }
            }

            BlockOp::SetAttribute { id, key, value } => {
                let Some((_, map)) = self.find(txn, *id) else {
                    return Applied::Skipped;
                };
                let Some(attrs) = block_attrs(txn, &map) else {
                    return Applied::Skipped;
                };
                match value {
                    Some(v) => {
                        attrs.insert(txn, key.as_str(), v.clone());
                        Applied::Changed
                    }
                    None => {
                        if attrs.remove(txn, key).is_some() {
                            Applied::Changed
                        } else {
                            Applied::Skipped
                        }
                    }
                }
            }

            BlockOp::SetTitle { title } => {
                self.meta.insert(txn, "title", title.clone());
                Applied::Changed
            }
        }
    }

    fn insert_block_at(&self, txn: &mut TransactionMut<'_>, index: u32, block: &Block) {
        let map: MapRef = self.blocks.insert(txn, index, MapPrelim::default());
        map.insert(txn, "id", block.id.to_string());
        map.insert(txn, "kind", block.kind.clone());
        let text: TextRef = map.insert(txn, "text", TextPrelim::new(""));
        if !block.text.is_empty() {
            text.insert(txn, 0, &block.text);
        }
        let attrs: MapRef = map.insert(txn, "attrs", MapPrelim::default());
        for (k, v) in &block.attrs {
            attrs.insert(txn, k.as_str(), v.clone());
        }
    }

    /// Compute the inverse of `op` against the *current* state.
    ///
    /// Returns `None` when the op's target no longer exists; applying
    /// the op would be a no-op anyway.
    pub fn invert(&self, op: &BlockOp) -> Option<BlockOp> {
        let txn = self.doc.transact();
        match op {
            BlockOp::InsertBlock { block, .. } => Some(BlockOp::RemoveBlock { id: block.id }),

            BlockOp::RemoveBlock { id } => {
                let (index, map) = self.find(&txn, *id)?;
                let block = self.read_block(&txn, &map)?;
                Some(BlockOp::InsertBlock { index, block })
            }

            BlockOp::MoveBlock { id, .. } => {
                let (index, _) = self.find(&txn, *id)?;
                Some(BlockOp::MoveBlock {
                    id: *id,
                    to_index: index,
                })
            }

            BlockOp::SpliceText {
                id,
                at,
                delete,
                insert,
            } => {
                let (_, map) = self.find(&txn, *id)?;
                let text = block_text(&txn, &map)?;
                let current = text.get_string(&txn);
                let at_usize = *at as usize;
                if at_usize > current.len() {
                    return None;
                }
                let end = (at_usize + *delete as usize).min(current.len());
                let deleted = current.get(at_usize..end)?.to_string();
                Some(BlockOp::SpliceText {
                    id: *id,
                    at: *at,
                    delete: insert.len() as u32,
                    insert: deleted,
                })
            }

            BlockOp::SetAttribute { id, key, .. } => {
                let (_, map) = self.find(&txn, *id)?;
                let attrs = block_attrs(&txn, &map)?;
                let previous = get_str(&txn, &attrs, key);
                Some(BlockOp::SetAttribute {
                    id: *id,
                    key: key.clone(),
                    value: previous,
                })
            }

            BlockOp::SetTitle { .. } => {
                let previous = get_str(&txn, &self.meta, "title").unwrap_or_default();
                Some(BlockOp::SetTitle { title: previous })
            }
        }
    }

    /// Merge a remote v1 update. Decode failures leave state untouched.
    pub fn apply_remote(&self, update: &[u8]) -> Result<(), DocError> {
        // The canonical empty update: zero structs, zero deletions.
        // Anything else, however short, must survive decoding.
        if update.is_empty() || update == [0, 0] {
            return Ok(());
        }
        let decoded = Update::decode_v1(update)?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(decoded)
            .map_err(|e| DocError::MergeFailed(e.to_string()))
    }

    /// Encode the local state vector (v1).
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode everything the holder of `remote_state_vector` is missing.
    pub fn diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>, DocError> {
        let sv = StateVector::decode_v1(remote_state_vector)?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Encode the full document state as one update.
    pub fn full_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Materialize a read-only snapshot.
    pub fn snapshot(&self) -> DocumentSnapshot {
        let txn = self.doc.transact();
        let title = get_str(&txn, &self.meta, "title").unwrap_or_default();
        let mut blocks = Vec::with_capacity(self.blocks.len(&txn) as usize);
        for i in 0..self.blocks.len(&txn) {
            if let Some(Value::YMap(map)) = self.blocks.get(&txn, i) {
                if let Some(block) = self.read_block(&txn, &map) {
                    blocks.push(block);
                }
            }
        }
        DocumentSnapshot { title, blocks }
    }

    pub fn block_count(&self) -> u32 {
        let txn = self.doc.transact();
        self.blocks.len(&txn)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        let txn = self.doc.transact();
        self.find(&txn, id).is_some()
    }

    fn find<T: ReadTxn>(&self, txn: &T, id: Uuid) -> Option<(u32, MapRef)> {
        let needle = id.to_string();
        for i in 0..self.blocks.len(txn) {
            if let Some(Value::YMap(map)) = self.blocks.get(txn, i) {
                if get_str(txn, &map, "id").as_deref() == Some(needle.as_str()) {
                    return Some((i, map));
                }
            }
        }
        None
    }

    fn read_block<T: ReadTxn>(&self, txn: &T, map: &MapRef) -> Option<Block> {
        let id = Uuid::parse_str(&get_str(txn, map, "id")?).ok()?;
        let kind = get_str(txn, map, "kind")?;
        let text = block_text(txn, map)
            .map(|t| t.get_string(txn))
            .unwrap_or_default();
        let mut attrs = BTreeMap::new();
        if let Some(attr_map) = block_attrs(txn, map) {
            let keys: Vec<String> = attr_map.keys(txn).map(|k| k.to_string()).collect();
            for key in keys {
                if let Some(v) = get_str(txn, &attr_map, &key) {
                    attrs.insert(key, v);
                }
            }
        }
        Some(Block {
            id,
            kind,
            text,
            attrs,
        })
    }
}

fn get_str<T: ReadTxn>(txn: &T, map: &MapRef, key: &str) -> Option<String> {
    match map.get(txn, key) {
        Some(Value::Any(Any::String(s))) => Some(s.to_string()),
        _ => None,
    }
}

fn block_text<T: ReadTxn>(txn: &T, map: &MapRef) -> Option<TextRef> {
    match map.get(txn, "text") {
        Some(Value::YText(t)) => Some(t),
        _ => None,
    }
}

fn block_attrs<T: ReadTxn>(txn: &T, map: &MapRef) -> Option<MapRef> {
    match map.get(txn, "attrs") {
        Some(Value::YMap(m)) => Some(m),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_paragraph(text: &str) -> (BlockDocument, Block) {
        let doc = BlockDocument::new();
        let block = Block::paragraph(text);
        let out = doc.apply(&BlockOp::InsertBlock {
            index: 0,
            block: block.clone(),
        });
        assert_eq!(out.applied, Applied::Changed);
        (doc, block)
    }

    #[test]
    fn test_insert_and_snapshot() {
        let (doc, block) = doc_with_paragraph("hello");
        let snap = doc.snapshot();
        assert_eq!(snap.blocks.len(), 1);
        assert_eq!(snap.blocks[0].id, block.id);
        assert_eq!(snap.blocks[0].text, "hello");
    }

    #[test]
    fn test_insert_generates_update() {
        let (doc, _) = doc_with_paragraph("hello");
        let out = doc.apply(&BlockOp::InsertBlock {
            index: 1,
            block: Block::paragraph("world"),
        });
        assert!(out.update.len() > 2);
        assert_eq!(doc.block_count(), 2);
    }

    #[test]
    fn test_remove_missing_block_is_skipped() {
        let doc = BlockDocument::new();
        let out = doc.apply(&BlockOp::RemoveBlock { id: Uuid::new_v4() });
        assert_eq!(out.applied, Applied::Skipped);
        assert!(out.update.is_empty());
    }

    #[test]
    fn test_splice_text() {
        let (doc, block) = doc_with_paragraph("hello world");
        doc.apply(&BlockOp::SpliceText {
            id: block.id,
            at: 6,
            delete: 5,
            insert: "tessera".into(),
        });
        assert_eq!(doc.snapshot().blocks[0].text, "hello tessera");
    }

    #[test]
    fn test_splice_out_of_range_is_skipped() {
        let (doc, block) = doc_with_paragraph("hi");
        let out = doc.apply(&BlockOp::SpliceText {
            id: block.id,
            at: 99,
            delete: 1,
            insert: "x".into(),
        });
        assert_eq!(out.applied, Applied::Skipped);
        assert_eq!(doc.snapshot().blocks[0].text, "hi");
    }

    #[test]
    fn test_invert_splice_restores_text() {
        let (doc, block) = doc_with_paragraph("hello world");
        let op = BlockOp::SpliceText {
            id: block.id,
            at: 0,
            delete: 5,
            insert: "goodbye".into(),
        };
        let inverse = doc.invert(&op).unwrap();
        doc.apply(&op);
        assert_eq!(doc.snapshot().blocks[0].text, "goodbye world");
        doc.apply(&inverse);
        assert_eq!(doc.snapshot().blocks[0].text, "hello world");
    }

    #[test]
    fn test_invert_remove_restores_block() {
        let (doc, block) = doc_with_paragraph("keep me");
        let op = BlockOp::RemoveBlock { id: block.id };
        let inverse = doc.invert(&op).unwrap();
        doc.apply(&op);
        assert_eq!(doc.block_count(), 0);
        doc.apply(&inverse);
        let snap = doc.snapshot();
        assert_eq!(snap.blocks.len(), 1);
        assert_eq!(snap.blocks[0].text, "keep me");
        assert_eq!(snap.blocks[0].id, block.id);
    }

    #[test]
    fn test_invert_missing_target_is_none() {
        let doc = BlockDocument::new();
        let op = BlockOp::RemoveBlock { id: Uuid::new_v4() };
        assert!(doc.invert(&op).is_none());
    }

    #[test]
    fn test_set_and_unset_attribute() {
        let (doc, block) = doc_with_paragraph("x");
        doc.apply(&BlockOp::SetAttribute {
            id: block.id,
            key: "align".into(),
            value: Some("\"center\"".into()),
        });
        let snap = doc.snapshot();
        assert_eq!(
            snap.blocks[0].attrs.get("align").map(String::as_str),
            Some("\"center\"")
        );

        doc.apply(&BlockOp::SetAttribute {
            id: block.id,
            key: "align".into(),
            value: None,
        });
        assert!(doc.snapshot().blocks[0].attrs.is_empty());
    }

    #[test]
    fn test_title_roundtrip() {
        let doc = BlockDocument::new();
        assert_eq!(doc.snapshot().title, "");
        let op = BlockOp::SetTitle {
            title: "Draft".into(),
        };
        let inverse = doc.invert(&op).unwrap();
        doc.apply(&op);
        assert_eq!(doc.snapshot().title, "Draft");
        doc.apply(&inverse);
        assert_eq!(doc.snapshot().title, "");
    }

    #[test]
    fn test_move_block() {
        let doc = BlockDocument::new();
        let a = Block::paragraph("a");
        let b = Block::paragraph("b");
        doc.apply(&BlockOp::InsertBlock {
            index: 0,
            block: a.clone(),
        });
        doc.apply(&BlockOp::InsertBlock {
            index: 1,
            block: b.clone(),
        });
        doc.apply(&BlockOp::MoveBlock {
            id: a.id,
            to_index: 1,
        });
        let snap = doc.snapshot();
        assert_eq!(snap.blocks[0].id, b.id);
        assert_eq!(snap.blocks[1].id, a.id);
    }

    #[test]
    fn test_remote_update_converges() {
        let (doc_a, _) = doc_with_paragraph("from a");
        let doc_b = BlockDocument::new();
        doc_b.apply_remote(&doc_a.full_state()).unwrap();
        assert_eq!(doc_b.snapshot(), doc_a.snapshot());
    }

    #[test]
    fn test_malformed_update_rejected_without_corruption() {
        let (doc, _) = doc_with_paragraph("intact");
        let before = doc.snapshot();
        let err = doc.apply_remote(&[0xFF, 0xFE, 0xFD, 0xFC]);
        assert!(err.is_err());
        assert_eq!(doc.snapshot(), before);
    }

    #[test]
    fn test_short_garbage_is_not_mistaken_for_empty_update() {
        let doc = BlockDocument::new();
        assert!(doc.apply_remote(&[0xFF]).is_err());
        assert!(doc.apply_remote(&[0xFF, 0xFE]).is_err());
        // The canonical empty update and no bytes at all merge cleanly.
        assert!(doc.apply_remote(&[0, 0]).is_ok());
        assert!(doc.apply_remote(&[]).is_ok());
    }

    #[test]
    fn test_diff_only_contains_missing_changes() {
        let (doc_a, _) = doc_with_paragraph("shared");
        let doc_b = BlockDocument::new();
        doc_b.apply_remote(&doc_a.full_state()).unwrap();

        doc_a.apply(&BlockOp::InsertBlock {
            index: 1,
            block: Block::paragraph("new"),
        });
        let diff = doc_a.diff(&doc_b.state_vector()).unwrap();
        doc_b.apply_remote(&diff).unwrap();
        assert_eq!(doc_b.snapshot(), doc_a.snapshot());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (doc_a, _) = doc_with_paragraph("once");
        let doc_b = BlockDocument::new();
        let state = doc_a.full_state();
        doc_b.apply_remote(&state).unwrap();
        doc_b.apply_remote(&state).unwrap();
        assert_eq!(doc_b.block_count(), 1);
    }
}
