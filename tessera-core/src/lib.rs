//! # tessera-core — block document model for Tessera
//!
//! The shared foundation of the collaborative block editor: a CRDT-backed
//! document made of an ordered list of blocks (paragraphs, headings, …)
//! plus document metadata, the typed operation set that mutates it, and
//! pure position mapping between block-relative cursors and absolute
//! linear indices.
//!
//! ```text
//! ┌──────────────┐   BlockOp    ┌───────────────┐
//! │ Editor / UI  │ ───────────► │ BlockDocument │
//! └──────────────┘              │ (Yrs Doc)     │
//!        ▲                      └──────┬────────┘
//!        │ DocumentSnapshot            │ v1 updates
//!        └──────────────────────◄──────┘
//! ```
//!
//! This crate has no I/O and no async: sync transports, sessions and
//! awareness live in `tessera-collab`.

pub mod block;
pub mod document;
pub mod op;
pub mod position;

pub use block::Block;
pub use document::{Applied, BlockDocument, DocError, DocumentSnapshot, OpOutcome};
pub use op::BlockOp;
pub use position::{absolute_index, cursor_at, SelectionCursor};
