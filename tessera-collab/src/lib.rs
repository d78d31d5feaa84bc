//! # tessera-collab — real-time sync and presence for Tessera
//!
//! Collaborative editing over a polling transport:
//!
//! ```text
//! ┌─────────────┐ acquire ┌────────────────┐ spawn ┌────────────┐
//! │ Editor      │ ──────► │ CollabRegistry │ ────► │ PollDriver │
//! └─────┬───────┘         └────────────────┘       └─────┬──────┘
//!       │ CollabHandle                                   │ poll
//!       ▼                                                ▼
//! ┌─────────────────┐   PollRequest / PollResponse ┌───────────┐
//! │ DocumentSession │ ◄──────────────────────────► │ SyncRelay │
//! │  BlockDocument  │                              │ (or HTTP) │
//! │  UndoHistory    │        ┌─────────────────┐   └───────────┘
//! │  pending queue  │        │ PresenceTracker │
//! └─────────────────┘        └─────────────────┘
//! ```
//!
//! Edits apply to the local CRDT immediately and queue as encoded
//! updates; every poll tick retransmits the unacked queue, carries the
//! presence heartbeat, and brings back the server diff plus the peer
//! list. Undo is per user: each client replays inverses of its own ops
//! only, so undoing never rewinds anyone else's work.

pub mod awareness;
pub mod config;
pub mod handle;
pub mod manager;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod transport;
pub mod undo;

pub use awareness::{Collaborator, PresenceTracker};
pub use config::CollabConfig;
pub use handle::{CollabHandle, DebugData};
pub use manager::CollabRegistry;
pub use protocol::{
    CollaboratorInfo, PeerPresence, PendingUpdate, PollRequest, PollResponse, PresencePayload,
    ProtocolError, SessionKey, PROTOCOL_VERSION,
};
pub use relay::{RelayConfig, RelayStats, SyncRelay};
pub use session::DocumentSession;
pub use transport::{HttpTransport, LocalTransport, PollDriver, Transport, UPDATES_ROUTE};
