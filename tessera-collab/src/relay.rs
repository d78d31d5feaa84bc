//! Authoritative sync relay with per-session rooms.
//!
//! Architecture:
//! ```text
//! Client A ──poll──┐
//!                  ├── SessionRoom (SessionKey) ── BlockDocument
//! Client B ──poll──┘         │
//!                            ├── per-client ack cursors
//!                            └── presence slots (last_seen)
//! ```
//!
//! The relay is transport-agnostic: [`SyncRelay::handle`] takes a
//! decoded request and [`SyncRelay::handle_bytes`] the raw wire form,
//! so the same state machine backs the in-process transport used by
//! tests and an HTTP route in a real deployment.
//!
//! Each room holds the authoritative document. A poll integrates the
//! client's queued updates (skipping any sequence already integrated,
//! so retransmits after a lost response stay idempotent), refreshes the
//! client's presence slot, and answers with the diff against the
//! client's state vector plus everyone else's presence.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tessera_core::BlockDocument;
use uuid::Uuid;

use crate::protocol::{
    PeerPresence, PollRequest, PollResponse, PresencePayload, ProtocolError, SessionKey,
};

/// Relay tunables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Clients unseen for this long are dropped from presence.
    pub client_expiry: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            client_expiry: Duration::from_secs(60),
        }
    }
}

/// Relay-wide counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    pub total_polls: u64,
    pub total_updates: u64,
    pub rejected_updates: u64,
}

struct ClientSlot {
    presence: Option<PresencePayload>,
    last_seen: Instant,
    /// Highest client sequence integrated into the room document.
    acked: u64,
}

struct SessionRoom {
    doc: BlockDocument,
    clients: HashMap<Uuid, ClientSlot>,
}

impl SessionRoom {
    fn new() -> Self {
        Self {
            doc: BlockDocument::new(),
            clients: HashMap::new(),
        }
    }
}

/// The relay: all rooms behind one lock.
pub struct SyncRelay {
    config: RelayConfig,
    rooms: Mutex<HashMap<SessionKey, SessionRoom>>,
    stats: Mutex<RelayStats>,
}

impl Default for SyncRelay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl SyncRelay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            rooms: Mutex::new(HashMap::new()),
            stats: Mutex::new(RelayStats::default()),
        }
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<SessionKey, SessionRoom>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_mut(&self) -> MutexGuard<'_, RelayStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve one poll from its wire form. This is the shape an HTTP
    /// route mounts directly: body in, body out.
    pub fn handle_bytes(&self, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let req = PollRequest::decode(body)?;
        self.handle(&req)?.encode()
    }

    /// Serve one poll.
    pub fn handle(&self, req: &PollRequest) -> Result<PollResponse, ProtocolError> {
        if !req.session.is_valid() {
            return Err(ProtocolError::UnknownSession(req.session.to_string()));
        }

        let mut rooms = self.rooms();
        let room = rooms
            .entry(req.session.clone())
            .or_insert_with(SessionRoom::new);
        let now = Instant::now();

        let slot = room.clients.entry(req.client_id).or_insert(ClientSlot {
            presence: None,
            last_seen: now,
            acked: 0,
        });
        slot.last_seen = now;
        if req.presence.is_some() {
            slot.presence = req.presence.clone();
        }
        let mut acked = slot.acked;

        let mut integrated = 0u64;
        let mut rejected = 0u64;
        for update in &req.updates {
            if update.seq <= acked {
                // Retransmit of an already-integrated update.
                continue;
            }
            match room.doc.apply_remote(&update.bytes) {
                Ok(()) => integrated += 1,
                Err(e) => {
                    // Ack anyway so a poison update can't wedge the
                    // client's queue forever.
                    rejected += 1;
                    log::warn!(
                        "[relay {}] rejecting update seq={} from {}: {e}",
                        req.session,
                        update.seq,
                        req.client_id
                    );
                }
            }
            acked = update.seq;
        }
        if let Some(slot) = room.clients.get_mut(&req.client_id) {
            slot.acked = acked;
        }

        let expiry = self.config.client_expiry;
        room.clients.retain(|id, slot| {
            let live = now.duration_since(slot.last_seen) <= expiry;
            if !live {
                log::debug!("[relay {}] expiring client {id}", req.session);
            }
            live
        });

        let update = room.doc.diff(&req.state_vector).map_err(|e| {
            ProtocolError::Deserialization(format!("bad state vector: {e}"))
        })?;

        let peers = room
            .clients
            .iter()
            .filter(|(id, _)| **id != req.client_id)
            .filter_map(|(id, slot)| {
                let presence = slot.presence.as_ref()?;
                Some(PeerPresence {
                    client_id: *id,
                    info: presence.info.clone(),
                    selection: presence.selection,
                    idle_ms: now.duration_since(slot.last_seen).as_millis() as u64,
                })
            })
            .collect();

        {
            let mut stats = self.stats_mut();
            stats.total_polls += 1;
            stats.total_updates += integrated;
            stats.rejected_updates += rejected;
        }

        let mut resp = PollResponse::new(acked, update, room.doc.state_vector());
        resp.peers = peers;
        Ok(resp)
    }

    pub fn session_count(&self) -> usize {
        self.rooms().len()
    }

    pub fn client_count(&self, key: &SessionKey) -> usize {
        self.rooms().get(key).map_or(0, |r| r.clients.len())
    }

    pub fn stats(&self) -> RelayStats {
        *self.stats_mut()
    }
}
