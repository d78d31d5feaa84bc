//! Binary poll protocol for CRDT synchronization and presence.
//!
//! One request/response pair per poll tick (bincode-encoded):
//! ```text
//! PollRequest                          PollResponse
//! ┌─────────────────────────┐          ┌─────────────────────────┐
//! │ version        1 byte   │          │ version        1 byte   │
//! │ session        key      │  ──►     │ ack            8 bytes  │
//! │ client_id      16 bytes │          │ update         variable │
//! │ state_vector   variable │  ◄──     │ server_sv      variable │
//! │ updates        variable │          │ peers          variable │
//! │ presence       variable │          └─────────────────────────┘
//! └─────────────────────────┘
//! ```
//!
//! The client piggybacks its queued updates and presence heartbeat on
//! every request; the server answers with the diff against the client's
//! state vector plus the presence of every *other* client in the
//! session. There is no push channel: the poll cadence bounds staleness.

use serde::{Deserialize, Serialize};
use tessera_core::SelectionCursor;
use uuid::Uuid;

/// Bumped on every incompatible wire change. Mismatched versions are
/// rejected before any payload is interpreted.
pub const PROTOCOL_VERSION: u8 = 1;

/// Identifies one collaborative session: a synced object of some type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Object type, e.g. "post", "template".
    pub object_type: String,
    /// Object identifier within its type, e.g. a post id.
    pub object_id: String,
}

impl SessionKey {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }

    /// A key with an empty object id names nothing and can't be synced.
    pub fn is_valid(&self) -> bool {
        !self.object_type.is_empty() && !self.object_id.is_empty()
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.object_type, self.object_id)
    }
}

/// Display metadata for a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorInfo {
    pub name: String,
    /// Avatar URLs in ascending resolution order.
    pub avatar_urls: Vec<String>,
    /// CSS color string for cursor/selection rendering.
    pub color: String,
}

impl CollaboratorInfo {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let color = color_for(&name);
        Self {
            name,
            avatar_urls: Vec::new(),
            color,
        }
    }
}

/// Stable color from the collaborator name, so the same person renders
/// the same across sessions without any server coordination.
fn color_for(name: &str) -> String {
    const PALETTE: [&str; 8] = [
        "#e05252", "#e0a152", "#c3e052", "#52e07e", "#52d8e0", "#527de0", "#8952e0", "#e052c3",
    ];
    let mut hash = 0u64;
    for b in name.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(b as u64);
    }
    PALETTE[(hash % PALETTE.len() as u64) as usize].to_string()
}

/// The requesting client's own presence heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub info: CollaboratorInfo,
    pub selection: Option<SelectionCursor>,
}

/// One other client's presence as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerPresence {
    pub client_id: Uuid,
    pub info: CollaboratorInfo,
    pub selection: Option<SelectionCursor>,
    /// Milliseconds since this peer's last poll, from the server clock.
    pub idle_ms: u64,
}

/// A queued local update, tagged with its client-local sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub seq: u64,
    pub bytes: Vec<u8>,
}

/// One poll tick, client → server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    pub version: u8,
    pub session: SessionKey,
    pub client_id: Uuid,
    /// Client's Yrs state vector (v1).
    pub state_vector: Vec<u8>,
    /// Queued local updates not yet acked, in sequence order.
    pub updates: Vec<PendingUpdate>,
    pub presence: Option<PresencePayload>,
}

impl PollRequest {
    pub fn new(session: SessionKey, client_id: Uuid, state_vector: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            session,
            client_id,
            state_vector,
            updates: Vec::new(),
            presence: None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (req, _): (Self, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        if req.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch(req.version));
        }
        Ok(req)
    }
}

/// One poll tick, server → client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub version: u8,
    /// Highest client sequence the server has integrated.
    pub ack: u64,
    /// Diff against the client's state vector (v1). May be the canonical
    /// empty update when the client is current.
    pub update: Vec<u8>,
    /// Server's state vector after integrating this request.
    pub server_state_vector: Vec<u8>,
    /// Every other client currently in the session.
    pub peers: Vec<PeerPresence>,
}

impl PollResponse {
    pub fn new(ack: u64, update: Vec<u8>, server_state_vector: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            ack,
            update,
            server_state_vector,
            peers: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (resp, _): (Self, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        if resp.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch(resp.version));
        }
        Ok(resp)
    }
}

/// Protocol and transport errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
    VersionMismatch(u8),
    /// The HTTP exchange itself failed (connect, timeout, non-2xx).
    Transport(String),
    /// The server rejected the session key.
    UnknownSession(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Deserialization(e) => write!(f, "Deserialization error: {e}"),
            Self::VersionMismatch(v) => write!(f, "Unsupported protocol version {v}"),
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::UnknownSession(k) => write!(f, "Unknown session: {k}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let mut req = PollRequest::new(
            SessionKey::new("post", "42"),
            Uuid::new_v4(),
            vec![0, 1, 2],
        );
        req.updates.push(PendingUpdate {
            seq: 8,
            bytes: vec![9, 9, 9],
        });
        req.presence = Some(PresencePayload {
            info: CollaboratorInfo::new("Alice"),
            selection: None,
        });

        let decoded = PollRequest::decode(&req.encode().unwrap()).unwrap();
        assert_eq!(decoded.session, req.session);
        assert_eq!(decoded.client_id, req.client_id);
        assert_eq!(decoded.state_vector, req.state_vector);
        assert_eq!(decoded.updates, req.updates);
        assert_eq!(decoded.presence, req.presence);
    }

    #[test]
    fn test_response_roundtrip() {
        let mut resp = PollResponse::new(3, vec![1, 2], vec![3, 4]);
        resp.peers.push(PeerPresence {
            client_id: Uuid::new_v4(),
            info: CollaboratorInfo::new("Bob"),
            selection: None,
            idle_ms: 120,
        });

        let decoded = PollResponse::decode(&resp.encode().unwrap()).unwrap();
        assert_eq!(decoded.ack, 3);
        assert_eq!(decoded.update, vec![1, 2]);
        assert_eq!(decoded.peers, resp.peers);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut resp = PollResponse::new(0, Vec::new(), Vec::new());
        resp.version = 99;
        let bytes = bincode::serde::encode_to_vec(&resp, bincode::config::standard()).unwrap();
        assert!(matches!(
            PollResponse::decode(&bytes),
            Err(ProtocolError::VersionMismatch(99))
        ));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(PollRequest::decode(&[0xFF, 0xFE, 0xFD]).is_err());
    }

    #[test]
    fn test_session_key_validity() {
        assert!(SessionKey::new("post", "42").is_valid());
        assert!(!SessionKey::new("post", "").is_valid());
        assert!(!SessionKey::new("", "42").is_valid());
    }

    #[test]
    fn test_stable_color() {
        let a = CollaboratorInfo::new("Alice");
        let b = CollaboratorInfo::new("Alice");
        assert_eq!(a.color, b.color);
        assert!(a.color.starts_with('#'));
    }
}
