//! Relay event definitions
//!
//! Events travel over a persistent WebSocket as JSON (text frames) or
//! bincode (binary frames). The relay forwards envelopes and key material
//! verbatim; it never holds plaintext or keys.

use serde::{Deserialize, Serialize};

use crate::{ConnectionId, SessionId};

/// Which slot a party occupies in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// First party in the session; receives the shareable link
    Initiator,
    /// Second party, arriving via the link
    Joiner,
}

/// One encrypted message as it crosses the wire.
///
/// Single-use: a nonce never recurs under the same derived key. The relay
/// treats all three fields as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

/// Events a party sends to the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Open a fresh session and become its first participant
    CreateSession,
    /// Join an existing session by token. Carried as a plain string so a
    /// malformed token is answered with a structured error instead of
    /// failing the whole frame.
    JoinSession { session_id: String },
    /// Public key material for the other participant
    PublicKey { public_key: Vec<u8> },
    /// Encrypted message for the other participant
    Envelope { envelope: EncryptedEnvelope },
    /// Typing indicator, forwarded without ack
    Typing { is_typing: bool },
}

/// Events the relay sends to a party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Response to `CreateSession`
    SessionCreated {
        session_id: SessionId,
        shareable_link: String,
    },
    /// Response to a successful `JoinSession`. The link is present exactly
    /// when the admitted party is alone in the session.
    SessionJoined {
        role: Role,
        shareable_link: Option<String>,
    },
    /// The other party arrived. Also the cue to (re-)send local key
    /// material so a late joiner completes the exchange.
    PeerJoined { peer_id: ConnectionId },
    /// The other party left
    PeerLeft { peer_id: ConnectionId },
    /// Forwarded public key material
    PublicKey { public_key: Vec<u8> },
    /// Forwarded envelope with a relay-side receive timestamp. The
    /// timestamp is for display only and plays no part in verification.
    Envelope {
        envelope: EncryptedEnvelope,
        relay_timestamp_ms: u64,
    },
    /// Forwarded typing indicator
    Typing { is_typing: bool },
    /// Structured, non-fatal error
    Error { message: String },
}

impl ClientEvent {
    /// Serialize to bytes for a binary frame
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from a binary frame
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerEvent {
    /// Serialize to bytes for a binary frame
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from a binary frame
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
