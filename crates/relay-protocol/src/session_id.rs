//! Session tokens and connection identifiers

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

/// Raw entropy behind a session token (256 bits)
pub const SESSION_ID_BYTES: usize = 32;

/// Rendered token length: 256 bits as unpadded URL-safe base64
pub const SESSION_ID_LEN: usize = 43;

/// Unguessable session token, rendered as a fixed-length URL-safe string.
///
/// A `SessionId` can only be obtained from [`SessionId::generate`] or by
/// parsing a string that has the exact token shape, so every id that reaches
/// the registry is already well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh token from 256 bits of OS randomness
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = ProtocolError;

    /// Accepts exactly the shape `generate` produces: 43 URL-safe base64
    /// characters decoding to 32 bytes. Anything else is rejected before the
    /// registry is ever consulted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SESSION_ID_LEN {
            return Err(ProtocolError::InvalidSessionId);
        }
        let decoded = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| ProtocolError::InvalidSessionId)?;
        if decoded.len() != SESSION_ID_BYTES {
            return Err(ProtocolError::InvalidSessionId);
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SessionId {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier the relay assigns to one WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build the link a lone session member hands to their peer.
///
/// This is the single place the link shape is defined; both the create and
/// join paths go through it.
pub fn shareable_link(origin: &str, id: &SessionId) -> String {
    format!("{}/chat/{}", origin.trim_end_matches('/'), id)
}
