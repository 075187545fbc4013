//! Shared Protocol Definitions for Sotto
//!
//! This crate contains the wire-level types exchanged between chat parties
//! and the relay: session tokens, connection ids, relay events and the
//! authenticated-encryption envelope.

mod error;
mod events;
mod session_id;

pub use error::*;
pub use events::*;
pub use session_id::*;

/// Nonce size used by envelopes (96 bits / 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;
