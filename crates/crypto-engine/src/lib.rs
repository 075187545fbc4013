//! Crypto Engine - End-to-End Encryption for Sotto
//!
//! Provides P-256 ECDH key exchange with PBKDF2 key stretching and
//! AES-256-GCM authenticated encryption. One engine instance holds the key
//! material of one party for one session; the relay never links this crate.

mod engine;
mod error;

pub use engine::*;
pub use error::*;

/// Public key size: uncompressed SEC1 encoding of a P-256 point (65 bytes)
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Derived symmetric key size (256 bits / 32 bytes)
pub const DERIVED_KEY_SIZE: usize = 32;

/// Nonce size for AES-256-GCM (96 bits / 12 bytes)
pub const NONCE_SIZE: usize = relay_protocol::NONCE_SIZE;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = relay_protocol::TAG_SIZE;
