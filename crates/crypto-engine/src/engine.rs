//! Key exchange and envelope encryption with P-256 + PBKDF2 + AES-256-GCM

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use p256::PublicKey;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroizing;

use relay_protocol::EncryptedEnvelope;

use crate::{CryptoError, CryptoResult, DERIVED_KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Fixed application salt for key stretching. Both parties must use the same
/// value or their derived keys will not match.
const KDF_SALT: &[u8] = b"sotto-envelope-key-v1";

/// PBKDF2 iteration count. The raw ECDH output has structural bias and is
/// never used directly as a cipher key.
const KDF_ITERATIONS: u32 = 100_000;

/// Cryptographic state of one party for one session.
///
/// Holds at most one ephemeral key pair and one derived key. The private
/// half of the key pair never leaves this struct; the derived key is
/// computed independently by both parties and never transmitted.
pub struct CryptoEngine {
    secret: Option<EphemeralSecret>,
    cipher: Option<Aes256Gcm>,
}

impl CryptoEngine {
    pub fn new() -> Self {
        Self {
            secret: None,
            cipher: None,
        }
    }

    /// Generate a fresh ephemeral P-256 key pair, discarding any previous
    /// key material, and return the uncompressed SEC1 public point.
    pub fn generate_key_pair(&mut self) -> Vec<u8> {
        self.reset();
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
        self.secret = Some(secret);
        public
    }

    /// The public key of the current key pair, if one has been generated.
    ///
    /// A party re-sends this when a peer joins after the first exchange
    /// round already ran.
    pub fn public_key(&self) -> Option<Vec<u8>> {
        self.secret
            .as_ref()
            .map(|s| s.public_key().to_encoded_point(false).as_bytes().to_vec())
    }

    /// Complete the key exchange with the peer's public key.
    ///
    /// Validates that the bytes are a well-formed point on P-256, computes
    /// the ECDH shared value and stretches it through PBKDF2-HMAC-SHA256
    /// into the AES-256-GCM session key. Idempotent: deriving twice against
    /// the same peer key yields the same key.
    pub fn derive_shared_key(&mut self, peer_public: &[u8]) -> CryptoResult<()> {
        let secret = self.secret.as_ref().ok_or(CryptoError::NotReady)?;
        let peer = PublicKey::from_sec1_bytes(peer_public)
            .map_err(|_| CryptoError::InvalidPeerKey)?;

        let shared = secret.diffie_hellman(&peer);
        let mut key = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
        pbkdf2_hmac::<Sha256>(
            shared.raw_secret_bytes().as_slice(),
            KDF_SALT,
            KDF_ITERATIONS,
            &mut *key,
        );

        self.cipher = Some(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&*key)));
        Ok(())
    }

    /// Encrypt one message under the derived key.
    ///
    /// Every call draws a fresh random 96-bit nonce; a nonce is never
    /// reused under the same key.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<EncryptedEnvelope> {
        let cipher = self.cipher.as_ref().ok_or(CryptoError::NotReady)?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        let auth_tag = ciphertext.split_off(ciphertext.len() - TAG_SIZE);

        Ok(EncryptedEnvelope {
            ciphertext,
            nonce: nonce.to_vec(),
            auth_tag,
        })
    }

    /// Decrypt and verify one envelope.
    ///
    /// The tag is verified before any plaintext is released; a mismatch
    /// from tampering, a wrong key or transport corruption fails without
    /// partial output.
    pub fn decrypt(&self, envelope: &EncryptedEnvelope) -> CryptoResult<Vec<u8>> {
        let cipher = self.cipher.as_ref().ok_or(CryptoError::NotReady)?;

        if envelope.nonce.len() != NONCE_SIZE || envelope.auth_tag.len() != TAG_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }

        let mut buf = Vec::with_capacity(envelope.ciphertext.len() + TAG_SIZE);
        buf.extend_from_slice(&envelope.ciphertext);
        buf.extend_from_slice(&envelope.auth_tag);

        cipher
            .decrypt(Nonce::from_slice(&envelope.nonce), buf.as_slice())
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    /// True once `derive_shared_key` has succeeded.
    pub fn is_ready(&self) -> bool {
        self.cipher.is_some()
    }

    /// Discard all key material. Used when starting a new session.
    pub fn reset(&mut self) {
        self.secret = None;
        self.cipher = None;
    }
}

impl Default for CryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}
