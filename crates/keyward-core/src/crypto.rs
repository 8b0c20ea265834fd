//! Cryptographic primitives for the Keyward core.
//!
//! Provides the server-wide master key and XChaCha20-Poly1305 authenticated
//! encryption with 24-byte random nonces.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use std::fmt;

use crate::error::{CoreError, Result};

/// Environment variable holding the hex-encoded master key.
pub const MASTER_KEY_ENV: &str = "MASTER_KEY";

/// Length of the master key in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Length of an envelope nonce in bytes.
pub const NONCE_LEN: usize = 24;

/// The 256-bit server-wide master key.
///
/// Loaded once at process start and passed by reference to whatever needs
/// it. There is no process-global copy.
#[derive(Clone)]
pub struct MasterKey([u8; MASTER_KEY_LEN]);

impl MasterKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a hex string. Must decode to exactly 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| CoreError::InvalidMasterKey(e.to_string()))?;
        let arr: [u8; MASTER_KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            CoreError::InvalidMasterKey(format!("expected {} bytes, got {}", MASTER_KEY_LEN, b.len()))
        })?;
        Ok(Self(arr))
    }

    /// Load from the `MASTER_KEY` environment variable.
    ///
    /// A missing or malformed key is fatal for the process.
    pub fn from_env() -> Result<Self> {
        match std::env::var(MASTER_KEY_ENV) {
            Ok(raw) if !raw.trim().is_empty() => Self::from_hex(&raw),
            _ => Err(CoreError::MissingMasterKey(MASTER_KEY_ENV)),
        }
    }

    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.0
    }

    /// Seal plaintext under this key with the given nonce.
    pub fn seal(&self, plaintext: &[u8], nonce: &EnvelopeNonce) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CoreError::EncryptionError(e.to_string()))?;

        cipher
            .encrypt(XNonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| CoreError::EncryptionError(e.to_string()))
    }

    /// Open a sealed box. Any authentication failure is `InvalidSecret`.
    pub fn open(&self, sealed: &[u8], nonce: &EnvelopeNonce) -> Result<Vec<u8>> {
        let cipher =
            XChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| CoreError::InvalidSecret)?;

        cipher
            .decrypt(XNonce::from_slice(&nonce.0), sealed)
            .map_err(|_| CoreError::InvalidSecret)
    }

    /// Derive a purpose-bound subkey.
    pub fn derive(&self, context: &str) -> [u8; 32] {
        blake3::derive_key(context, &self.0)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// A 192-bit nonce for XChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeNonce(pub [u8; NONCE_LEN]);

impl EnvelopeNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}
