//! Signing keys and their at-rest encoding.
//!
//! A [`Key`] row holds the private half as an envelope ciphertext encoded
//! base64-url without padding, and the public half (if any) as plaintext
//! JSON in the same encoding. Keys are never updated in place: rotation adds
//! rows, and deletion is an administrative annotation that may be repeated.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::envelope::Envelope;
use crate::error::{CoreError, Result};
use crate::jwk::Jwk;
use crate::types::KeyId;

/// Maximum number of keys returned by a key search.
pub const MAX_BATCH_SIZE: usize = 100;

/// Purpose a key is used for. Keys of different usages never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUsage {
    /// Signs access tokens.
    Auth,
    /// Signs refresh tokens.
    Refresh,
}

impl KeyUsage {
    /// All known usages, in rotation order.
    pub const ALL: [KeyUsage; 2] = [KeyUsage::Auth, KeyUsage::Refresh];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUsage::Auth => "auth",
            KeyUsage::Refresh => "refresh",
        }
    }

    /// The JWK `use` member for keys of this usage.
    pub fn jwk_use(&self) -> &'static str {
        "sig"
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyUsage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auth" => Ok(KeyUsage::Auth),
            "refresh" => Ok(KeyUsage::Refresh),
            other => Err(CoreError::UnknownVariant {
                kind: "key usage",
                value: other.to_string(),
            }),
        }
    }
}

/// A stored signing key (or symmetric key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub id: KeyId,

    /// Envelope ciphertext of the private JWK, base64-url without padding.
    pub private_material: String,

    /// Plaintext JSON of the public JWK, base64-url without padding.
    /// `None` for symmetric keys.
    pub public_material: Option<String>,

    pub usage: KeyUsage,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_comment: Option<String>,
}

impl Key {
    /// A key is active iff it has not expired. Deletion is checked separately.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Symmetric keys have no public material.
    pub fn is_symmetric(&self) -> bool {
        self.public_material.is_none()
    }

    /// Decode this key into a JWK. See [`consume_key`].
    pub fn consume(&self, envelope: &Envelope, want_private: bool) -> Result<Jwk> {
        consume_key(envelope, self, want_private)
    }
}

/// Turn a stored key back into a JWK.
///
/// The private material is used (and decrypted) when `want_private` is set
/// or when the key is symmetric; otherwise the public material is parsed as
/// plaintext JSON. Every failure carries the consume-key marker.
pub fn consume_key(envelope: &Envelope, key: &Key, want_private: bool) -> Result<Jwk> {
    let decoded = match (want_private, key.public_material.as_deref()) {
        (false, Some(public)) => {
            let bytes = decode_material(public).map_err(CoreError::consume_key)?;
            return serde_json::from_slice(&bytes)
                .map_err(|e| CoreError::consume_key(CoreError::DecodingError(e.to_string())));
        }
        _ => decode_material(&key.private_material).map_err(CoreError::consume_key)?,
    };

    envelope.decrypt(&decoded).map_err(CoreError::consume_key)
}

/// Encrypt a private JWK for storage.
pub fn encode_private_material(envelope: &Envelope, jwk: &Jwk) -> Result<String> {
    let sealed = envelope.encrypt(jwk)?;
    Ok(URL_SAFE_NO_PAD.encode(sealed))
}

/// Encode a public JWK for storage.
pub fn encode_public_material(jwk: &Jwk) -> Result<String> {
    let serialized = serde_json::to_vec(jwk).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(serialized))
}

fn decode_material(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CoreError::DecodingError(format!("base64: {}", e)))
}
