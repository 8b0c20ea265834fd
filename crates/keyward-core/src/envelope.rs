//! Master-key envelope encryption.
//!
//! A payload is serialized to JSON, sealed with a fresh nonce, and laid out
//! as `nonce || sealed_box`. The envelope holds the master key; build one at
//! startup and share it by reference.

use serde::{de::DeserializeOwned, Serialize};

use crate::crypto::{EnvelopeNonce, MasterKey, NONCE_LEN};
use crate::error::{CoreError, Result};

/// Encrypts and decrypts payloads under the server-wide master key.
#[derive(Debug, Clone)]
pub struct Envelope {
    secret: MasterKey,
}

impl Envelope {
    /// Build an envelope around a master key.
    pub fn new(secret: MasterKey) -> Self {
        Self { secret }
    }

    /// Build an envelope from the `MASTER_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        MasterKey::from_env().map(Self::new)
    }

    /// The master key this envelope seals with.
    pub fn secret(&self) -> &MasterKey {
        &self.secret
    }

    /// Serialize and seal a payload.
    pub fn encrypt<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Vec<u8>> {
        let serialized =
            serde_json::to_vec(payload).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        self.encrypt_bytes(&serialized)
    }

    /// Open and deserialize a payload.
    ///
    /// Tampering or a different master key yields `InvalidSecret`; a payload
    /// that opens but does not parse yields `DecodingError`.
    pub fn decrypt<T: DeserializeOwned>(&self, ciphertext: &[u8]) -> Result<T> {
        let opened = self.decrypt_bytes(ciphertext)?;
        serde_json::from_slice(&opened).map_err(|e| CoreError::DecodingError(e.to_string()))
    }

    /// Seal raw bytes.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = EnvelopeNonce::generate();
        let sealed = self.secret.seal(plaintext, &nonce)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_bytes());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Open raw bytes.
    pub fn decrypt_bytes(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CoreError::MalformedCiphertext(ciphertext.len()));
        }

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        self.secret.open(sealed, &EnvelopeNonce::from_bytes(nonce))
    }
}

/// Seal `payload` under `secret`.
pub fn encrypt<T: Serialize + ?Sized>(secret: &MasterKey, payload: &T) -> Result<Vec<u8>> {
    Envelope::new(secret.clone()).encrypt(payload)
}

/// Open a ciphertext produced by [`encrypt`].
pub fn decrypt<T: DeserializeOwned>(secret: &MasterKey, ciphertext: &[u8]) -> Result<T> {
    Envelope::new(secret.clone()).decrypt(ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        value: u64,
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let envelope = Envelope::new(MasterKey::generate());
        let payload = Payload {
            name: "signing key".into(),
            value: 42,
        };

        let ciphertext = envelope.encrypt(&payload).unwrap();
        let recovered: Payload = envelope.decrypt(&ciphertext).unwrap();

        assert_eq!(recovered, payload);
    }

    #[test]
    fn test_layout_is_nonce_then_box() {
        let envelope = Envelope::new(MasterKey::generate());
        let ciphertext = envelope.encrypt_bytes(b"abc").unwrap();

        // 24-byte nonce, 3 bytes of ciphertext, 16-byte tag
        assert_eq!(ciphertext.len(), NONCE_LEN + 3 + 16);
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let envelope = Envelope::new(MasterKey::generate());
        let a = envelope.encrypt_bytes(b"same").unwrap();
        let b = envelope.encrypt_bytes(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_is_invalid_secret() {
        let sealed = Envelope::new(MasterKey::generate())
            .encrypt(&"secret")
            .unwrap();

        let result: Result<String> = Envelope::new(MasterKey::generate()).decrypt(&sealed);
        assert!(matches!(result, Err(CoreError::InvalidSecret)));
    }

    #[test]
    fn test_tampered_ciphertext_is_invalid_secret() {
        let envelope = Envelope::new(MasterKey::generate());
        let mut sealed = envelope.encrypt(&"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        let result: Result<String> = envelope.decrypt(&sealed);
        assert!(matches!(result, Err(CoreError::InvalidSecret)));
    }

    #[test]
    fn test_malformed_payload_is_not_invalid_secret() {
        let envelope = Envelope::new(MasterKey::generate());
        let sealed = envelope.encrypt_bytes(b"not json").unwrap();

        let result: Result<Payload> = envelope.decrypt(&sealed);
        assert!(matches!(result, Err(CoreError::DecodingError(_))));
    }

    #[test]
    fn test_short_ciphertext() {
        let envelope = Envelope::new(MasterKey::generate());
        assert!(matches!(
            envelope.decrypt_bytes(&[0u8; 10]),
            Err(CoreError::MalformedCiphertext(10))
        ));
    }

    #[test]
    fn test_free_functions() {
        let secret = MasterKey::generate();
        let sealed = encrypt(&secret, &vec![1u32, 2, 3]).unwrap();
        let recovered: Vec<u32> = decrypt(&secret, &sealed).unwrap();
        assert_eq!(recovered, vec![1, 2, 3]);
    }

    proptest! {
        #[test]
        fn roundtrip_any_bytes(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let envelope = Envelope::new(MasterKey::from_bytes([7u8; 32]));
            let sealed = envelope.encrypt_bytes(&data).unwrap();
            prop_assert_eq!(envelope.decrypt_bytes(&sealed).unwrap(), data);
        }

        #[test]
        fn wrong_secret_always_rejected(data in "\\PC{0,64}", seed in 1u8..=255) {
            let sealed = Envelope::new(MasterKey::from_bytes([0u8; 32])).encrypt(&data).unwrap();
            let other = Envelope::new(MasterKey::from_bytes([seed; 32]));
            let result: Result<String> = other.decrypt(&sealed);
            prop_assert!(result.unwrap_err().is_invalid_secret());
        }
    }
}
