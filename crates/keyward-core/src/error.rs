//! Error types for the Keyward core.

use thiserror::Error;

/// Core errors: envelope encryption, key material handling, and parsing of
/// closed-set identifiers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Authenticated decryption failed: the ciphertext was tampered with or
    /// sealed under a different master key.
    #[error("invalid secret")]
    InvalidSecret,

    /// The master key environment variable is not set.
    #[error("missing master key: {0} is not set")]
    MissingMasterKey(&'static str),

    /// The master key is set but is not 32 hex-encoded bytes.
    #[error("invalid master key: {0}")]
    InvalidMasterKey(String),

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    /// Ciphertext too short to carry a nonce.
    #[error("malformed ciphertext: {0} bytes")]
    MalformedCiphertext(usize),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    /// Stored key material could not be turned back into a JWK.
    ///
    /// Always wraps the underlying cause, so callers can tell storage
    /// corruption apart from a routine not-found.
    #[error("consume key: {0}")]
    ConsumeKey(#[source] Box<CoreError>),
}

impl CoreError {
    /// Wrap an error with the consume-key marker.
    pub fn consume_key(inner: CoreError) -> Self {
        CoreError::ConsumeKey(Box::new(inner))
    }

    /// True if this error, or the error it wraps, is an authentication
    /// failure of the envelope.
    pub fn is_invalid_secret(&self) -> bool {
        match self {
            CoreError::InvalidSecret => true,
            CoreError::ConsumeKey(inner) => inner.is_invalid_secret(),
            _ => false,
        }
    }

    /// True if this error carries the consume-key marker.
    pub fn is_consume_key(&self) -> bool {
        matches!(self, CoreError::ConsumeKey(_))
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_secret_seen_through_consume_key() {
        let err = CoreError::consume_key(CoreError::InvalidSecret);
        assert!(err.is_consume_key());
        assert!(err.is_invalid_secret());

        let err = CoreError::consume_key(CoreError::DecodingError("bad json".into()));
        assert!(err.is_consume_key());
        assert!(!err.is_invalid_secret());
    }
}
