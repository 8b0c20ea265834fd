//! JSON Web Keys.
//!
//! Only the members this service produces or consumes are modelled. Token
//! signing itself belongs to the JWT layer above; this module only moves
//! key material in and out of its JWK form.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::key::KeyUsage;
use crate::types::KeyId;

pub const KTY_OKP: &str = "OKP";
pub const KTY_OCT: &str = "oct";
pub const CRV_ED25519: &str = "Ed25519";
pub const ALG_EDDSA: &str = "EdDSA";

/// A JSON Web Key (RFC 7517).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Public point (OKP keys).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// Private scalar (OKP keys).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,

    /// Symmetric key value (oct keys).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

impl Jwk {
    /// True if this JWK carries secret material.
    pub fn is_private(&self) -> bool {
        self.d.is_some() || self.k.is_some()
    }

    /// The public half of this key. Symmetric keys have none.
    pub fn to_public(&self) -> Option<Jwk> {
        if self.kty == KTY_OCT {
            return None;
        }
        Some(Jwk {
            d: None,
            k: None,
            ..self.clone()
        })
    }

    /// Decode an Ed25519 signing key from the private member.
    pub fn ed25519_signing_key(&self) -> Result<SigningKey> {
        self.expect_ed25519()?;
        let d = self
            .d
            .as_deref()
            .ok_or_else(|| CoreError::DecodingError("missing private member \"d\"".into()))?;
        Ok(SigningKey::from_bytes(&decode_32(d, "d")?))
    }

    /// Decode an Ed25519 verifying key from the public member.
    pub fn ed25519_verifying_key(&self) -> Result<VerifyingKey> {
        self.expect_ed25519()?;
        let x = self
            .x
            .as_deref()
            .ok_or_else(|| CoreError::DecodingError("missing public member \"x\"".into()))?;
        VerifyingKey::from_bytes(&decode_32(x, "x")?)
            .map_err(|e| CoreError::DecodingError(e.to_string()))
    }

    fn expect_ed25519(&self) -> Result<()> {
        if self.kty != KTY_OKP || self.crv.as_deref() != Some(CRV_ED25519) {
            return Err(CoreError::DecodingError(format!(
                "not an Ed25519 key: kty={} crv={:?}",
                self.kty, self.crv
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("kid", &self.kid)
            .field("use", &self.key_use)
            .field("alg", &self.alg)
            .field("x", &self.x)
            .field("d", &self.d.as_ref().map(|_| "<redacted>"))
            .field("k", &self.k.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Generate an Ed25519 key pair as (private JWK, public JWK).
pub fn generate_ed25519(kid: KeyId, usage: KeyUsage) -> (Jwk, Jwk) {
    let signing = SigningKey::generate(&mut OsRng);
    let verifying = signing.verifying_key();

    let public = Jwk {
        kty: KTY_OKP.to_string(),
        crv: Some(CRV_ED25519.to_string()),
        kid: Some(kid.to_string()),
        key_use: Some(usage.jwk_use().to_string()),
        alg: Some(ALG_EDDSA.to_string()),
        x: Some(URL_SAFE_NO_PAD.encode(verifying.to_bytes())),
        d: None,
        k: None,
    };

    let private = Jwk {
        d: Some(URL_SAFE_NO_PAD.encode(signing.to_bytes())),
        ..public.clone()
    };

    (private, public)
}

fn decode_32(value: &str, member: &str) -> Result<[u8; 32]> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| CoreError::DecodingError(format!("member {}: {}", member, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        CoreError::DecodingError(format!("member {}: expected 32 bytes, got {}", member, b.len()))
    })
}
