//! # Keyward Core
//!
//! Pure data model for the Keyward trust layer: signing keys, one-time short
//! codes, session roles, and the master-key envelope.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Envelope`] - Seals payloads under the server-wide [`MasterKey`]
//! - [`Key`] - A stored signing key, see [`consume_key`]
//! - [`ShortCode`] - A one-time access grant scoped to a target and usage
//! - [`PermissionsConfig`] - Role hierarchy, resolved by `keyward-perms`
//! - [`AccessTokenClaims`] - What an authenticated session carries

pub mod claims;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod jwk;
pub mod key;
pub mod role;
pub mod short_code;
pub mod types;

pub use claims::AccessTokenClaims;
pub use crypto::{MasterKey, MASTER_KEY_ENV};
pub use envelope::{decrypt, encrypt, Envelope};
pub use error::{CoreError, Result};
pub use jwk::{generate_ed25519, Jwk};
pub use key::{
    consume_key, encode_private_material, encode_public_material, Key, KeyUsage, MAX_BATCH_SIZE,
};
pub use role::{
    CredentialsRole, Permission, PermissionsConfig, Role, RoleConfig, RolePermissions,
};
pub use short_code::{DeleteComment, ShortCode, ShortCodeUsage};
pub use types::{from_millis, to_millis, KeyId, ShortCodeId};
