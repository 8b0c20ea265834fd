//! # Keyward
//!
//! Trust infrastructure for an authentication service: envelope-encrypted
//! signing keys with rotation, one-time short codes, and role-based
//! authorization of bearer-token calls.
//!
//! ## Overview
//!
//! - **Keys**: Ed25519 JWKs, private halves sealed under the master key,
//!   rotated by age and kept until they expire so old tokens still verify
//! - **Short codes**: at most one active code per target and usage, stored
//!   as a keyed digest and consumable exactly once
//! - **Permissions**: roles inherit permissions transitively; a cyclic
//!   hierarchy refuses to start
//! - **Gate**: every required permission must be granted, or the call is
//!   rejected as unauthorized
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use keyward::{Keyward, KeywardConfig};
//! use keyward::core::{Envelope, KeyUsage, ShortCodeUsage};
//! use keyward::perms::AuthenticateSource;
//! use keyward::store::SqliteStore;
//!
//! async fn example(source: impl AuthenticateSource) -> keyward::Result<()> {
//!     keyward::telemetry::init();
//!
//!     let keyward = Keyward::new(
//!         KeywardConfig::from_file("keyward.json")?,
//!         Envelope::from_env()?,
//!         SqliteStore::open("keyward.db")?,
//!         source,
//!     )?;
//!
//!     keyward.rotator().rotate_all(Utc::now()).await;
//!     let _jwk = keyward.keyring().signing_key(KeyUsage::Auth).await?;
//!
//!     let issued = keyward
//!         .short_codes()
//!         .create(ShortCodeUsage::ValidateMail, "user@example.com", true, Utc::now())
//!         .await?;
//!     let _deliver_out_of_band = issued.plain_code;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `keyward::core` - Data model and the crypto envelope
//! - `keyward::store` - Key registry and short-code broker
//! - `keyward::perms` - Permission resolver and bearer-auth gate

pub mod config;
pub mod error;
pub mod keyring;
pub mod privilege;
pub mod rotation;
pub mod service;
pub mod short_codes;
pub mod telemetry;

// Re-export component crates
pub use keyward_core as core;
pub use keyward_perms as perms;
pub use keyward_store as store;

// Re-export main types for convenience
pub use config::{KeyUsageConfig, KeysConfig, KeywardConfig, ShortCodeUsageConfig, ShortCodesConfig};
pub use error::{ErrorKind, KeywardError, OperationContext, Result, RoleUpdateError};
pub use keyring::KeyRing;
pub use privilege::{check_role_update, RoleUpdate};
pub use rotation::{KeyRotator, RotationOutcome};
pub use service::Keyward;
pub use short_codes::{IssuedShortCode, ShortCodeService};
