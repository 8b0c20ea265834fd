//! # Keyward Permissions
//!
//! Role-based permission resolution and the bearer-token gate.
//!
//! ## Overview
//!
//! Roles are declared in a [`PermissionsConfig`](keyward_core::PermissionsConfig):
//! each grants its own permissions and inherits those of other roles. The
//! hierarchy is resolved once at startup; a cycle refuses to start.
//!
//! Each inbound call names an operation and presents a bearer token. The
//! [`BearerAuthGate`] turns the token into claims through an
//! [`AuthenticateSource`], unions the permissions of the session's roles,
//! and admits the call only if every permission the operation requires is
//! present.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward_core::PermissionsConfig;
//! use keyward_perms::{AuthenticateSource, BearerAuthGate, OperationPermissions};
//!
//! async fn example(source: impl AuthenticateSource) {
//!     let gate = BearerAuthGate::new(
//!         source,
//!         &PermissionsConfig::default_hierarchy(),
//!         &OperationPermissions::new(),
//!     )
//!     .unwrap();
//!
//!     let ctx = gate.authorize("getPublicKey", "token").await.unwrap();
//!     let _user = ctx.require_user_id();
//! }
//! ```

pub mod context;
pub mod error;
pub mod gate;
pub mod resolver;

pub use context::AuthContext;
pub use error::{BoxError, PermsError, Result};
pub use gate::{AuthenticateSource, BearerAuthGate, OperationPermissions};
pub use resolver::{resolve, ResolvedPermissions};
