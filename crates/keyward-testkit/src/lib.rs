//! # Keyward Testkit
//!
//! Testing utilities for Keyward.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an envelope and memory store ready for use, plus a
//!   scripted [`AuthenticateSource`](keyward_perms::AuthenticateSource)
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use keyward_perms::resolve;
//! use keyward_testkit::generators::hierarchy;
//!
//! proptest! {
//!     #[test]
//!     fn acyclic_hierarchies_resolve(params in hierarchy(10)) {
//!         prop_assert!(resolve(&params.to_config()).is_ok());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use keyward_core::Role;
//! use keyward_testkit::fixtures::{user_claims, ScriptedSource, TestFixture};
//!
//! let fixture = TestFixture::new();
//! let source = ScriptedSource::new().with_token("admin-token", user_claims([Role::admin()]));
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{user_claims, ScriptedSource, TestFixture};
pub use generators::{hierarchy, HierarchyParams};
