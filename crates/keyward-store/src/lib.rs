//! # Keyward Store
//!
//! Persistence for the Keyward trust layer: the key registry and the
//! short-code broker, behind async traits with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`KeyStore`] - Insert, search, select and soft-delete signing keys
//! - [`ShortCodeStore`] - Insert, select and consume one-time short codes
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward_store::{KeyStore, SqliteStore};
//! use keyward_core::KeyUsage;
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("keyward.db").unwrap();
//!
//!     // Newest key first, never more than MAX_BATCH_SIZE
//!     let keys = store.search_keys(KeyUsage::Auth).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Two kinds of deletion**: deleting a key is a repeatable annotation;
//!   deleting a short code is a one-time consumption that fails once the
//!   code is no longer active.
//! - **One active code per slot**: enforced by the insert transaction and,
//!   in SQLite, by a partial unique index.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertKey, InsertShortCode, KeyStore, ShortCodeStore, Store};
