//! Transactional persistence for key-value entries.
//!
//! This crate owns the row shape of the store and the two uniqueness
//! guarantees everything else relies on: `(resource, id)` and
//! `(resource, uuid)` are each unique. An index on `(resource, expires_on)`
//! backs expiry sweeps.
//!
//! # Storage Backends
//!
//! All backends implement the [`KvBackend`] trait, whose transactions
//! implement [`KvTransaction`]:
//!
//! - [`InMemoryKvStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`SqliteKvStore`] -- durable store backed by SQLite
//!
//! # Design Rules
//!
//! 1. Every mutation happens inside a transaction; [`transaction`] commits on
//!    `Ok` and rolls back on `Err` (or on panic, via drop).
//! 2. Reads inside a transaction observe that transaction's writes.
//! 3. The store never interprets `value` -- it is opaque bytes.
//! 4. Transactions return raw rows, expired ones included; deciding that an
//!    expired row is logically absent is the caller's job.
//! 5. Ids are never reused, even after the row holding the highest id is
//!    deleted.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryKvStore;
pub use sqlite::{SqliteConfig, SqliteKvStore};
pub use traits::{transaction, KvBackend, KvTransaction, NewEntry};
