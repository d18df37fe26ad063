//! Foundation types for the key-value resource store (KVS).
//!
//! This crate provides the identity, partitioning, and temporal types used
//! throughout the KVS. Every other `kvs-*` crate depends on `kvs-types`.
//!
//! # Key Types
//!
//! - [`Resource`]: Closed set of tags partitioning the store
//! - [`Key`]: Either an integer id or a UUID; every operation accepts one
//! - [`KeyValueEntry`]: One stored row, with audit fields and expiry
//! - [`UserId`]: The acting user recorded in audit fields
//! - [`Clock`]: Injectable wall clock ([`SystemClock`], [`ManualClock`])
//! - [`ErrorKind`]: Stable error taxonomy shared by every backend

pub mod clock;
pub mod entry;
pub mod error;
pub mod key;
pub mod resource;
pub mod user;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::KeyValueEntry;
pub use error::{ErrorKind, TypeError};
pub use key::Key;
pub use resource::Resource;
pub use user::UserId;
