//! HTTP server for the key-value resource store.
//!
//! Exposes two surfaces over one [`kvs_sdk::Kvs`] deployment:
//!
//! - `/api/v1/kv/{resource}[/{key}]`: create, read, update and delete plain
//!   string values, with optional TTL and sliding expiration.
//! - `/api/v1/{dashboard|explore|sqllab}/permalink[/{key}]`: mint and
//!   resolve permalinks.
//!
//! Locks are in-process only and have no HTTP surface.

pub mod auth;
pub mod error;
pub mod handler;
pub mod kv;
pub mod router;
pub mod server;

pub use auth::{AnonymousAuth, AuthProvider, TrustedHeaderAuth};
pub use error::{ServerError, ServerResult};
pub use kv::{KvRequest, StoredValue};
pub use router::{build_router, AppState};
pub use server::KvsServer;
