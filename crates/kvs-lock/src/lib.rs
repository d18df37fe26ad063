//! Distributed locks with a TTL.
//!
//! [`DistributedLock`] gives mutual exclusion across every worker that
//! shares the configured stores. Two substrates can serve a lock:
//!
//! - a [`FastStore`] ([`RedisFastStore`] in production, [`InMemoryFastStore`]
//!   in tests), used whenever it is configured and reachable;
//! - the key-value store's `lock` resource, used otherwise.
//!
//! The choice is made per call, so an outage of the fast store degrades to
//! the key-value store and recovers by itself. Every lock expires after its
//! TTL, so a crashed holder never blocks others for longer than that.

mod backend;
pub mod error;
pub mod fast;
pub mod lock;
pub mod redis_store;

pub use error::{FastStoreError, LockError, LockResult};
pub use fast::{FastStore, InMemoryFastStore};
pub use lock::{DistributedLock, LockGuard, LockSettings, DEFAULT_LOCK_TTL, MAX_LOCK_TTL};
pub use redis_store::RedisFastStore;
