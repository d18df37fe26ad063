//! Key-value data access for the resource store.
//!
//! [`KeyValueDao`] is the only way the rest of the workspace touches stored
//! entries. It encodes values with a caller-chosen [`Codec`](kvs_codec::Codec),
//! stamps audit fields from the acting user and an injectable clock, hides
//! expired entries, and classifies store failures into [`KvError`] kinds.
//!
//! [`get_permalink_salt`] bootstraps the per-resource salts shared by every
//! worker.

pub mod dao;
pub mod error;
pub mod shared;

pub use dao::{KeyValueDao, Scope};
pub use error::{KvError, KvResult};
pub use shared::{get_permalink_salt, salt_key, HashPolicy};
