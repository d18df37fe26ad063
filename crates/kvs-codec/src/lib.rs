//! Value codecs for the key-value resource store.
//!
//! The store persists opaque bytes; callers pick a [`Codec`] per call to turn
//! typed values into those bytes and back. Round-trips must use the same
//! codec that wrote the value.
//!
//! - [`Codec::JsonLiteral`]: any JSON-serializable value
//! - [`Codec::SchemaJson`]: JSON validated against a [`JsonSchema`] on both
//!   encode and decode
//! - [`Codec::OpaqueBinary`]: `bincode`; not stable across versions, used for
//!   cache payloads only

pub mod codec;
pub mod error;
pub mod schema;

pub use codec::Codec;
pub use error::{CodecError, CodecResult};
pub use schema::JsonSchema;
