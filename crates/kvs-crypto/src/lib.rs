//! Identity and namespace utilities for the key-value resource store.
//!
//! - [`namespace`] / [`derive`]: stable, name-based UUIDs. A namespace UUID
//!   is derived from a seed under a [`HashAlgorithm`]; entries inside it are
//!   derived from parameter mappings serialized canonically, so parameter
//!   order never changes the result.
//! - [`HandleCodec`]: reversible `id <-> short string` mapping under a
//!   per-resource salt (a hashids-style alphabet shuffle).
//! - [`generate_salt`] / [`fingerprint`]: salt generation and safe display.
//!
//! All hashing wraps established libraries; nothing here is custom
//! cryptography, and handles are obfuscation rather than encryption.

pub mod error;
pub mod handle;
pub mod namespace;
pub mod salt;

pub use error::{CryptoError, CryptoResult};
pub use handle::{HandleCodec, DEFAULT_ALPHABET, DEFAULT_MIN_LENGTH};
pub use namespace::{derive, derive_name, namespace, HashAlgorithm};
pub use salt::{fingerprint, generate_salt, SALT_BYTES};
