//! Shareable permalinks to saved UI state.
//!
//! A permalink is a short opaque handle (see [`kvs_crypto::HandleCodec`])
//! that encodes an entry id under a per-resource salt. The salt makes
//! handles unguessable across deployments; it is bootstrapped once and
//! shared by every worker (see [`kvs_dao::get_permalink_salt`]).
//!
//! Each [`PermalinkService`] serves one [`PermalinkKind`], validates state
//! against that kind's JSON Schema, and asks an injected
//! [`ObjectResolver`] whether the referenced dashboard, chart, datasource
//! or database may be shown.

pub mod error;
pub mod kind;
pub mod service;

pub use error::{PermalinkCause, PermalinkError, PermalinkResult};
pub use kind::PermalinkKind;
pub use service::{AllowAll, ObjectResolver, PermalinkService, PermalinkSettings};
