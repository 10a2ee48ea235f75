//! Core type definitions for the keel entity core.
//!
//! This crate defines the types shared by the coordinator and its
//! collaborators:
//! - Entity identifiers (random, RFC 4122 version 4 layout)
//! - The entity snapshot (`Base`) and its mapper rules
//! - Patch operations delegated to the runtime
//! - The canonical snapshot codec
//!
//! Property and config payloads are opaque JSON objects; their structure is
//! owned by the runtime and its plugins, not by this crate.

mod base;
mod codec;
mod ids;

pub use base::{Base, Mapper, PatchData, PatchOperator};
pub use codec::{decode_base, encode_base};
pub use ids::EntityId;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("encoding error: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("decoding error: {0}")]
    Decoding(#[source] serde_json::Error),

    #[error("snapshot is empty")]
    EmptySnapshot,

    #[error("identifier generation failed: {0}")]
    IdentifierGeneration(#[from] rand::Error),
}
