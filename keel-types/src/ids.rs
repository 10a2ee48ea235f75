//! Entity identifiers.
//!
//! Identifiers are opaque strings. Callers may supply their own (for example
//! `dev-1`); when none is supplied the coordinator generates a random one
//! formatted as `8-4-4-4-12` lowercase hex groups.

use crate::Result;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of an entity. Immutable once persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wraps an existing identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier from the OS randomness source.
    ///
    /// Fails with [`crate::Error::IdentifierGeneration`] if the randomness
    /// source cannot be read; an empty identifier is never returned.
    pub fn generate() -> Result<Self> {
        Self::generate_with(&mut OsRng)
    }

    /// Generates an identifier from the given randomness source.
    pub fn generate_with<R: RngCore + ?Sized>(rng: &mut R) -> Result<Self> {
        let mut bytes = [0u8; 16];
        rng.try_fill_bytes(&mut bytes)?;
        // Sets version 4 and the RFC 4122 variant bits.
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Ok(Self(uuid.hyphenated().to_string()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether no identifier has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the identifier has the generated `8-4-4-4-12` layout with the
    /// random-version and standard-variant nibbles set.
    pub fn is_generated(&self) -> bool {
        match Uuid::try_parse(&self.0) {
            Ok(uuid) => {
                self.0.len() == 36
                    && uuid.get_version_num() == 4
                    && uuid.get_variant() == uuid::Variant::RFC4122
            }
            Err(_) => false,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
