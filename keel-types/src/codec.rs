//! Canonical snapshot encoding.
//!
//! Snapshots are stored as JSON bytes. The only guarantee callers may rely on
//! is round-trip fidelity: `decode_base(&encode_base(b)?)? == b`.

use crate::{Base, Error, Result};

/// Encodes a snapshot into its canonical byte form.
pub fn encode_base(base: &Base) -> Result<Vec<u8>> {
    serde_json::to_vec(base).map_err(Error::Encoding)
}

/// Decodes a snapshot from its canonical byte form.
pub fn decode_base(bytes: &[u8]) -> Result<Base> {
    if bytes.is_empty() {
        return Err(Error::EmptySnapshot);
    }
    serde_json::from_slice(bytes).map_err(Error::Decoding)
}
