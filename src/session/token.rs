//! Session id issuance.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// Random bytes per id (256 bits).
const TOKEN_BYTES: usize = 32;

/// Encoded length of an id: 32 bytes in unpadded base64.
pub const TOKEN_LEN: usize = 43;

/// Generate a fresh URL-safe session id from the OS RNG.
#[must_use]
pub fn generate_id() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Whether `id` has the shape of an issued id.
///
/// Only a cheap filter for lookups; a well-formed id may still be unknown.
#[must_use]
pub fn is_well_formed(id: &str) -> bool {
    id.len() == TOKEN_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
