//! Salted SHA-1 hashes in the `{SHA}` htpasswd format.
//!
//! The stored value is `{SHA}` followed by the standard base64 encoding of
//! `SHA1(password || salt) || salt`. Unsalted `{SHA}` entries written by
//! Apache htpasswd (a bare 20 byte digest) verify as well.
//!
//! A single SHA-1 round is trivially brute-forced. Only use this for
//! consumers that cannot read anything else.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use constant_time_eq::constant_time_eq;
use sha1::{Digest, Sha1};

/// Prefix of every `{SHA}` hash.
pub const PREFIX: &str = "{SHA}";

/// Salt length in bytes.
pub const SALT_BYTES: usize = 8;

const DIGEST_LEN: usize = 20;

fn digest(password: &str, salt: &[u8]) -> [u8; DIGEST_LEN] {
    Sha1::new()
        .chain_update(password.as_bytes())
        .chain_update(salt)
        .finalize()
        .into()
}

/// Hashes `password` with `salt`, returning the encoding without the
/// `{SHA}` prefix.
pub fn hash(password: &str, salt: &[u8]) -> String {
    let mut raw = Vec::with_capacity(DIGEST_LEN + salt.len());
    raw.extend_from_slice(&digest(password, salt));
    raw.extend_from_slice(salt);
    STANDARD.encode(raw)
}

/// Checks `password` against a `{SHA}`-prefixed value.
///
/// Returns `None` when the value is not valid base64 or too short to hold
/// a digest.
pub fn verify(password: &str, encoded: &str) -> Option<bool> {
    let body = encoded.strip_prefix(PREFIX)?;
    let raw = STANDARD.decode(body.trim()).ok()?;
    if raw.len() < DIGEST_LEN {
        return None;
    }
    let (expected, salt) = raw.split_at(DIGEST_LEN);
    Some(constant_time_eq(&digest(password, salt), expected))
}
