//! Apache APR1-MD5 ("MD5-crypt") password hashing.
//!
//! Encoded form: `$apr1$<salt>$<digest>`, with an 8 character salt and a
//! 22 character digest, both drawn from the `./0-9A-Za-z` alphabet.
//!
//! The algorithm follows `apr_md5_encode()` from Apache apr-util, which is
//! itself the FreeBSD MD5 crypt with a different magic string:
//! <https://github.com/apache/apr-util/blob/master/crypto/apr_md5.c>
//!
//! MD5 is broken as a password hash. It is kept because it is the format
//! every htpasswd consumer understands.

use constant_time_eq::constant_time_eq;
use md5::{Digest, Md5};

/// The `to64()` alphabet shared by the crypt(3) family.
const ITOA64: &[u8; 64] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Prefix of every APR1-MD5 hash.
pub const PREFIX: &str = "$apr1$";

/// Salt length in characters.
pub const SALT_LEN: usize = 8;

/// Random bytes needed to fill a salt (6 bytes = 48 bits = 8 chars of 6 bits).
pub const SALT_BYTES: usize = 6;

const ROUNDS: u32 = 1000;

fn push_b64(out: &mut String, mut v: u32, n: usize) {
    for _ in 0..n {
        out.push(ITOA64[(v & 0x3f) as usize] as char);
        v >>= 6;
    }
}

/// Lays the 16 digest bytes out in the permuted order used by apr_md5.c.
fn encode_digest(d: &[u8]) -> String {
    let mut out = String::with_capacity(22);
    for (a, b, c) in [(0, 6, 12), (1, 7, 13), (2, 8, 14), (3, 9, 15), (4, 10, 5)] {
        let v = u32::from(d[a]) << 16 | u32::from(d[b]) << 8 | u32::from(d[c]);
        push_b64(&mut out, v, 4);
    }
    push_b64(&mut out, u32::from(d[11]), 2);
    out
}

/// Turns raw random bytes into a salt string.
pub fn encode_salt(bytes: &[u8; SALT_BYTES]) -> String {
    let mut salt = String::with_capacity(SALT_LEN);
    for chunk in bytes.chunks(3) {
        let v = u32::from(chunk[0]) | u32::from(chunk[1]) << 8 | u32::from(chunk[2]) << 16;
        push_b64(&mut salt, v, 4);
    }
    salt
}

/// Hashes `password` with the given salt. Salts longer than 8 characters
/// are truncated, as Apache does.
pub fn hash(password: &str, salt: &str) -> String {
    let pw = password.as_bytes();
    let salt = match salt.char_indices().nth(SALT_LEN) {
        Some((end, _)) => &salt[..end],
        None => salt,
    };

    let alternate = Md5::new()
        .chain_update(pw)
        .chain_update(salt)
        .chain_update(pw)
        .finalize();

    let mut ctx = Md5::new();
    ctx.update(pw);
    ctx.update(PREFIX);
    ctx.update(salt);

    let mut remaining = pw.len();
    while remaining > 0 {
        let n = remaining.min(alternate.len());
        ctx.update(&alternate[..n]);
        remaining -= n;
    }

    let mut bits = pw.len();
    while bits > 0 {
        if bits & 1 == 1 {
            ctx.update([0u8]);
        } else {
            ctx.update(&pw[..1]);
        }
        bits >>= 1;
    }

    let mut digest = ctx.finalize();

    for round in 0..ROUNDS {
        let mut ctx = Md5::new();
        if round & 1 == 1 {
            ctx.update(pw);
        } else {
            ctx.update(digest);
        }
        if round % 3 != 0 {
            ctx.update(salt);
        }
        if round % 7 != 0 {
            ctx.update(pw);
        }
        if round & 1 == 1 {
            ctx.update(digest);
        } else {
            ctx.update(pw);
        }
        digest = ctx.finalize();
    }

    format!("{PREFIX}{salt}${}", encode_digest(&digest))
}

/// Checks `password` against an encoded `$apr1$...` hash.
pub fn verify(password: &str, encoded: &str) -> bool {
    let Some(rest) = encoded.strip_prefix(PREFIX) else {
        return false;
    };
    let salt = rest.split('$').next().unwrap_or_default();
    let computed = hash(password, salt);
    constant_time_eq(computed.as_bytes(), encoded.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vectors from `openssl passwd -apr1 -salt <salt> <password>`.

    #[test]
    fn test_hash_hello() {
        assert_eq!(
            hash("hello", "xlWep/gn"),
            "$apr1$xlWep/gn$6UNiHq3WE714EKfeH2X5c."
        );
    }

    #[test]
    fn test_hash_password() {
        assert_eq!(
            hash("password", "lZL6V/ci"),
            "$apr1$lZL6V/ci$eIMz/iKDkbtys/uU7LEK00"
        );
    }

    #[test]
    fn test_verify_known_hash() {
        let encoded = "$apr1$WxrZ8P3I$XD2BykvOa82I1l5jCMtbW0";
        assert!(verify("testpass123", encoded));
        assert!(!verify("wrongpass", encoded));
    }

    #[test]
    fn test_verify_rejects_other_formats() {
        assert!(!verify("hello", "$1$xlWep/gn$6UNiHq3WE714EKfeH2X5c."));
        assert!(!verify("hello", "{SHA}qvTGHdzF6KLavt4PO0gs2a6pQ00="));
    }

    #[test]
    fn test_encode_salt() {
        let salt = encode_salt(&[0x00, 0x00, 0x00, 0xff, 0xff, 0xff]);
        assert_eq!(salt, "....zzzz");

        let salt = encode_salt(&[0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc]);
        assert_eq!(salt.len(), SALT_LEN);
        assert!(salt.bytes().all(|b| ITOA64.contains(&b)));
    }

    #[test]
    fn test_salt_truncation() {
        assert_eq!(hash("test", "abcdefgh12345678"), hash("test", "abcdefgh"));
    }
}
