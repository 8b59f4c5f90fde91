use crate::{apr1_md5, sha};
use snafu::{OptionExt, ResultExt, Snafu};
use std::str::FromStr;

/// bcrypt work factor for new hashes.
pub const BCRYPT_COST: u32 = 12;

const BCRYPT_PREFIX: &str = "$2";

/// Errors that can occur while hashing or verifying passwords.
#[derive(Debug, Snafu)]
pub enum Error {
    /// The system random source failed.
    #[snafu(display("Can't obtain random bytes for a salt: {message}"))]
    Random { message: String },

    /// bcrypt refused to hash or verify.
    #[snafu(display("bcrypt failure"))]
    Bcrypt { source: bcrypt::BcryptError },

    /// The stored hash is not in any recognized format.
    #[snafu(display("Invalid hash format: {reason}"))]
    InvalidHashFormat { reason: String },

    /// Unknown algorithm name.
    #[snafu(display("Unknown hash algorithm '{name}'"))]
    UnknownAlgorithm { name: String },
}

/// Password hashing schemes that can be written to an htpasswd file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// Apache MD5-crypt (`$apr1$`). The historical htpasswd default.
    Apr1Md5,
    /// bcrypt (`$2b$`).
    Bcrypt,
    /// Salted SHA-1 (`{SHA}`). Legacy consumers only.
    Sha,
}

impl HashAlgorithm {
    /// Algorithm used when the caller does not pick one.
    pub const DEFAULT: HashAlgorithm = HashAlgorithm::Apr1Md5;

    /// Prefix prepended to the provider output before it is stored.
    pub fn storage_prefix(self) -> &'static str {
        match self {
            HashAlgorithm::Apr1Md5 | HashAlgorithm::Bcrypt => "",
            HashAlgorithm::Sha => sha::PREFIX,
        }
    }

    /// Figures out which algorithm produced a stored hash.
    pub fn detect(stored: &str) -> Option<HashAlgorithm> {
        if stored.starts_with(apr1_md5::PREFIX) {
            Some(HashAlgorithm::Apr1Md5)
        } else if stored.starts_with(BCRYPT_PREFIX) {
            Some(HashAlgorithm::Bcrypt)
        } else if stored.starts_with(sha::PREFIX) {
            Some(HashAlgorithm::Sha)
        } else {
            None
        }
    }

    /// Hashes `password` with a fresh salt. The result does not include
    /// [`storage_prefix`](Self::storage_prefix).
    pub fn hash(self, password: &str) -> Result<String, Error> {
        match self {
            HashAlgorithm::Apr1Md5 => {
                let salt = random_bytes::<{ apr1_md5::SALT_BYTES }>()?;
                Ok(apr1_md5::hash(password, &apr1_md5::encode_salt(&salt)))
            }
            HashAlgorithm::Bcrypt => bcrypt::hash(password, BCRYPT_COST).context(BcryptSnafu),
            HashAlgorithm::Sha => {
                let salt = random_bytes::<{ sha::SALT_BYTES }>()?;
                Ok(sha::hash(password, &salt))
            }
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "apr1" | "md5" | "apr1-md5" => Ok(HashAlgorithm::Apr1Md5),
            "bcrypt" => Ok(HashAlgorithm::Bcrypt),
            "sha" | "sha1" => Ok(HashAlgorithm::Sha),
            _ => UnknownAlgorithmSnafu { name: s }.fail(),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Apr1Md5 => write!(f, "apr1"),
            HashAlgorithm::Bcrypt => write!(f, "bcrypt"),
            HashAlgorithm::Sha => write!(f, "sha"),
        }
    }
}

pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], Error> {
    let mut buf = [0u8; N];
    getrandom::fill(&mut buf).map_err(|e| {
        RandomSnafu {
            message: e.to_string(),
        }
        .build()
    })?;
    Ok(buf)
}

/// Hash a password, including the storage prefix, ready to be written to a
/// file.
pub fn hash_password(password: &str, algorithm: HashAlgorithm) -> Result<String, Error> {
    let hash = algorithm.hash(password)?;
    Ok(format!("{}{}", algorithm.storage_prefix(), hash))
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, Error> {
    let algorithm = HashAlgorithm::detect(stored).context(InvalidHashFormatSnafu {
        reason: "cannot determine hash algorithm",
    })?;

    match algorithm {
        HashAlgorithm::Apr1Md5 => Ok(apr1_md5::verify(password, stored)),
        // All bcrypt variants ($2a$, $2b$, $2y$) verify the same way.
        HashAlgorithm::Bcrypt => bcrypt::verify(password, stored).context(BcryptSnafu),
        HashAlgorithm::Sha => sha::verify(password, stored).context(InvalidHashFormatSnafu {
            reason: "malformed {SHA} value",
        }),
    }
}
