#![warn(missing_docs)]

//! Management of Apache htpasswd credential files.
//!
//! The file is the only source of truth: each change re-reads it, applies a
//! single create or delete, and replaces it on disk. Supported hashes are
//! APR1-MD5 (the default), bcrypt and salted `{SHA}`.
//!
//! # Example
//!
//! ```no_run
//! use htadmin::{HashAlgorithm, HtpasswdFile};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = HtpasswdFile::new(".htpasswd");
//!
//! // Fails if alice is already there.
//! file.create_user("alice", "password123")?;
//!
//! // Explicit algorithm, overwriting whatever alice had.
//! file.set_password("alice", "password456", HashAlgorithm::Bcrypt)?;
//!
//! let passwords = file.load()?;
//! assert!(passwords.verify("alice", "password456")?);
//!
//! file.delete_user("alice")?;
//! # Ok(())
//! # }
//! ```

mod apr1_md5;
mod file;
mod hash;
mod password;
mod sha;
mod store;

pub use file::{Error as FileError, HtpasswdFile};
pub use hash::{BCRYPT_COST, Error as HashError, HashAlgorithm, hash_password, verify_password};
pub use password::{GENERATED_PASSWORD_LEN, generate_password};
pub use store::{
    Error as StoreError, FIELD_SEPARATOR, HashedPasswords, LINE_SEPARATOR,
    MAX_HTPASSWD_FILE_SIZE,
};
