use crate::hash::{self, HashAlgorithm, hash_password, verify_password};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Separates the username from the hash on a line.
pub const FIELD_SEPARATOR: char = ':';

/// Separates records.
pub const LINE_SEPARATOR: char = '\n';

/// Largest htpasswd file we agree to parse. Anything bigger should be a
/// database.
pub const MAX_HTPASSWD_FILE_SIZE: usize = 8 * 1024 * 1024;

/// Errors produced while parsing or mutating a [`HashedPasswords`] store.
#[derive(Debug, Snafu)]
pub enum Error {
    /// Input is larger than [`MAX_HTPASSWD_FILE_SIZE`].
    #[snafu(display(
        "htpasswd data is {size} bytes, more than the {limit} byte limit; use a database instead"
    ))]
    TooLarge { size: usize, limit: usize },

    /// Input is not valid UTF-8.
    #[snafu(display("htpasswd data is not valid UTF-8"))]
    NotUtf8 { source: std::str::Utf8Error },

    /// A line does not split into exactly two fields.
    #[snafu(display(
        "Invalid line {line}: expected 2 parts separated by ':', found {parts}"
    ))]
    InvalidLine { line: usize, parts: usize },

    /// A record has nothing before the separator.
    #[snafu(display("Invalid line {line}: username is empty"))]
    EmptyUsername { line: usize },

    /// The same username appears on more than one line.
    #[snafu(display("Invalid htpasswd data: user '{username}' is defined more than once"))]
    DuplicateUser { username: String },

    /// Empty passwords are refused; remove the user instead.
    #[snafu(display("Password must not be empty; delete the user to revoke access"))]
    EmptyPassword,

    /// Username can't be represented in the file.
    #[snafu(display("Invalid username '{username}'"))]
    InvalidUsername { username: String },

    /// The user has no entry in the store.
    #[snafu(display("User '{username}' not found"))]
    UnknownUser { username: String },

    /// Hashing or verification failed.
    #[snafu(display("Failed to hash password"))]
    Hash { source: hash::Error },
}

/// In-memory view of an htpasswd file: username to stored hash.
///
/// Records are kept sorted by username, so [`to_bytes`](Self::to_bytes)
/// is stable across rewrites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashedPasswords {
    entries: BTreeMap<String, String>,
}

fn validate_username(username: &str) -> Result<(), Error> {
    ensure!(
        !username.is_empty()
            && username.trim() == username
            && !username.contains([FIELD_SEPARATOR, '\n', '\r']),
        InvalidUsernameSnafu { username }
    );
    Ok(())
}

impl HashedPasswords {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the contents of an htpasswd file.
    ///
    /// Blank lines are skipped. Every other line must be `username:hash`.
    /// Fails on the first malformed or duplicated record; nothing is
    /// returned in that case.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        ensure!(
            bytes.len() <= MAX_HTPASSWD_FILE_SIZE,
            TooLargeSnafu {
                size: bytes.len(),
                limit: MAX_HTPASSWD_FILE_SIZE,
            }
        );
        let text = std::str::from_utf8(bytes).context(NotUtf8Snafu)?;

        let mut entries = BTreeMap::new();
        for (idx, line) in text.split(LINE_SEPARATOR).enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let number = idx + 1;

            let parts: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
            let [username, hash] = parts[..] else {
                return InvalidLineSnafu {
                    line: number,
                    parts: parts.len(),
                }
                .fail();
            };
            ensure!(!username.is_empty(), EmptyUsernameSnafu { line: number });

            match entries.entry(username.to_string()) {
                btree_map::Entry::Occupied(_) => return DuplicateUserSnafu { username }.fail(),
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(hash.to_string());
                }
            }
        }

        Ok(Self { entries })
    }

    /// Serializes every record as `username:hash\n`, sorted by username.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for (username, hash) in &self.entries {
            out.push_str(username);
            out.push(FIELD_SEPARATOR);
            out.push_str(hash);
            out.push(LINE_SEPARATOR);
        }
        out.into_bytes()
    }

    /// Hashes `password` with `algorithm` and stores it for `username`,
    /// replacing any previous hash.
    pub fn set_password(
        &mut self,
        username: &str,
        password: &str,
        algorithm: HashAlgorithm,
    ) -> Result<(), Error> {
        ensure!(!password.is_empty(), EmptyPasswordSnafu);
        validate_username(username)?;

        let stored = hash_password(password, algorithm).context(HashSnafu)?;
        self.entries.insert(username.to_string(), stored);
        Ok(())
    }

    /// Removes `username` if present. Returns whether an entry was removed.
    pub fn delete_user(&mut self, username: &str) -> bool {
        self.entries.remove(username).is_some()
    }

    /// Checks `password` against the stored hash of `username`.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, Error> {
        let stored = self
            .entries
            .get(username)
            .context(UnknownUserSnafu { username })?;
        verify_password(password, stored).context(HashSnafu)
    }

    /// Whether `username` has an entry.
    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }

    /// Stored hash of `username`.
    pub fn get(&self, username: &str) -> Option<&str> {
        self.entries.get(username).map(String::as_str)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All usernames in sorted order.
    pub fn usernames(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// `(username, hash)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(u, h)| (u.as_str(), h.as_str()))
    }
}
