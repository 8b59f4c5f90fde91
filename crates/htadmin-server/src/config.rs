//! Admin credentials that guard the HTTP endpoints.
//!
//! The file is YAML with a single `users` mapping:
//!
//! ```yaml
//! users:
//!   admin: changeme
//!   deploy: "s3cret"
//! ```

use constant_time_eq::constant_time_eq;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use yaml_rust2::{Yaml, YamlLoader};

/// Errors raised while loading the admin credentials file.
#[derive(Debug, Snafu)]
pub enum Error {
    /// The file could not be read.
    #[snafu(display("Can't read admin credentials file '{}'", path.display()))]
    Read {
        source: std::io::Error,
        path: PathBuf,
    },

    /// The file is not valid YAML.
    #[snafu(display("Invalid YAML in admin credentials file '{}'", path.display()))]
    Yaml {
        source: yaml_rust2::ScanError,
        path: PathBuf,
    },

    /// The document has no top-level `users` mapping.
    #[snafu(display("Admin credentials file '{}' has no 'users' mapping", path.display()))]
    MissingUsers { path: PathBuf },

    /// Every entry was blank once trimmed.
    #[snafu(display("Admin credentials file '{}' has no usable users", path.display()))]
    NoUsers { path: PathBuf },
}

/// Static admin username to password mapping.
#[derive(Clone, Default)]
pub struct AdminCredentials {
    users: HashMap<String, String>,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.users.keys().collect();
        names.sort();
        f.debug_struct("AdminCredentials")
            .field("users", &names)
            .finish()
    }
}

fn scalar(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) | Yaml::Real(s) => Some(s.clone()),
        Yaml::Integer(i) => Some(i.to_string()),
        Yaml::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

impl AdminCredentials {
    /// Loads and validates the credentials file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).context(ReadSnafu { path })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, Error> {
        let docs = YamlLoader::load_from_str(contents).context(YamlSnafu { path })?;
        let users = docs
            .first()
            .and_then(|doc| doc["users"].as_hash())
            .context(MissingUsersSnafu { path })?;

        let mut credentials = Self::default();
        for (name, password) in users {
            let (Some(name), Some(password)) = (scalar(name), scalar(password)) else {
                continue;
            };
            credentials.insert(&name, &password);
        }
        ensure!(!credentials.is_empty(), NoUsersSnafu { path });
        Ok(credentials)
    }

    /// Adds an admin. Surrounding whitespace is dropped and entries with an
    /// empty name or password are ignored.
    pub fn insert(&mut self, name: &str, password: &str) {
        let (name, password) = (name.trim(), password.trim());
        if !name.is_empty() && !password.is_empty() {
            self.users.insert(name.to_string(), password.to_string());
        }
    }

    /// Number of admins.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no admin is configured.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Whether `name`/`password` match a configured admin.
    pub fn check(&self, name: &str, password: &str) -> bool {
        self.users
            .get(name)
            .is_some_and(|expected| constant_time_eq(expected.as_bytes(), password.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(s: &str) -> Result<AdminCredentials, Error> {
        AdminCredentials::parse(s, Path::new("creds.yaml"))
    }

    #[test]
    fn test_parse_users() {
        let creds = parse("users:\n  admin: secret\n  deploy: 1234\n").unwrap();
        assert_eq!(creds.len(), 2);
        assert!(creds.check("admin", "secret"));
        assert!(creds.check("deploy", "1234"));
        assert!(!creds.check("admin", "Secret"));
        assert!(!creds.check("nobody", "secret"));
    }

    #[test]
    fn test_blank_entries_are_skipped() {
        let creds = parse("users:\n  ' admin ': ' pw '\n  ghost: ''\n  '': nameless\n").unwrap();
        assert_eq!(creds.len(), 1);
        assert!(creds.check("admin", "pw"));
        assert!(!creds.check("ghost", ""));
    }

    #[test]
    fn test_no_usable_users_is_an_error() {
        assert!(matches!(
            parse("users:\n  ghost: ''\n"),
            Err(Error::NoUsers { .. })
        ));
        assert!(matches!(parse("users: {}\n"), Err(Error::NoUsers { .. })));
    }

    #[test]
    fn test_missing_users_mapping() {
        assert!(matches!(
            parse("admins:\n  a: b\n"),
            Err(Error::MissingUsers { .. })
        ));
        assert!(matches!(parse(""), Err(Error::MissingUsers { .. })));
        assert!(matches!(parse("users: [a, b]"), Err(Error::MissingUsers { .. })));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(parse("users: [unclosed"), Err(Error::Yaml { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = AdminCredentials::load(&dir.path().join("creds.yaml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn test_debug_hides_passwords() {
        let creds = parse("users:\n  admin: hunter2\n").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
