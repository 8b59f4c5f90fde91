use crate::hash::HashAlgorithm;
use crate::store::{self, HashedPasswords, MAX_HTPASSWD_FILE_SIZE};
use snafu::{ResultExt, Snafu, ensure};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tempfile::NamedTempFile;

/// Errors that can occur during htpasswd file operations.
#[derive(Debug, Snafu)]
pub enum Error {
    /// User was not found in the htpasswd file.
    #[snafu(display("User '{username}' doesn't exist"))]
    UserNotFound { username: String },

    /// User already exists in the htpasswd file.
    #[snafu(display("User '{username}' already exists"))]
    UserAlreadyExists { username: String },

    /// Failed to read the htpasswd file.
    #[snafu(display("Failed to read htpasswd file '{}'", path.display()))]
    FileRead { source: io::Error, path: PathBuf },

    /// The file on disk is not a valid htpasswd file.
    #[snafu(display("Invalid htpasswd file '{}'", path.display()))]
    Parse {
        source: store::Error,
        path: PathBuf,
    },

    /// The store refused the new password.
    #[snafu(display("Can't set password for user '{username}'"))]
    Update {
        source: store::Error,
        username: String,
    },

    /// Failed to create the parent directory.
    #[snafu(display("Failed to create parent directory '{}'", path.display()))]
    CreateDir { source: io::Error, path: PathBuf },

    /// Failed to write the replacement file.
    #[snafu(display("Failed to save htpasswd file '{}'", path.display()))]
    FileSave { source: io::Error, path: PathBuf },
}

impl Error {
    /// The store-level error underneath, if any.
    pub fn store_error(&self) -> Option<&store::Error> {
        match self {
            Error::Parse { source, .. } | Error::Update { source, .. } => Some(source),
            _ => None,
        }
    }
}

type LockRegistry = Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>;

fn registry() -> &'static LockRegistry {
    static LOCKS: OnceLock<LockRegistry> = OnceLock::new();
    LOCKS.get_or_init(Default::default)
}

/// Resolves the path as far as the filesystem allows. Symlinks are
/// followed, so `./a`, `a` and a link to `a` share one lock and the
/// replacement lands on the real file.
fn resolve_target(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = registry().lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(resolve_target(path)).or_default().clone()
}

/// An htpasswd file on disk.
///
/// Every operation re-reads the file, applies one change and replaces the
/// file, all while holding a process-wide lock for that path. Handles
/// created for the same path share the lock. Lock registry entries are
/// never removed, so the registry holds one entry per distinct path the
/// process has opened.
///
/// If the path is a symlink, the file it points to is rewritten and the
/// link stays in place.
#[derive(Debug, Clone)]
pub struct HtpasswdFile {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl HtpasswdFile {
    /// Creates a handle for `path`. The file does not have to exist yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            path: path.to_path_buf(),
            lock: lock_for(path),
        }
    }

    /// Path of the managed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The mutex guards no data, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads the current contents. A missing file reads as an empty store.
    pub fn load(&self) -> Result<HashedPasswords, Error> {
        let _guard = self.guard();
        self.read_store()
    }

    /// Adds `username` with an APR1-MD5 hash of `password`.
    ///
    /// Fails without touching the file if the user already exists.
    pub fn create_user(&self, username: &str, password: &str) -> Result<(), Error> {
        let _guard = self.guard();
        let mut passwords = self.read_store()?;
        ensure!(
            !passwords.contains(username),
            UserAlreadyExistsSnafu { username }
        );
        passwords
            .set_password(username, password, HashAlgorithm::DEFAULT)
            .context(UpdateSnafu { username })?;
        self.write_store(&passwords)?;
        tracing::info!(path = %self.path.display(), username, "user created");
        Ok(())
    }

    /// Creates or updates `username` using an explicit algorithm.
    pub fn set_password(
        &self,
        username: &str,
        password: &str,
        algorithm: HashAlgorithm,
    ) -> Result<(), Error> {
        let _guard = self.guard();
        let mut passwords = self.read_store()?;
        let existed = passwords.contains(username);
        passwords
            .set_password(username, password, algorithm)
            .context(UpdateSnafu { username })?;
        self.write_store(&passwords)?;
        tracing::info!(
            path = %self.path.display(),
            username,
            %algorithm,
            existed,
            "password set"
        );
        Ok(())
    }

    /// Removes `username`.
    ///
    /// Fails without touching the file if the user doesn't exist.
    pub fn delete_user(&self, username: &str) -> Result<(), Error> {
        let _guard = self.guard();
        let mut passwords = self.read_store()?;
        ensure!(
            passwords.delete_user(username),
            UserNotFoundSnafu { username }
        );
        self.write_store(&passwords)?;
        tracing::info!(path = %self.path.display(), username, "user deleted");
        Ok(())
    }

    fn read_store(&self) -> Result<HashedPasswords, Error> {
        let path = self.path.as_path();

        let bytes = match fs::metadata(path) {
            Ok(meta) => {
                let size = usize::try_from(meta.len()).unwrap_or(usize::MAX);
                if size > MAX_HTPASSWD_FILE_SIZE {
                    return Err(store::Error::TooLarge {
                        size,
                        limit: MAX_HTPASSWD_FILE_SIZE,
                    })
                    .context(ParseSnafu { path });
                }
                fs::read(path)
            }
            Err(e) => Err(e),
        };

        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "htpasswd file is absent, starting empty");
                return Ok(HashedPasswords::new());
            }
            Err(e) => return Err(e).context(FileReadSnafu { path }),
        };

        let passwords = HashedPasswords::parse(&bytes).context(ParseSnafu { path })?;
        tracing::debug!(path = %path.display(), users = passwords.len(), "htpasswd file loaded");
        Ok(passwords)
    }

    /// Writes to a temporary file next to the target and renames it over
    /// the target. New files get mode 0600; existing files keep their mode.
    fn write_store(&self, passwords: &HashedPasswords) -> Result<(), Error> {
        let target = resolve_target(&self.path);
        let path = target.as_path();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        if !dir.exists() {
            fs::create_dir_all(dir).context(CreateDirSnafu { path: dir })?;
        }

        let mut tmp = NamedTempFile::new_in(dir).context(FileSaveSnafu { path })?;
        tmp.write_all(&passwords.to_bytes())
            .context(FileSaveSnafu { path })?;
        tmp.flush().context(FileSaveSnafu { path })?;

        if let Ok(meta) = fs::metadata(path) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .context(FileSaveSnafu { path })?;
        }
        tmp.as_file().sync_all().context(FileSaveSnafu { path })?;

        tmp.persist(path)
            .map_err(|e| e.error)
            .context(FileSaveSnafu { path })?;
        tracing::debug!(path = %path.display(), users = passwords.len(), "htpasswd file written");
        Ok(())
    }
}
