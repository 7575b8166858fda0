//! Credential model and the on-disk credential cache.
//!
//! The cache is a versioned JSON file readable only by the owner. Every
//! read-then-write step runs under an exclusive advisory lock on a sidecar
//! `.lock` file so concurrent invocations cannot interleave writes.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthError;

/// Cache layout version. Any other value is treated as an absent cache.
const CACHE_SCHEMA_VERSION: u32 = 1;

/// Tokens this close to expiry are already considered expired.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// How long to wait for another invocation to release the cache lock.
pub const DEFAULT_LOCK_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const LOCK_RETRY_MS: u64 = 50;

/// Access/refresh token pair used to authorize completion requests.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

impl Credential {
    /// Whether the credential is expired (or within the leeway) at `now`.
    ///
    /// Credentials without an expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - Duration::seconds(EXPIRY_LEEWAY_SECS) <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        let scheme = if self.token_type.eq_ignore_ascii_case("bearer") || self.token_type.is_empty()
        {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", scheme, self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    credential: &'a Credential,
}

#[derive(Deserialize)]
struct CacheFile {
    version: u32,
    credential: serde_json::Value,
}

/// Proof that the caller holds the cache lock. Released on drop.
pub struct CacheLock {
    file: File,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Reads and writes the serialized [`Credential`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    lock_timeout: StdDuration,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Wait at most `timeout` for the cache lock. A holder may keep it across
    /// one token exchange, so this should exceed the HTTP timeout.
    pub fn with_lock_timeout(mut self, timeout: StdDuration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive cache lock, waiting up to the lock timeout for other
    /// invocations to finish. Blocks the calling thread; async callers use
    /// [`CredentialStore::lock_async`].
    pub fn lock(&self) -> Result<CacheLock, AuthError> {
        self.ensure_parent_dir()?;

        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| self.cache_error(&lock_path, source))?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock
                        && err.raw_os_error() != fs2::lock_contended_error().raw_os_error()
                    {
                        return Err(self.cache_error(&lock_path, err));
                    }
                    if start.elapsed() >= self.lock_timeout {
                        return Err(AuthError::LockTimeout(self.lock_timeout));
                    }
                    std::thread::sleep(StdDuration::from_millis(LOCK_RETRY_MS));
                }
            }
        }

        Ok(CacheLock { file })
    }

    /// [`CredentialStore::lock`] on the blocking pool, keeping runtime workers free.
    pub async fn lock_async(&self) -> Result<CacheLock, AuthError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.lock())
            .await
            .map_err(|e| self.cache_error(&self.path, std::io::Error::other(e)))?
    }

    /// Load the cached credential.
    ///
    /// A missing file, an undecodable file, or a different schema version all
    /// read as `None`. A decodable credential with no token is
    /// [`AuthError::InvalidCachedCredential`].
    pub fn load(&self, _lock: &CacheLock) -> Result<Option<Credential>, AuthError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.cache_error(&self.path, source)),
        };

        let file: CacheFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!("Ignoring unreadable credential cache {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        if file.version != CACHE_SCHEMA_VERSION {
            warn!(
                "Ignoring credential cache with schema version {} (expected {})",
                file.version, CACHE_SCHEMA_VERSION
            );
            return Ok(None);
        }

        let credential: Credential = match serde_json::from_value(file.credential) {
            Ok(c) => c,
            Err(e) => {
                warn!("Ignoring malformed credential in cache: {}", e);
                return Ok(None);
            }
        };

        if credential.access_token.trim().is_empty() {
            return Err(AuthError::InvalidCachedCredential(
                "access token is empty".to_string(),
            ));
        }

        Ok(Some(credential))
    }

    /// Atomically replace the cached credential.
    pub fn save(&self, _lock: &CacheLock, credential: &Credential) -> Result<(), AuthError> {
        let dir = self.ensure_parent_dir()?;
        let body = serde_json::to_string_pretty(&CacheFileRef {
            version: CACHE_SCHEMA_VERSION,
            credential,
        })
        .map_err(AuthError::Serialize)?;

        // NamedTempFile is created with mode 0600 on unix.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|source| self.cache_error(&dir, source))?;
        tmp.write_all(body.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|source| self.cache_error(tmp.path(), source))?;
        tmp.persist(&self.path)
            .map_err(|e| self.cache_error(&self.path, e.error))?;

        debug!("Saved credential cache to {}", self.path.display());
        Ok(())
    }

    /// Remove the cached credential if present.
    pub fn clear(&self, _lock: &CacheLock) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Cleared credential cache {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.cache_error(&self.path, source)),
        }
    }

    fn ensure_parent_dir(&self) -> Result<PathBuf, AuthError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|source| self.cache_error(&dir, source))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)) {
                    warn!("Failed to restrict {} permissions: {}", dir.display(), e);
                }
            }
        }
        Ok(dir)
    }

    fn cache_error(&self, path: &Path, source: std::io::Error) -> AuthError {
        AuthError::Cache {
            path: path.to_path_buf(),
            source,
        }
    }
}
