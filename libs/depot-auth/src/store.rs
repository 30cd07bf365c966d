//! Token stores.
//!
//! The session layer reads and writes credentials only through
//! [`TokenStore`]; it never keeps its own copy between calls.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use depot_utils::SecretString;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::StoreError;
use crate::types::{TokenPair, UserProfile};

/// Holder of the current access/refresh tokens and the logged-in user.
///
/// Reads never fail and never block on I/O. Writes report persistence
/// failures; the in-memory value is updated either way.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<SecretString>;

    fn refresh_token(&self) -> Option<SecretString>;

    /// # Errors
    /// Returns a [`StoreError`] if the new value could not be persisted.
    fn set_access_token(&self, token: SecretString) -> Result<(), StoreError>;

    /// # Errors
    /// Returns a [`StoreError`] if the new value could not be persisted.
    fn set_refresh_token(&self, token: SecretString) -> Result<(), StoreError>;

    /// Replace both tokens.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the new values could not be persisted.
    fn set_tokens(&self, pair: &TokenPair) -> Result<(), StoreError> {
        self.set_access_token(pair.access_token.clone())?;
        self.set_refresh_token(pair.refresh_token.clone())
    }

    fn user(&self) -> Option<UserProfile>;

    /// # Errors
    /// Returns a [`StoreError`] if the profile could not be persisted.
    fn set_user(&self, user: UserProfile) -> Result<(), StoreError>;

    /// Forget tokens and user.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the persisted copy could not be removed.
    fn clear_all(&self) -> Result<(), StoreError>;
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<UserProfile>,
}

impl SessionRecord {
    fn wipe(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
        self.user = None;
    }
}

impl Drop for SessionRecord {
    fn drop(&mut self) {
        self.wipe();
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    record: RwLock<SessionRecord>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `pair`.
    #[must_use]
    pub fn with_tokens(pair: &TokenPair) -> Self {
        Self {
            record: RwLock::new(SessionRecord {
                access_token: Some(pair.access_token.expose().to_owned()),
                refresh_token: Some(pair.refresh_token.expose().to_owned()),
                user: None,
            }),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<SecretString> {
        self.record.read().access_token.as_deref().map(SecretString::from)
    }

    fn refresh_token(&self) -> Option<SecretString> {
        self.record.read().refresh_token.as_deref().map(SecretString::from)
    }

    fn set_access_token(&self, token: SecretString) -> Result<(), StoreError> {
        self.record.write().access_token = Some(token.expose().to_owned());
        Ok(())
    }

    fn set_refresh_token(&self, token: SecretString) -> Result<(), StoreError> {
        self.record.write().refresh_token = Some(token.expose().to_owned());
        Ok(())
    }

    fn user(&self) -> Option<UserProfile> {
        self.record.read().user.clone()
    }

    fn set_user(&self, user: UserProfile) -> Result<(), StoreError> {
        self.record.write().user = Some(user);
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        self.record.write().wipe();
        Ok(())
    }
}

/// Store persisted as a JSON file, so a session survives CLI invocations.
///
/// The file is rewritten atomically (temp file plus rename) on every change
/// and removed by [`clear_all`](TokenStore::clear_all). On Unix it is created
/// with mode `0600`.
pub struct FileTokenStore {
    path: PathBuf,
    record: RwLock<SessionRecord>,
    /// Serializes file writes so they land in the order the record changed.
    /// The record lock is never held across disk I/O.
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    /// Open the store at `path`, loading an existing session if present.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the file exists but cannot be read and
    /// [`StoreError::Corrupt`] if it is not a valid session record.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let record = match fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                    path: path.display().to_string(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionRecord::default(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        tracing::debug!(path = %path.display(), "opened token store");
        Ok(Self {
            path,
            record: RwLock::new(record),
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn persist(&self, mut json: Vec<u8>) -> Result<(), StoreError> {
        let result = self.write_atomic(&json);
        json.zeroize();
        result
    }

    fn write_atomic(&self, contents: &[u8]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = open_private(&tmp).map_err(|e| self.io_error(e))?;
            file.write_all(contents).map_err(|e| self.io_error(e))?;
            file.sync_all().map_err(|e| self.io_error(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn update(&self, apply: impl FnOnce(&mut SessionRecord)) -> Result<(), StoreError> {
        let _writing = self.write_lock.lock();
        let json = {
            let mut record = self.record.write();
            apply(&mut record);
            serde_json::to_vec_pretty(&*record)?
        };
        self.persist(json)
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<SecretString> {
        self.record.read().access_token.as_deref().map(SecretString::from)
    }

    fn refresh_token(&self) -> Option<SecretString> {
        self.record.read().refresh_token.as_deref().map(SecretString::from)
    }

    fn set_access_token(&self, token: SecretString) -> Result<(), StoreError> {
        self.update(|r| r.access_token = Some(token.expose().to_owned()))
    }

    fn set_refresh_token(&self, token: SecretString) -> Result<(), StoreError> {
        self.update(|r| r.refresh_token = Some(token.expose().to_owned()))
    }

    fn set_tokens(&self, pair: &TokenPair) -> Result<(), StoreError> {
        self.update(|r| {
            r.access_token = Some(pair.access_token.expose().to_owned());
            r.refresh_token = Some(pair.refresh_token.expose().to_owned());
        })
    }

    fn user(&self) -> Option<UserProfile> {
        self.record.read().user.clone()
    }

    fn set_user(&self, user: UserProfile) -> Result<(), StoreError> {
        self.update(|r| r.user = Some(user))
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let _writing = self.write_lock.lock();
        self.record.write().wipe();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
