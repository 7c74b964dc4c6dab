//! Durable storage for the single bearer token.
//!
//! Provides the [`TokenStore`] trait and implementations:
//! - [`FileTokenStore`] - JSON file in the data directory (0600 on Unix)
//! - [`KeyringTokenStore`] - OS keychain entry
//! - [`MemoryTokenStore`] - in-process, for tests and throwaway sessions

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::StoreError;

/// Token file name in the data directory
pub const TOKEN_FILE: &str = "token.json";

/// Keychain service name
const SERVICE_NAME: &str = "emoscope";

/// Persistence for at most one bearer token.
///
/// Operations are synchronous; backends are local files or the OS keychain.
pub trait TokenStore: Send + Sync {
    /// The persisted token, or `None` if never set or cleared.
    fn get(&self) -> Result<Option<String>, StoreError>;

    /// Persist `token`, replacing any previous value.
    fn set(&self, token: &str) -> Result<(), StoreError>;

    /// Remove the persisted token. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;

    /// Name of this storage backend.
    fn name(&self) -> &str {
        "unknown"
    }
}

impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    fn get(&self) -> Result<Option<String>, StoreError> {
        (**self).get()
    }
    fn set(&self, token: &str) -> Result<(), StoreError> {
        (**self).set(token)
    }
    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: TokenStore + ?Sized> TokenStore for Box<T> {
    fn get(&self) -> Result<Option<String>, StoreError> {
        (**self).get()
    }
    fn set(&self, token: &str) -> Result<(), StoreError> {
        (**self).set(token)
    }
    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // The slot holds a plain Option, so a poisoned lock still has valid data
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot().clone())
    }

    fn set(&self, token: &str) -> Result<(), StoreError> {
        *self.slot() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// File
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store the token as `token.json` inside `data_dir`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Load the full record, including when it was saved
    pub fn load_record(&self) -> Result<Option<StoredToken>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        let record: StoredToken = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if record.token.is_empty() {
            return Ok(None);
        }
        Ok(Some(record))
    }
}

/// Create `path` afresh, readable only by the owner on Unix, holding `contents`
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Option<String>, StoreError> {
        Ok(self.load_record()?.map(|r| r.token))
    }

    fn set(&self, token: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let record = StoredToken {
            token: token.to_string(),
            saved_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        // Written aside and renamed so the token file is either the old
        // record or the new one, never readable by others in between
        let tmp = self.tmp_path();
        let result = write_private(&tmp, contents.as_bytes())
            .and_then(|()| std::fs::rename(&tmp, &self.path));
        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(StoreError::io(&self.path, e));
        }

        debug!(path = %self.path.display(), "Token saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Token file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

// ============================================================================
// Keyring
// ============================================================================

/// Token kept in the OS keychain under service `emoscope`.
pub struct KeyringTokenStore {
    account: String,
}

impl KeyringTokenStore {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Entry::new(SERVICE_NAME, &self.account).map_err(|e| StoreError::Keyring(e.to_string()))
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self) -> Result<Option<String>, StoreError> {
        match self.entry()?.get_password() {
            Ok(token) if token.is_empty() => Ok(None),
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Keyring(e.to_string())),
        }
    }

    fn set(&self, token: &str) -> Result<(), StoreError> {
        self.entry()?
            .set_password(token)
            .map_err(|e| StoreError::Keyring(e.to_string()))?;
        debug!(account = %self.account, "Token saved to keyring");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                debug!(account = %self.account, "Token removed from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::Keyring(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}
