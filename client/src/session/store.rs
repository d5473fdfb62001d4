use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

/// The three values a session consists of. They are stored independently;
/// there is no structured session object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionKey {
    Token,
    Role,
    Name,
}

impl SessionKey {
    pub const ALL: [SessionKey; 3] = [SessionKey::Token, SessionKey::Role, SessionKey::Name];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::Token => "token",
            SessionKey::Role => "role",
            SessionKey::Name => "name",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Session file is corrupt: {0}")]
    Corrupt(#[from] toml::de::Error),

    #[error("Failed to encode session file: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Client-local key/value storage for the session.
///
/// Reads never fail from the caller's point of view: an unreadable store is
/// an empty store. `clear` removes all three keys in one step.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: SessionKey) -> Option<String>;

    /// Write all given values in one step.
    fn set_all(&self, values: &[(SessionKey, &str)]) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store; the default for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<SessionKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: SessionKey) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn set_all(&self, values: &[(SessionKey, &str)]) -> Result<(), StoreError> {
        let mut map = self.values.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in values {
            map.insert(*key, value.to_string());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// TOML file store used by the CLI, so a session outlives one invocation.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// reader never observes a half-written session. Clearing deletes the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let encoded = toml::to_string(map)?;
        let tmp = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Session written to {}", self.path.display());
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: SessionKey) -> Option<String> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        match self.read_map() {
            Ok(mut map) => map.remove(key.as_str()),
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn set_all(&self, values: &[(SessionKey, &str)]) -> Result<(), StoreError> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map().unwrap_or_default();
        for (key, value) in values {
            map.insert(key.as_str().to_string(), value.to_string());
        }
        self.write_map(&map)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Session file {} removed", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
