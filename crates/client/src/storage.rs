//! Client-local key/value storage
//!
//! String values under fixed keys, persisted as one JSON object. Writes go
//! to a temp file first and are renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::StorageError;

pub const TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";
pub const COOKIE_CONSENT_KEY: &str = "cookieConsent";

pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl LocalStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        debug!(
            component = "storage",
            event = "storage.opened",
            path = %path.display(),
            keys = entries.len(),
        );
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<(), StorageError> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.into());
        self.persist(&entries)
    }

    /// Set several keys with one write
    pub fn set_many(&self, pairs: &[(&str, String)]) -> Result<(), StorageError> {
        let mut entries = self.lock();
        for (key, value) in pairs {
            entries.insert((*key).to_string(), value.clone());
        }
        self.persist(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_many(&[key])
    }

    pub fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut entries = self.lock();
        let mut changed = false;
        for key in keys {
            changed |= entries.remove(*key).is_some();
        }
        if changed {
            self.persist(&entries)
        } else {
            Ok(())
        }
    }

    /// `None` until the user has answered the consent prompt
    pub fn cookie_consent(&self) -> Option<bool> {
        match self.get(COOKIE_CONSENT_KEY).as_deref() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }

    pub fn set_cookie_consent(&self, accepted: bool) -> Result<(), StorageError> {
        self.set(COOKIE_CONSENT_KEY, if accepted { "true" } else { "false" })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source: std::io::Error| StorageError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}
