//! Durable string key/value storage scoped to the wallet's own origin.
//!
//! Everything the trust core persists goes through [`Storage`]: the active key id, the
//! application state, the comma-joined whitelist, the account list and the encrypted vault
//! records themselves. Values are always plain strings.

use crate::{fsutil, paths::KeywardPaths};
use eyre::Context as _;
use std::{collections::BTreeMap, path::PathBuf};

pub const KEY_ID: &str = "keyId";
pub const APPLICATION_STATE: &str = "applicationState";
pub const WHITELIST: &str = "whitelist";
pub const ALL_ACCOUNTS: &str = "allAccounts";

pub fn keystore_slot(id: &str) -> String {
    format!("keystore:{id}")
}

pub trait Storage: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> eyre::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> eyre::Result<()>;
    fn remove(&self, key: &str) -> eyre::Result<()>;
}

/// JSON map on disk, rewritten atomically under an advisory lock on every mutation.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStorage {
    pub fn open(paths: &KeywardPaths) -> eyre::Result<Self> {
        paths.ensure_private_dirs()?;
        Ok(Self {
            path: paths.storage_file(),
            lock_path: paths.storage_lock_file(),
        })
    }

    fn read_map(&self) -> eyre::Result<BTreeMap<String, String>> {
        let Some(s) = fsutil::read_to_string_if_exists(&self.path)? else {
            return Ok(BTreeMap::new());
        };
        serde_json::from_str(&s).context("parse storage.json")
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> eyre::Result<()> {
        let s = serde_json::to_string_pretty(map).context("serialize storage.json")?;
        fsutil::write_atomic_private(&self.path, s.as_bytes()).context("write storage.json")
    }

    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> eyre::Result<()> {
        let _lock = fsutil::lock_exclusive(&self.lock_path)?;
        let mut map = self.read_map()?;
        f(&mut map);
        self.write_map(&map)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> eyre::Result<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> eyre::Result<()> {
        self.mutate(|m| {
            m.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> eyre::Result<()> {
        self.mutate(|m| {
            m.remove(key);
        })
    }
}


#[cfg(test)]
pub use memory::MemoryStorage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_persists_across_instances() -> eyre::Result<()> {
        let cfg_dir = tempfile::tempdir()?;
        let data_dir = tempfile::tempdir()?;
        let paths = KeywardPaths::at(cfg_dir.path().to_path_buf(), data_dir.path().to_path_buf());

        let a = FileStorage::open(&paths)?;
        a.set(KEY_ID, "abc")?;
        a.set(WHITELIST, "https://a.example,https://b.example")?;
        a.remove(WHITELIST)?;

        let b = FileStorage::open(&paths)?;
        assert_eq!(b.get(KEY_ID)?.as_deref(), Some("abc"));
        assert!(b.get(WHITELIST)?.is_none());
        Ok(())
    }

    #[test]
    fn unavailable_backend_fails_every_call() {
        let s = MemoryStorage::unavailable();
        assert!(s.get(KEY_ID).is_err());
        assert!(s.set(KEY_ID, "x").is_err());
    }

    #[test]
    fn selective_backend_only_refuses_matching_writes() -> eyre::Result<()> {
        let s = MemoryStorage::rejecting_writes_to("keystore:");
        assert!(s.set(&keystore_slot("k1"), "x").is_err());
        s.set(KEY_ID, "k1")?;
        assert_eq!(s.get(KEY_ID)?.as_deref(), Some("k1"));
        assert!(s.get(&keystore_slot("k1"))?.is_none());
        Ok(())
    }
}
