use std::path::{Path, PathBuf};

use fastrace::trace;
use heed::types::*;
use heed::{Database, Env, EnvOpenOptions};
use tracing::debug;

use crate::{KeyValueStore, StoreError};

/// LMDB-backed store. Every write commits its own transaction.
pub struct LmdbStore {
    env: Env,
    db: Database<Str, Str>,
    path: PathBuf,
    max_bytes: u64,
}

impl LmdbStore {
    pub fn new(path: &Path, max_bytes: u64) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_bytes as usize)
                .max_dbs(1)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let db = env.create_database(&mut wtxn, None)?;
        wtxn.commit()?;

        debug!("Opened LMDB store at {}", path.display());

        Ok(Self {
            env,
            db,
            path: path.to_path_buf(),
            max_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `(current_bytes, entries)`.
    pub fn stats(&self) -> (u64, u64) {
        let entries = self
            .env
            .read_txn()
            .and_then(|rtxn| self.db.len(&rtxn))
            .unwrap_or(0) as u64;

        let info = self.env.info();
        let current_bytes = info.last_page_number as u64 * 4096;

        (current_bytes, entries)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

impl KeyValueStore for LmdbStore {
    #[trace]
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let value = self.db.get(&rtxn, key)?.map(|v| v.to_string());
        Ok(value)
    }

    #[trace]
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, key, value)?;
        wtxn.commit()?;
        debug!("Wrote {} bytes under {}", value.len(), key);
        Ok(())
    }

    #[trace]
    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn()?;
        let removed = self.db.delete(&mut wtxn, key)?;
        wtxn.commit()?;
        debug!("Removed {} (existed: {})", key, removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MAP_SIZE: u64 = 10 * 1024 * 1024;

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lmdb");

        {
            let store = LmdbStore::new(&path, TEST_MAP_SIZE).unwrap();
            store.set("users", "[]").unwrap();
            store.set("other", "x").unwrap();
            assert!(store.remove("other").unwrap());
        }

        let store = LmdbStore::new(&path, TEST_MAP_SIZE).unwrap();
        assert_eq!(store.get("users").unwrap().as_deref(), Some("[]"));
        assert_eq!(store.get("other").unwrap(), None);
        assert!(!store.remove("other").unwrap());
        assert_eq!(store.stats().1, 1);
        assert_eq!(store.max_bytes(), TEST_MAP_SIZE);
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::new(&dir.path().join("store.lmdb"), TEST_MAP_SIZE).unwrap();

        store.set("k", "first").unwrap();
        store.set("k", "second").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("second"));
        assert!(store.contains("k").unwrap());
    }
}
