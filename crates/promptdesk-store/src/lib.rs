mod lmdb;
mod memory;

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub use lmdb::LmdbStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("LMDB error: {0}")]
    Lmdb(#[from] heed::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// String key-value storage. Writes are durable once the call returns.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Returns whether an entry was removed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        (**self).remove(key)
    }

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        (**self).contains(key)
    }
}

/// JSON-encoded access on top of any [`KeyValueStore`].
pub trait JsonStore: KeyValueStore {
    fn get_json<V>(&self, key: &str) -> Result<Option<V>, StoreError>
    where
        V: DeserializeOwned,
    {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<V>(&self, key: &str, value: &V) -> Result<(), StoreError>
    where
        V: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

impl<T: KeyValueStore + ?Sized> JsonStore for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: u64,
        tags: Vec<String>,
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        let entry = Entry {
            id: 3,
            tags: vec!["a".to_string(), "b".to_string()],
        };

        store.set_json("entry", &entry).unwrap();
        assert_eq!(store.get("entry").unwrap().unwrap(), r#"{"id":3,"tags":["a","b"]}"#);
        assert_eq!(store.get_json::<Entry>("entry").unwrap(), Some(entry));
        assert_eq!(store.get_json::<Entry>("missing").unwrap(), None);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let store = MemoryStore::new();
        store.set("entry", "{not json").unwrap();
        assert!(matches!(
            store.get_json::<Entry>("entry"),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_shared_store_through_arc() {
        let store = Arc::new(MemoryStore::new());
        let other = Arc::clone(&store);
        store.set("k", "v").unwrap();
        assert!(other.contains("k").unwrap());
        assert!(other.remove("k").unwrap());
        assert!(!store.contains("k").unwrap());
    }
}
