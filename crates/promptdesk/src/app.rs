use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use promptdesk_config::Config;
use promptdesk_registry::{SessionStore, UserRegistry};
use promptdesk_store::LmdbStore;
use promptdesk_types::StoreInfo;
use tracing::info;

/// Everything a command needs, built once per invocation.
pub struct App {
    pub store: Arc<LmdbStore>,
    pub registry: UserRegistry<Arc<LmdbStore>>,
    pub sessions: SessionStore<Arc<LmdbStore>>,
    lock_path: Option<PathBuf>,
}

impl App {
    pub fn open(config: &Config) -> Result<Self> {
        let store_path = config.store.resolved_path();
        let store = Arc::new(LmdbStore::new(&store_path, config.store.map_size)?);

        let lock_path = config.store.lock_path();
        let mut registry = UserRegistry::new(Arc::clone(&store));
        if let Some(lock_path) = &lock_path {
            registry = registry.with_lock_file(lock_path);
        }

        if registry.initialize()? {
            info!("Seeded user registry at {}", store_path.display());
        }

        Ok(Self {
            sessions: SessionStore::new(Arc::clone(&store)),
            store,
            registry,
            lock_path,
        })
    }

    pub fn store_info(&self) -> Result<StoreInfo> {
        let (current_bytes, entries) = self.store.stats();
        Ok(StoreInfo {
            path: self.store.path().display().to_string(),
            current_bytes,
            max_bytes: self.store.max_bytes(),
            entries,
            users: self.registry.list_users()?.len(),
            lock_path: self.lock_path.as_ref().map(|p| p.display().to_string()),
        })
    }
}
