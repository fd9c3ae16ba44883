use fastrace::trace;
use promptdesk_store::{JsonStore, KeyValueStore};
use promptdesk_types::User;
use tracing::debug;

use crate::error::RegistryResult;

/// Store key of the logged-in user record.
pub const SESSION_KEY: &str = "promptdesk.current_user";

/// The login flow's "current user" entry.
///
/// Shares a store with [`crate::UserRegistry`] but never reads or writes the
/// user collection, and the registry never touches this entry.
pub struct SessionStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[trace]
    pub fn login(&self, user: &User) -> RegistryResult<()> {
        self.store.set_json(SESSION_KEY, user)?;
        debug!("Started session for user {}", user.id);
        Ok(())
    }

    #[trace]
    pub fn current(&self) -> RegistryResult<Option<User>> {
        Ok(self.store.get_json(SESSION_KEY)?)
    }

    /// Returns whether a session was active.
    #[trace]
    pub fn logout(&self) -> RegistryResult<bool> {
        let removed = self.store.remove(SESSION_KEY)?;
        debug!("Ended session (active: {})", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{UserRegistry, USERS_KEY};
    use promptdesk_store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_login_logout_leaves_users_alone() {
        let store = Arc::new(MemoryStore::new());
        let registry = UserRegistry::new(Arc::clone(&store));
        registry.initialize().unwrap();
        let sessions = SessionStore::new(Arc::clone(&store));
        let users_before = store.get(USERS_KEY).unwrap();

        assert_eq!(sessions.current().unwrap(), None);

        let mike = registry.get_user_by_id(2).unwrap().unwrap();
        sessions.login(&mike).unwrap();
        assert_eq!(sessions.current().unwrap(), Some(mike));

        assert!(sessions.logout().unwrap());
        assert!(!sessions.logout().unwrap());
        assert_eq!(sessions.current().unwrap(), None);

        assert_eq!(store.get(USERS_KEY).unwrap(), users_before);
    }

    #[test]
    fn test_session_survives_registry_clear() {
        let store = Arc::new(MemoryStore::new());
        let registry = UserRegistry::new(Arc::clone(&store));
        registry.initialize().unwrap();
        let sessions = SessionStore::new(Arc::clone(&store));

        let sarah = registry.get_user_by_id(1).unwrap().unwrap();
        sessions.login(&sarah).unwrap();
        registry.clear().unwrap();

        assert_eq!(sessions.current().unwrap(), Some(sarah));
    }
}
