use std::path::PathBuf;
use std::sync::Mutex;

use fastrace::trace;
use promptdesk_config::FileLock;
use promptdesk_store::{JsonStore, KeyValueStore};
use promptdesk_types::{
    avatar_for_index, normalize_email, normalize_name, NewUser, SelectionOption, User, UserPatch,
};
use rand::seq::SliceRandom;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{RegistryError, RegistryResult};
use crate::seed::seed_users_from;

/// Store key holding the JSON array of users.
pub const USERS_KEY: &str = "promptdesk.users";

/// Store key holding the highest id ever issued, so deleted ids stay retired.
pub const LAST_ID_KEY: &str = "promptdesk.users.last_id";

/// The authoritative user collection.
///
/// Holds no users in memory: every operation reads the collection from the
/// store, and every mutation writes the whole collection back. Mutations run
/// under an in-process mutex and, when configured, an exclusive lock file so
/// that concurrent writers cannot lose each other's updates.
pub struct UserRegistry<S: KeyValueStore> {
    store: S,
    clock: Box<dyn Clock>,
    lock_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> UserRegistry<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock),
            lock_path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Serialize mutations across processes through `lock_path`.
    pub fn with_lock_file(mut self, lock_path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(lock_path.into());
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Writes the seed set if the store has no user collection yet.
    ///
    /// Returns `true` when it seeded.
    #[trace]
    pub fn initialize(&self) -> RegistryResult<bool> {
        self.with_write_lock(|| {
            if self.store.contains(USERS_KEY)? {
                return Ok(false);
            }
            let users = self.fresh_seed()?;
            self.persist(&users)?;
            debug!("Seeded user registry with {} users", users.len());
            Ok(true)
        })
    }

    /// All users in insertion order, or the seed set if nothing is stored yet.
    #[trace]
    pub fn list_users(&self) -> RegistryResult<Vec<User>> {
        self.load_or_seed()
    }

    #[trace]
    pub fn add_user(&self, input: NewUser) -> RegistryResult<User> {
        let name = normalize_name(&input.name);
        if name.is_empty() {
            return Err(RegistryError::InvalidInput("name must not be empty".to_string()));
        }
        let email = normalize_email(&input.email);
        if email.is_empty() {
            return Err(RegistryError::InvalidInput("email must not be empty".to_string()));
        }

        self.transact(|users| {
            if users.iter().any(|u| normalize_email(&u.email) == email) {
                return Err(RegistryError::DuplicateEmail(email));
            }

            let last_issued = self.last_issued_id()?;
            let id = users.iter().map(|u| u.id).max().unwrap_or(0).max(last_issued) + 1;

            let user = User {
                id,
                name,
                role: input.role.unwrap_or_default(),
                email,
                avatar: avatar_for_index(users.len()).to_string(),
                created_at: self.clock.now(),
                updated_at: None,
            };
            users.push(user.clone());
            Ok(user)
        })
    }

    #[trace]
    pub fn update_user(&self, id: u64, updates: UserPatch) -> RegistryResult<User> {
        let name = match updates.name {
            Some(name) => {
                let name = normalize_name(&name);
                if name.is_empty() {
                    return Err(RegistryError::InvalidInput("name must not be empty".to_string()));
                }
                Some(name)
            }
            None => None,
        };
        let email = match updates.email {
            Some(email) => {
                let email = normalize_email(&email);
                if email.is_empty() {
                    return Err(RegistryError::InvalidInput("email must not be empty".to_string()));
                }
                Some(email)
            }
            None => None,
        };

        self.transact(|users| {
            let index = users
                .iter()
                .position(|u| u.id == id)
                .ok_or(RegistryError::NotFound(id))?;

            if let Some(email) = &email {
                if *email != users[index].email
                    && users
                        .iter()
                        .any(|u| u.id != id && normalize_email(&u.email) == *email)
                {
                    return Err(RegistryError::DuplicateEmail(email.clone()));
                }
            }

            let user = &mut users[index];
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(role) = updates.role {
                user.role = role;
            }
            if let Some(email) = email {
                user.email = email;
            }
            if let Some(avatar) = updates.avatar {
                user.avatar = avatar;
            }
            user.updated_at = Some(self.clock.now());
            Ok(user.clone())
        })
    }

    /// Removes the user and returns the removed record.
    #[trace]
    pub fn delete_user(&self, id: u64) -> RegistryResult<User> {
        self.transact(|users| {
            let index = users
                .iter()
                .position(|u| u.id == id)
                .ok_or(RegistryError::NotFound(id))?;
            Ok(users.remove(index))
        })
    }

    #[trace]
    pub fn get_user_by_id(&self, id: u64) -> RegistryResult<Option<User>> {
        Ok(self.load_or_seed()?.into_iter().find(|u| u.id == id))
    }

    #[trace]
    pub fn get_user_by_email(&self, email: &str) -> RegistryResult<Option<User>> {
        let email = normalize_email(email);
        Ok(self.load_or_seed()?.into_iter().find(|u| u.email == email))
    }

    #[trace]
    pub fn get_random_user(&self) -> RegistryResult<User> {
        let users = self.load_or_seed()?;
        users
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(RegistryError::EmptyRegistry)
    }

    #[trace]
    pub fn list_for_selection(&self) -> RegistryResult<Vec<SelectionOption>> {
        self.load_or_seed()?
            .into_iter()
            .map(|user| SelectionOption::from_user(user).map_err(RegistryError::from))
            .collect()
    }

    /// Replaces the collection with a fresh seed set.
    ///
    /// The seed records get new ids above every id issued so far, so retired
    /// ids (seed ids included) stay retired.
    #[trace]
    pub fn reset(&self) -> RegistryResult<Vec<User>> {
        self.with_write_lock(|| {
            let current_max = match self.store.get_json::<Vec<User>>(USERS_KEY)? {
                Some(users) => users.iter().map(|u| u.id).max().unwrap_or(0),
                None => 0,
            };
            let first_id = self.last_issued_id()?.max(current_max) + 1;
            let users = seed_users_from(first_id, self.clock.now());
            self.persist(&users)?;
            debug!("Reset user registry to {} seed users", users.len());
            Ok(users)
        })
    }

    /// Removes the stored collection, leaving the registry uninitialized.
    #[trace]
    pub fn clear(&self) -> RegistryResult<bool> {
        self.with_write_lock(|| {
            let removed = self.store.remove(USERS_KEY)?;
            debug!("Cleared user registry (existed: {})", removed);
            Ok(removed)
        })
    }

    fn load_or_seed(&self) -> RegistryResult<Vec<User>> {
        match self.store.get_json::<Vec<User>>(USERS_KEY)? {
            Some(users) => Ok(users),
            None => self.fresh_seed(),
        }
    }

    /// Seed set numbered after the high-water mark; ids 1..=3 on a new store.
    fn fresh_seed(&self) -> RegistryResult<Vec<User>> {
        Ok(seed_users_from(self.last_issued_id()? + 1, self.clock.now()))
    }

    fn last_issued_id(&self) -> RegistryResult<u64> {
        Ok(self.store.get_json::<u64>(LAST_ID_KEY)?.unwrap_or(0))
    }

    /// Writes the high-water mark first so a partial write can only skip ids.
    fn persist(&self, users: &[User]) -> RegistryResult<()> {
        let max_id = users.iter().map(|u| u.id).max().unwrap_or(0);
        if max_id > self.last_issued_id()? {
            self.store.set_json(LAST_ID_KEY, &max_id)?;
        }
        self.store.set_json(USERS_KEY, users)?;
        debug!("Persisted {} users", users.len());
        Ok(())
    }

    fn transact<T>(
        &self,
        f: impl FnOnce(&mut Vec<User>) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        self.with_write_lock(|| {
            let mut users = self.load_or_seed()?;
            let result = f(&mut users)?;
            self.persist(&users)?;
            Ok(result)
        })
    }

    fn with_write_lock<T>(&self, f: impl FnOnce() -> RegistryResult<T>) -> RegistryResult<T> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let _file_lock = match &self.lock_path {
            Some(path) => Some(FileLock::acquire_exclusive(path).map_err(RegistryError::Lock)?),
            None => None,
        };
        f()
    }
}
