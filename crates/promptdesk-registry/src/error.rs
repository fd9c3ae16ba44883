use promptdesk_store::StoreError;
use thiserror::Error;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("a user with email {0} already exists")]
    DuplicateEmail(String),
    #[error("user {0} not found")]
    NotFound(u64),
    #[error("registry has no users")]
    EmptyRegistry,
    #[error("invalid user: {0}")]
    InvalidInput(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("lock error: {0}")]
    Lock(#[source] std::io::Error),
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::Store(StoreError::Serialization(e))
    }
}
