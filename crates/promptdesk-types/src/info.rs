use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInfo {
    pub path: String,
    pub current_bytes: u64,
    pub max_bytes: u64,
    pub entries: u64,
    pub users: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_path: Option<String>,
}
