use std::path::PathBuf;

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
}

pub fn get_config_dir() -> PathBuf {
    home_dir().join(".config").join("promptdesk")
}

pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.toml")
}

pub fn get_data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("promptdesk")
}

pub fn get_default_store_path() -> PathBuf {
    get_data_dir().join("store.lmdb")
}

pub fn get_cache_dir() -> PathBuf {
    home_dir().join(".cache").join("promptdesk")
}

pub fn get_log_dir() -> PathBuf {
    get_cache_dir().join("log")
}
