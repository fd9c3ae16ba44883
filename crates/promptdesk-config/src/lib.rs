mod config;
mod lock;
mod paths;

pub use config::*;
pub use lock::*;
pub use paths::*;
