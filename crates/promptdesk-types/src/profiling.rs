use serde::{Deserialize, Serialize};

/// Aggregated timings of one span name across a command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionStats {
    pub name: String,
    pub calls: u32,
    pub total_us: u64,
    pub avg_us: u64,
    pub p90_us: u64,
    pub max_us: u64,
}
