use std::time::SystemTime;
use serde::{Serialize, Deserialize};

/// Database statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    // General info
    pub uptime_secs: u64,
    pub start_time: SystemTime,

    // Storage metrics
    pub document_records: u32,
    pub file_records: u32,

    // View metrics
    pub views: Vec<ViewStats>,
    pub failed_views: Vec<FailedViewStats>,
    pub index_memory_bytes: usize,
    pub memory_limit_bytes: usize,

    pub active_transactions: usize,
    pub pending_rebuilds: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewStats {
    pub name: String,
    pub rows: u32,
    pub live_rows: usize,
    pub index_memory_bytes: usize,
    pub ready: bool,
}

/// A view left out at startup because its files could not be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedViewStats {
    pub name: String,
    pub error: String,
}

impl DatabaseStats {
    pub fn over_memory_limit(&self) -> bool {
        self.index_memory_bytes > self.memory_limit_bytes
    }
}
