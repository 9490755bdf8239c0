use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,

    // Bitmaps keep explicit offsets until this many bits are set
    pub bitmap_switchover_count: usize,
    // String keys longer than this (bytes) are truncated before indexing
    pub default_string_key_size: usize,

    pub save_index_interval_secs: u64,
    pub free_memory_interval_secs: u64,
    pub memory_limit_mb: usize,

    pub filter_cache_size: usize,
    pub require_primary_view: bool,

    pub network: NetworkConfig,
}

impl Config {
    pub fn with_storage_path(path: impl Into<PathBuf>) -> Self {
        Config {
            storage_path: path.into(),
            ..Config::default()
        }
    }

    pub fn save_index_interval(&self) -> Duration {
        Duration::from_secs(self.save_index_interval_secs)
    }

    pub fn free_memory_interval(&self) -> Duration {
        Duration::from_secs(self.free_memory_interval_secs)
    }

    pub fn memory_limit_bytes(&self) -> usize {
        self.memory_limit_mb * 1024 * 1024
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            bitmap_switchover_count: 10,
            default_string_key_size: 60,
            save_index_interval_secs: 60,
            free_memory_interval_secs: 60,
            memory_limit_mb: 100,
            filter_cache_size: 256,
            require_primary_view: true,
            network: NetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub port: u16,
    pub buffer_size: usize,
    pub compress_data_over: usize,
    pub log_data_sizes_over: usize,
    pub max_frame_size: usize,
    pub min_threads: usize,
    pub idle_timeout_secs: u64,
}

impl NetworkConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            port: 90,
            buffer_size: 32 * 1024,
            compress_data_over: 1_000_000,
            log_data_sizes_over: 1_000_000,
            max_frame_size: 512 * 1024 * 1024,
            min_threads: num_cpus::get().max(4),
            idle_timeout_secs: 600,
        }
    }
}
