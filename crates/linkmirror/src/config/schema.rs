use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::default_database_path;

const HOUR_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub version: String,
    #[serde(default = "default_database_path_or_relative")]
    pub database_path: PathBuf,
    /// Capacity of the queue between the producer and the workers; also the
    /// scan batch size.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Jobs created longer ago than this are no longer scanned.
    #[serde(default = "default_max_running_age_secs")]
    pub max_running_age_secs: u64,
    /// `created` jobs older than this are failed.
    #[serde(default = "default_age_out_secs")]
    pub age_out_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Pause after an empty or failed scan.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    #[serde(default)]
    pub hosts: Vec<HostEndpoint>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_database_path_or_relative() -> PathBuf {
    default_database_path().unwrap_or_else(|| PathBuf::from("linkmirror.db"))
}

fn default_queue_capacity() -> usize {
    16 * 1024
}

fn default_worker_count() -> usize {
    16
}

fn default_max_running_age_secs() -> u64 {
    7 * 24 * HOUR_SECS
}

fn default_age_out_secs() -> u64 {
    48 * HOUR_SECS
}

fn default_query_timeout_secs() -> u64 {
    60
}

fn default_idle_interval_ms() -> u64 {
    2000
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: default_database_path_or_relative(),
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            max_running_age_secs: default_max_running_age_secs(),
            age_out_secs: default_age_out_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            idle_interval_ms: default_idle_interval_ms(),
            hosts: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn max_running_age(&self) -> Duration {
        Duration::from_secs(self.max_running_age_secs)
    }

    pub fn age_out(&self) -> Duration {
        Duration::from_secs(self.age_out_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

/// An HTTP host integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEndpoint {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_host_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
