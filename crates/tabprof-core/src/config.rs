use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::ConnectionConfig;

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_CANCEL_GRACE_MS: u64 = 5_000; // how long cancel() waits for a running task
pub const DEFAULT_STOP_GRACE_MS: u64 = 10_000; // how long stop() waits for in-flight tasks

/// Top-level config (tabprof.toml + TABPROF_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilerConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Source databases that can be profiled, addressed by `id`.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Worker pool and queue sizing for the task manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of tasks executing at the same time.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Capacity of the submission queue. Submissions beyond it are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cancel_grace_ms: DEFAULT_CANCEL_GRACE_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn cancel_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn stop_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stop_grace_ms)
    }
}

/// Location of the local result store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_cancel_grace_ms() -> u64 {
    DEFAULT_CANCEL_GRACE_MS
}
fn default_stop_grace_ms() -> u64 {
    DEFAULT_STOP_GRACE_MS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tabprof/tabprof.db", home)
}

impl ProfilerConfig {
    /// Load config from a TOML file with TABPROF_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `TABPROF_SCHEDULER__MAX_WORKERS=8`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(%path, "loading config");

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::ProfilerError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TABPROF_").split("__"))
    }

    /// Look up a configured connection by id.
    pub fn connection(&self, id: &str) -> crate::error::Result<&ConnectionConfig> {
        self.connections
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| crate::error::ProfilerError::UnknownConnection { id: id.to_string() })
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tabprof/tabprof.toml", home)
}
