//! Gateway configuration.

use std::path::PathBuf;
use std::time::Duration;

use shaperun_pool::{PoolConfig, WorkerCommand, WorkerLifecycle};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address.
    pub bind_addr: String,

    /// Directory holding task inputs, artifacts and sidecars.
    pub workspace_dir: PathBuf,

    /// Path of the `shaperun-worker` binary.
    pub worker_program: PathBuf,

    /// Worker lifecycle and wire variant.
    pub lifecycle: WorkerLifecycle,

    /// Maximum live workers.
    pub capacity: usize,

    pub startup_timeout: Duration,
    pub task_timeout: Duration,
    pub acquire_timeout: Duration,

    /// Artifacts and sidecars older than this are deleted.
    pub artifact_ttl: Duration,

    /// How often the retention sweep runs.
    pub reap_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            workspace_dir: PathBuf::from("workspace"),
            worker_program: PathBuf::from("shaperun-worker"),
            lifecycle: pool.lifecycle,
            capacity: pool.capacity,
            startup_timeout: pool.startup_timeout,
            task_timeout: pool.task_timeout,
            acquire_timeout: pool.acquire_timeout,
            artifact_ttl: Duration::from_secs(24 * 60 * 60),
            reap_interval: Duration::from_secs(10 * 60),
        }
    }
}

impl Config {
    /// Pool settings derived from this config.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(
            WorkerCommand::shaperun_worker(&self.worker_program, self.lifecycle),
            self.lifecycle,
        )
        .with_capacity(self.capacity)
        .with_startup_timeout(self.startup_timeout)
        .with_task_timeout(self.task_timeout)
        .with_acquire_timeout(self.acquire_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_pool_config_uses_worker_subcommand() {
        let config = Config {
            lifecycle: WorkerLifecycle::Cold,
            capacity: 2,
            ..Config::default()
        };
        let pool = config.pool_config();
        assert_eq!(pool.capacity, 2);
        assert_eq!(pool.lifecycle, WorkerLifecycle::Cold);
        assert_eq!(pool.command.program, PathBuf::from("shaperun-worker"));
        assert_eq!(pool.command.args, vec![OsString::from("run")]);
    }
}
