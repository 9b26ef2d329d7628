//! Pool configuration.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Wire variant spoken by persistent workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireProtocol {
    /// JSON task lines, `OK`/`ERR` responses, detail in sidecars.
    #[default]
    Structured,
    /// `script|output` lines, detail on the response line.
    PathPair,
}

/// How worker processes are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLifecycle {
    /// Long-lived workers handling many tasks.
    Persistent(WireProtocol),
    /// One process per task; inputs on the command line.
    Cold,
}

impl Default for WorkerLifecycle {
    fn default() -> Self {
        Self::Persistent(WireProtocol::default())
    }
}

impl WorkerLifecycle {
    pub fn label(&self) -> &'static str {
        match self {
            WorkerLifecycle::Persistent(WireProtocol::Structured) => "persistent-structured",
            WorkerLifecycle::Persistent(WireProtocol::PathPair) => "persistent-path-pair",
            WorkerLifecycle::Cold => "cold",
        }
    }

    /// Subcommand of `shaperun-worker` implementing this lifecycle.
    pub fn worker_subcommand(&self) -> &'static str {
        match self {
            WorkerLifecycle::Persistent(WireProtocol::Structured) => "serve",
            WorkerLifecycle::Persistent(WireProtocol::PathPair) => "paths",
            WorkerLifecycle::Cold => "run",
        }
    }
}

/// Program and arguments used to start a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerCommand {
    /// Executable path or name.
    pub program: PathBuf,

    /// Leading arguments.
    pub args: Vec<OsString>,

    /// Extra environment variables.
    pub envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// The `shaperun-worker` binary at `program`, in `lifecycle`'s mode.
    pub fn shaperun_worker(program: impl Into<PathBuf>, lifecycle: WorkerLifecycle) -> Self {
        Self::new(program).with_arg(lifecycle.worker_subcommand())
    }

    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Command with all three stdio streams piped.
    pub(crate) fn to_command(&self, extra_args: &[&Path]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(extra_args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live workers (persistent) or concurrent processes (cold).
    pub capacity: usize,

    /// Workers started by `Supervisor::start`. Defaults to `capacity`.
    pub min_workers: Option<usize>,

    /// Worker lifecycle and wire variant.
    pub lifecycle: WorkerLifecycle,

    /// How to start a worker.
    pub command: WorkerCommand,

    /// How long a new worker has to announce `READY`.
    pub startup_timeout: Duration,

    /// How long a task may run before its worker is killed.
    pub task_timeout: Duration,

    /// How long a dispatch waits for a free worker before failing `Busy`.
    pub acquire_timeout: Duration,

    /// How long `shutdown` waits after `EXIT` before killing.
    pub shutdown_grace: Duration,

    /// Start a replacement when a worker dies.
    pub respawn_on_crash: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let lifecycle = WorkerLifecycle::default();
        Self {
            capacity: 4,
            min_workers: None,
            lifecycle,
            command: WorkerCommand::shaperun_worker("shaperun-worker", lifecycle),
            startup_timeout: Duration::from_secs(30),
            task_timeout: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            respawn_on_crash: true,
        }
    }
}

impl PoolConfig {
    /// Config for `command` in `lifecycle`, defaults elsewhere.
    pub fn new(command: WorkerCommand, lifecycle: WorkerLifecycle) -> Self {
        Self {
            command,
            lifecycle,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = Some(min_workers);
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_respawn_on_crash(mut self, respawn: bool) -> Self {
        self.respawn_on_crash = respawn;
        self
    }

    /// Workers to pre-warm, never more than `capacity`.
    pub fn effective_min_workers(&self) -> usize {
        self.min_workers.unwrap_or(self.capacity).min(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.startup_timeout, Duration::from_secs(30));
        assert_eq!(config.task_timeout, Duration::from_secs(300));
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert!(config.respawn_on_crash);
        assert_eq!(config.effective_min_workers(), config.capacity);
        assert_eq!(config.command.args, vec![OsString::from("serve")]);
    }

    #[test]
    fn test_min_workers_clamped() {
        let config = PoolConfig::default().with_capacity(2).with_min_workers(9);
        assert_eq!(config.effective_min_workers(), 2);
        assert_eq!(PoolConfig::default().with_capacity(0).capacity, 1);
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(
            WorkerLifecycle::Persistent(WireProtocol::PathPair).worker_subcommand(),
            "paths"
        );
        assert_eq!(WorkerLifecycle::Cold.worker_subcommand(), "run");
    }
}
