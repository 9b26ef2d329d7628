//! One supervised worker child process.

use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shaperun_core::{WorkerId, WorkerState};
use shaperun_protocol::{LineChannel, ProtocolError, EXIT, READY};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::WorkerCommand;
use crate::error::PoolError;

/// How long to wait for an exit status after a worker's stdout closes.
const EXIT_STATUS_WAIT: Duration = Duration::from_secs(1);

/// A persistent worker process and its control channel.
pub struct WorkerProcess {
    id: WorkerId,
    child: Child,
    pid: Option<u32>,
    channel: LineChannel<ChildStdout, ChildStdin>,
    state: WorkerState,
    tasks_served: u64,
    started_at: DateTime<Utc>,
}

impl WorkerProcess {
    /// Spawn a worker and wait for its `READY` line.
    pub async fn spawn(
        id: WorkerId,
        command: &WorkerCommand,
        startup_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let mut worker = Self::launch(id, command)?;
        worker.handshake(startup_timeout).await?;
        Ok(worker)
    }

    /// Start the process without waiting for it. The worker is `Warming`.
    pub fn launch(id: WorkerId, command: &WorkerCommand) -> Result<Self, PoolError> {
        debug!(worker_id = %id, program = %command.program.display(), "Spawning worker");

        let mut child = command.to_command(&[]).spawn().map_err(|e| {
            error!(worker_id = %id, error = %e, "Failed to spawn worker");
            PoolError::Startup(format!("cannot spawn {}: {}", command.program.display(), e))
        })?;
        let pid = child.id();

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                return Err(PoolError::Startup("worker stdio not captured".to_string()));
            }
        };
        if let Some(stderr) = child.stderr.take() {
            drain_stderr(id.clone(), stderr);
        }

        Ok(Self {
            id,
            child,
            pid,
            channel: LineChannel::new(stdout, stdin),
            state: WorkerState::Warming,
            tasks_served: 0,
            started_at: Utc::now(),
        })
    }

    /// Wait for `READY`.
    ///
    /// A worker that says anything else first, exits, or stays silent past
    /// `startup_timeout` is killed and reported as a startup failure.
    pub async fn handshake(&mut self, startup_timeout: Duration) -> Result<(), PoolError> {
        let failure = match self.channel.recv_line_timeout(startup_timeout).await {
            Ok(line) if line == READY => None,
            Ok(line) => Some(format!("expected {}, got '{}'", READY, line)),
            Err(ProtocolError::Timeout) => Some(format!("no {} within {:?}", READY, startup_timeout)),
            Err(e) => Some(format!("{} before {} ({})", e, READY, self.exit_detail().await)),
        };

        if let Some(reason) = failure {
            warn!(worker_id = %self.id, reason = %reason, "Worker startup failed");
            self.kill();
            return Err(PoolError::Startup(reason));
        }

        self.state = WorkerState::Ready;
        info!(worker_id = %self.id, pid = ?self.pid, "Worker ready");
        Ok(())
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn tasks_served(&self) -> u64 {
        self.tasks_served
    }

    /// Count a task whose reply decoded cleanly.
    pub fn record_served(&mut self) {
        self.tasks_served += 1;
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Send one request line and wait for its response line.
    ///
    /// Any failure other than a well-formed line leaves the worker `Dead`:
    /// a closed pipe, `timeout` elapsing (the worker is killed) or `kill`
    /// being notified.
    pub async fn exchange(
        &mut self,
        request: &str,
        timeout: Duration,
        kill: &Notify,
    ) -> Result<String, PoolError> {
        if !self.state.can_accept_tasks() {
            return Err(PoolError::ProcessCrash(format!(
                "worker {} is {}",
                self.id, self.state
            )));
        }
        self.state = WorkerState::Busy;

        if let Err(e) = self.channel.send_line(request).await {
            if !e.is_disconnect() {
                // Nothing was written; the worker is still usable.
                self.state = WorkerState::Ready;
                return Err(e.into());
            }
            self.kill();
            return Err(PoolError::ProcessCrash(format!(
                "write failed: {} ({})",
                e,
                self.exit_detail().await
            )));
        }

        let received = tokio::select! {
            received = self.channel.recv_line_timeout(timeout) => received,
            _ = kill.notified() => {
                warn!(worker_id = %self.id, "Killing worker on request");
                self.kill();
                return Err(PoolError::ProcessCrash("worker killed by supervisor".to_string()));
            }
        };

        match received {
            Ok(line) => {
                self.state = WorkerState::Ready;
                Ok(line)
            }
            Err(ProtocolError::Timeout) => {
                warn!(worker_id = %self.id, ?timeout, "Task timed out, killing worker");
                self.kill();
                Err(PoolError::ProcessCrash(format!(
                    "no response within {:?}; worker killed",
                    timeout
                )))
            }
            Err(e) => {
                let detail = self.exit_detail().await;
                self.kill();
                Err(PoolError::ProcessCrash(format!("{} ({})", e, detail)))
            }
        }
    }

    /// Mark the worker dead and kill it.
    pub fn kill(&mut self) {
        self.state = WorkerState::Dead;
        if let Err(e) = self.child.start_kill() {
            debug!(worker_id = %self.id, error = %e, "start_kill failed");
        }
    }

    /// True if the process has exited on its own.
    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the worker to exit, killing it after `grace`.
    pub async fn shutdown(mut self, grace: Duration) {
        if self.state != WorkerState::Dead {
            if let Err(e) = self.channel.send_line(EXIT).await {
                debug!(worker_id = %self.id, error = %e, "EXIT not delivered");
            }
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(worker_id = %self.id, %status, "Worker exited"),
            _ => {
                warn!(worker_id = %self.id, "Worker ignored EXIT, killing");
                let _ = self.child.kill().await;
            }
        }
        self.state = WorkerState::Dead;
    }

    /// `"exit status: N"` if the process has exited or exits shortly.
    async fn exit_detail(&mut self) -> String {
        match tokio::time::timeout(EXIT_STATUS_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => describe_status(status),
            _ => "worker still running".to_string(),
        }
    }
}

pub(crate) fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status: {}", code),
        None => format!("terminated: {}", status),
    }
}

/// Forward a worker's stderr lines to the log at `warn`.
fn drain_stderr<R>(worker_id: WorkerId, stderr: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        warn!(worker_id = %worker_id, stderr = %trimmed, "Worker stderr");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(worker_id = %worker_id, error = %e, "Stopped reading worker stderr");
                    break;
                }
            }
        }
    });
}

/// Outcome of a cold (one process per task) run.
#[derive(Debug)]
pub struct ColdOutcome {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run one cold worker with the task's file paths as arguments.
pub async fn run_cold(
    command: &WorkerCommand,
    code: &Path,
    args: &Path,
    output: &Path,
    timeout: Duration,
    kill: &Notify,
) -> Result<ColdOutcome, PoolError> {
    let mut child = command
        .to_command(&[code, args, output])
        .spawn()
        .map_err(|e| PoolError::Startup(format!("cannot spawn {}: {}", command.program.display(), e)))?;
    // No stdin in cold mode.
    drop(child.stdin.take());

    let stdout = child.stdout.take().map(read_all);
    let stderr = child.stderr.take().map(read_all);

    let status = tokio::select! {
        status = tokio::time::timeout(timeout, child.wait()) => match status {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(PoolError::ProcessCrash(format!(
                    "no exit within {:?}; worker killed",
                    timeout
                )));
            }
        },
        _ = kill.notified() => {
            let _ = child.kill().await;
            return Err(PoolError::ProcessCrash("worker killed by supervisor".to_string()));
        }
    };

    Ok(ColdOutcome {
        status,
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
    })
}

fn read_all<R>(mut reader: R) -> tokio::task::JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut text = String::new();
        let _ = reader.read_to_string(&mut text).await;
        text
    })
}

async fn collect(handle: Option<tokio::task::JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}
