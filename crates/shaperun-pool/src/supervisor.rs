//! Process supervisor - owns the worker pool and drives one task at a time
//! through a worker.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shaperun_core::{ErrorKind, TaskError, TaskId, WorkerId, WorkerState};
use shaperun_protocol::{
    FailureKind, PathPairRequest, PathPairResponse, ProtocolError, StructuredRequest,
    StructuredResponse,
};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{PoolConfig, WireProtocol, WorkerLifecycle};
use crate::error::PoolError;
use crate::process::{self, describe_status, WorkerProcess};
use crate::workspace::TaskPaths;

/// Snapshot of one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub id: WorkerId,
    pub state: WorkerState,
    pub pid: Option<u32>,
    pub tasks_served: u64,
    pub started_at: DateTime<Utc>,
}

/// Snapshot of the pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub lifecycle: String,
    pub capacity: usize,
    /// Live (or running, in cold mode) worker processes.
    pub live: usize,
    pub idle: usize,
    pub busy: usize,
    /// Replacement workers started after a death.
    pub restarts: u64,
    pub workers: Vec<WorkerStats>,
}

/// What a worker said about a task, before it is checked against the disk.
enum Reply {
    Success(Option<String>),
    /// Structured `ERR`; detail is in the sidecar.
    Failed,
    /// Path-pair failure line, verbatim.
    FailedWith(FailureKind, String),
}

struct InFlight {
    worker_id: Option<WorkerId>,
    kill: Arc<Notify>,
}

#[derive(Default)]
struct Slots {
    /// Ready workers, least recently used first.
    idle: VecDeque<WorkerProcess>,
    /// Idle + busy + starting.
    live: usize,
    roster: BTreeMap<WorkerId, WorkerStats>,
    in_flight: HashMap<TaskId, InFlight>,
}

struct Inner {
    config: PoolConfig,
    slots: Mutex<Slots>,
    available: Notify,
    cold_slots: Semaphore,
    next_worker: AtomicU64,
    restarts: AtomicU64,
    shutting_down: AtomicBool,
}

enum Pick {
    Use(WorkerProcess),
    Spawn,
    Wait,
}

enum Returned {
    Idle,
    Retire(WorkerProcess),
    Dead { respawn: bool },
}

/// Owns the worker processes.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(config: PoolConfig) -> Self {
        let cold_slots = Semaphore::new(config.capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                slots: Mutex::new(Slots::default()),
                available: Notify::new(),
                cold_slots,
                next_worker: AtomicU64::new(0),
                restarts: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Pre-warm `min_workers` persistent workers.
    ///
    /// All startups run concurrently; the first failure is returned after
    /// the rest have settled.
    pub async fn start(&self) -> Result<(), PoolError> {
        if self.inner.config.lifecycle == WorkerLifecycle::Cold {
            return Ok(());
        }

        let wanted = {
            let mut slots = self.slots();
            let wanted = self
                .inner
                .config
                .effective_min_workers()
                .saturating_sub(slots.live);
            slots.live += wanted;
            wanted
        };

        let mut startups = JoinSet::new();
        for _ in 0..wanted {
            let supervisor = self.clone();
            startups.spawn(async move { supervisor.spawn_worker().await });
        }

        let mut first_error = None;
        while let Some(joined) = startups.join_next().await {
            match joined {
                Ok(Ok(worker)) => self.release(worker),
                Ok(Err(e)) => {
                    self.free_slot();
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    self.free_slot();
                    first_error.get_or_insert(PoolError::Startup(e.to_string()));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(workers = wanted, lifecycle = self.inner.config.lifecycle.label(), "Worker pool started");
                Ok(())
            }
        }
    }

    /// Run one materialized task to completion.
    ///
    /// On failure the sidecar at `paths` holds the same detail as the
    /// returned error, whichever side wrote it.
    pub async fn execute(
        &self,
        task_id: &TaskId,
        paths: &TaskPaths,
    ) -> Result<Option<String>, TaskError> {
        let kill = Arc::new(Notify::new());
        self.slots().in_flight.insert(
            task_id.clone(),
            InFlight {
                worker_id: None,
                kill: kill.clone(),
            },
        );

        let outcome = match self.inner.config.lifecycle {
            WorkerLifecycle::Persistent(wire) => {
                self.execute_persistent(task_id, wire, paths, &kill).await
            }
            WorkerLifecycle::Cold => self.execute_cold(paths, &kill).await,
        };

        self.slots().in_flight.remove(task_id);

        if let Err(err) = &outcome {
            record_failure(paths, err).await;
        }
        outcome
    }

    async fn execute_persistent(
        &self,
        task_id: &TaskId,
        wire: WireProtocol,
        paths: &TaskPaths,
        kill: &Notify,
    ) -> Result<Option<String>, TaskError> {
        let request = match wire {
            WireProtocol::Structured => {
                StructuredRequest::new(&paths.code_path, &paths.args_path, &paths.output_path)
                    .encode()
            }
            WireProtocol::PathPair => {
                PathPairRequest::new(&paths.code_path, &paths.output_path).encode()
            }
        }
        .map_err(|e| PoolError::from(e).to_task_error())?;

        let mut worker = self.acquire().await.map_err(|e| e.to_task_error())?;
        self.mark_busy(task_id, &worker);
        debug!(task_id = %task_id, worker_id = %worker.id(), "Dispatching task");

        let outcome = match worker
            .exchange(&request, self.inner.config.task_timeout, kill)
            .await
        {
            Ok(line) => match decode_reply(wire, &line) {
                Ok(reply) => {
                    worker.record_served();
                    Ok(settle(reply, paths))
                }
                Err(e) => {
                    warn!(worker_id = %worker.id(), line = %line, "Protocol violation, killing worker");
                    worker.kill();
                    Err(PoolError::from(e))
                }
            },
            Err(e) => {
                warn!(task_id = %task_id, worker_id = %worker.id(), error = %e, "Worker lost while holding task");
                Err(e)
            }
        };

        self.release(worker);
        outcome.map_err(|e| e.to_task_error())?
    }

    async fn execute_cold(
        &self,
        paths: &TaskPaths,
        kill: &Notify,
    ) -> Result<Option<String>, TaskError> {
        let config = &self.inner.config;
        let _permit =
            match tokio::time::timeout(config.acquire_timeout, self.inner.cold_slots.acquire())
                .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(PoolError::ShuttingDown.to_task_error()),
                Err(_) => return Err(PoolError::Busy(config.acquire_timeout).to_task_error()),
            };

        let outcome = process::run_cold(
            &config.command,
            &paths.code_path,
            &paths.args_path,
            &paths.output_path,
            config.task_timeout,
            kill,
        )
        .await
        .map_err(|e| e.to_task_error())?;

        if outcome.status.success() {
            let last = outcome
                .stdout
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .last()
                .unwrap_or_default();
            return match PathPairResponse::decode(last) {
                Ok(PathPairResponse::Success { material }) => {
                    settle(Reply::Success(material), paths)
                }
                _ => Err(PoolError::from(ProtocolError::UnexpectedResponse(last.to_string()))
                    .to_task_error()),
            };
        }

        match paths.read_sidecar() {
            Some(detail) => Err(TaskError::from_detail(detail, ErrorKind::Engine)),
            None => {
                let mut detail = format!(
                    "{}: worker {}",
                    ErrorKind::ProcessCrash.label(),
                    describe_status(outcome.status)
                );
                let stderr = outcome.stderr.trim();
                if !stderr.is_empty() {
                    detail.push('\n');
                    detail.push_str(stderr);
                }
                Err(TaskError::process_crash(detail))
            }
        }
    }

    /// Take the least recently used ready worker, spawning one if the pool
    /// has room, else wait up to `acquire_timeout`.
    async fn acquire(&self) -> Result<WorkerProcess, PoolError> {
        let timeout = self.inner.config.acquire_timeout;
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let pick = {
                let mut slots = self.slots();
                if self.is_shutting_down() {
                    return Err(PoolError::ShuttingDown);
                }
                let mut found = None;
                while let Some(mut worker) = slots.idle.pop_front() {
                    if worker.has_exited() {
                        warn!(worker_id = %worker.id(), "Idle worker exited, discarding");
                        slots.roster.remove(worker.id());
                        slots.live -= 1;
                        continue;
                    }
                    found = Some(worker);
                    break;
                }
                match found {
                    Some(worker) => Pick::Use(worker),
                    None if slots.live < self.inner.config.capacity => {
                        slots.live += 1;
                        Pick::Spawn
                    }
                    None => Pick::Wait,
                }
            };

            match pick {
                Pick::Use(worker) => return Ok(worker),
                Pick::Spawn => {
                    return match self.spawn_worker().await {
                        Ok(worker) => Ok(worker),
                        Err(e) => {
                            self.free_slot();
                            Err(e)
                        }
                    }
                }
                Pick::Wait => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(PoolError::Busy(timeout));
                    }
                }
            }
        }
    }

    /// Start a worker in a slot the caller has already reserved.
    async fn spawn_worker(&self) -> Result<WorkerProcess, PoolError> {
        let id = WorkerId::numbered(self.inner.next_worker.fetch_add(1, Ordering::SeqCst) + 1);
        self.slots().roster.insert(
            id.clone(),
            WorkerStats {
                id: id.clone(),
                state: WorkerState::Starting,
                pid: None,
                tasks_served: 0,
                started_at: Utc::now(),
            },
        );

        let spawned = match WorkerProcess::launch(id.clone(), &self.inner.config.command) {
            Ok(mut worker) => {
                self.slots().roster.insert(id.clone(), snapshot(&worker));
                worker
                    .handshake(self.inner.config.startup_timeout)
                    .await
                    .map(|()| worker)
            }
            Err(e) => Err(e),
        };

        let mut slots = self.slots();
        match &spawned {
            Ok(worker) => {
                slots.roster.insert(id, snapshot(worker));
            }
            Err(_) => {
                slots.roster.remove(&id);
            }
        }
        spawned
    }

    fn free_slot(&self) {
        {
            let mut slots = self.slots();
            slots.live = slots.live.saturating_sub(1);
        }
        self.inner.available.notify_one();
    }

    fn mark_busy(&self, task_id: &TaskId, worker: &WorkerProcess) {
        let mut slots = self.slots();
        if let Some(entry) = slots.roster.get_mut(worker.id()) {
            entry.state = WorkerState::Busy;
        }
        if let Some(flight) = slots.in_flight.get_mut(task_id) {
            flight.worker_id = Some(worker.id().clone());
        }
    }

    /// Return a worker after a task (or a startup). Ready workers go back to
    /// the idle queue; dead ones free their slot and may be replaced.
    fn release(&self, worker: WorkerProcess) {
        let returned = {
            let mut slots = self.slots();
            if worker.state() == WorkerState::Ready && !self.is_shutting_down() {
                slots.roster.insert(worker.id().clone(), snapshot(&worker));
                slots.idle.push_back(worker);
                Returned::Idle
            } else {
                slots.roster.remove(worker.id());
                slots.live = slots.live.saturating_sub(1);
                if worker.state() == WorkerState::Ready {
                    Returned::Retire(worker)
                } else {
                    info!(worker_id = %worker.id(), served = worker.tasks_served(), "Worker dead");
                    Returned::Dead {
                        respawn: self.inner.config.respawn_on_crash && !self.is_shutting_down(),
                    }
                }
            }
        };
        self.inner.available.notify_one();

        match returned {
            Returned::Idle => {}
            Returned::Retire(worker) => {
                tokio::spawn(worker.shutdown(self.inner.config.shutdown_grace));
            }
            Returned::Dead { respawn: true } => self.spawn_replacement(),
            Returned::Dead { respawn: false } => {}
        }
    }

    /// Refill a freed slot in the background.
    fn spawn_replacement(&self) {
        {
            let mut slots = self.slots();
            if slots.live >= self.inner.config.capacity {
                return;
            }
            slots.live += 1;
        }
        self.inner.restarts.fetch_add(1, Ordering::SeqCst);

        let supervisor = self.clone();
        tokio::spawn(async move {
            match supervisor.spawn_worker().await {
                Ok(worker) => {
                    info!(worker_id = %worker.id(), "Replacement worker ready");
                    supervisor.release(worker);
                }
                Err(e) => {
                    warn!(error = %e, "Replacement worker failed to start; slot left empty");
                    supervisor.free_slot();
                }
            }
        });
    }

    /// Kill the worker holding `task_id`. The task then fails as a crash.
    ///
    /// Returns false if the task is not in flight.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let slots = self.slots();
        match slots.in_flight.get(task_id) {
            Some(flight) => {
                info!(task_id = %task_id, worker_id = ?flight.worker_id, "Cancelling task");
                flight.kill.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> PoolStats {
        let config = &self.inner.config;
        let slots = self.slots();
        let workers: Vec<WorkerStats> = slots.roster.values().cloned().collect();

        let (live, busy) = match config.lifecycle {
            WorkerLifecycle::Cold => {
                let running = config.capacity - self.inner.cold_slots.available_permits();
                (running, running)
            }
            WorkerLifecycle::Persistent(_) => (
                slots.live,
                workers.iter().filter(|w| w.state == WorkerState::Busy).count(),
            ),
        };

        PoolStats {
            lifecycle: config.lifecycle.label().to_string(),
            capacity: config.capacity,
            live,
            idle: slots.idle.len(),
            busy,
            restarts: self.inner.restarts.load(Ordering::SeqCst),
            workers,
        }
    }

    /// Stop accepting tasks, send `EXIT` to idle workers and wait for them.
    ///
    /// Busy workers are retired the same way when their task completes.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.cold_slots.close();

        let idle: Vec<WorkerProcess> = {
            let mut slots = self.slots();
            let idle: Vec<WorkerProcess> = slots.idle.drain(..).collect();
            for worker in &idle {
                slots.roster.remove(worker.id());
            }
            slots.live = slots.live.saturating_sub(idle.len());
            idle
        };
        self.inner.available.notify_waiters();

        info!(workers = idle.len(), "Shutting down worker pool");
        let grace = self.inner.config.shutdown_grace;
        let mut exits = JoinSet::new();
        for worker in idle {
            exits.spawn(worker.shutdown(grace));
        }
        while exits.join_next().await.is_some() {}
    }
}

fn snapshot(worker: &WorkerProcess) -> WorkerStats {
    WorkerStats {
        id: worker.id().clone(),
        state: worker.state(),
        pid: worker.pid(),
        tasks_served: worker.tasks_served(),
        started_at: worker.started_at(),
    }
}

fn decode_reply(wire: WireProtocol, line: &str) -> Result<Reply, ProtocolError> {
    Ok(match wire {
        WireProtocol::Structured => match StructuredResponse::decode(line)? {
            StructuredResponse::Ok { material } => Reply::Success(material),
            StructuredResponse::Err => Reply::Failed,
        },
        WireProtocol::PathPair => match PathPairResponse::decode(line)? {
            PathPairResponse::Success { material } => Reply::Success(material),
            PathPairResponse::Failure { kind, line } => Reply::FailedWith(kind, line),
        },
    })
}

/// Check a reply against the workspace so success always means an
/// artifact and failure always means a sidecar.
fn settle(reply: Reply, paths: &TaskPaths) -> Result<Option<String>, TaskError> {
    match reply {
        Reply::Success(material) if paths.has_artifact() => Ok(material),
        Reply::Success(_) => Err(TaskError::engine(format!(
            "{}: worker reported success but wrote no artifact at {}",
            ErrorKind::Engine.label(),
            paths.output_path.display()
        ))),
        Reply::Failed => Err(match paths.read_sidecar() {
            Some(detail) => TaskError::from_detail(detail, ErrorKind::Engine),
            None => TaskError::engine(format!(
                "{}: worker reported failure without detail",
                ErrorKind::Engine.label()
            )),
        }),
        Reply::FailedWith(kind, line) => {
            let fallback = match kind {
                FailureKind::Error | FailureKind::Exception => ErrorKind::Script,
                FailureKind::Fatal => ErrorKind::Engine,
            };
            // A labelled sidecar from the worker outranks the line prefix.
            Err(match paths.read_sidecar() {
                Some(detail) if ErrorKind::from_detail(&detail).is_some() => {
                    TaskError::from_detail(detail, fallback)
                }
                _ => TaskError::new(fallback, line),
            })
        }
    }
}

/// Make the sidecar the canonical record of a failure and drop any artifact.
async fn record_failure(paths: &TaskPaths, err: &TaskError) {
    if let Err(e) = tokio::fs::remove_file(&paths.output_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(output = %paths.output_path.display(), error = %e, "Failed to remove artifact");
        }
    }
    let sidecar = paths.sidecar_path();
    if tokio::fs::try_exists(&sidecar).await.unwrap_or(false) {
        return;
    }
    if let Err(e) = tokio::fs::write(&sidecar, &err.detail).await {
        warn!(sidecar = %sidecar.display(), error = %e, "Failed to write sidecar");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::WorkerCommand;
    use crate::workspace::Workspace;
    use shaperun_core::{Parameters, Task};
    use std::time::Duration;

    /// Structured stub: writes an artifact and answers `OK|STEEL`, or
    /// answers `ERR` with a sidecar when the code file says `fail`.
    const STRUCTURED_STUB: &str = r#"
echo READY
while read line; do
  [ "$line" = EXIT ] && exit 0
  out=$(printf '%s' "$line" | sed 's/.*"outputPath":"\([^"]*\)".*/\1/')
  code=$(printf '%s' "$line" | sed 's/.*"codeFile":"\([^"]*\)".*/\1/')
  case "$(cat "$code")" in
    fail) printf 'ScriptError: boom' > "$out.err"; echo ERR ;;
    crash) exit 7 ;;
    hang) sleep 30 ;;
    garbage) echo WAT ;;
    *) printf 'brep' > "$out"; echo 'OK|STEEL' ;;
  esac
done
"#;

    fn stub_config(script: &str) -> PoolConfig {
        PoolConfig::new(
            WorkerCommand::new("/bin/sh").with_arg("-c").with_arg(script),
            WorkerLifecycle::Persistent(WireProtocol::Structured),
        )
        .with_capacity(1)
        .with_startup_timeout(Duration::from_secs(5))
        .with_task_timeout(Duration::from_secs(5))
        .with_acquire_timeout(Duration::from_millis(300))
        .with_shutdown_grace(Duration::from_secs(1))
    }

    fn materialize(ws: &Workspace, script: &str) -> crate::workspace::MaterializedTask {
        let task = Task::new(script, Parameters::new());
        ws.materialize(&task).unwrap()
    }

    async fn wait_for_idle(supervisor: &Supervisor, idle: usize) {
        for _ in 0..100 {
            if supervisor.stats().idle == idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("pool never reached {} idle workers", idle);
    }

    #[tokio::test]
    async fn test_success_and_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let supervisor = Supervisor::new(stub_config(STRUCTURED_STUB));
        supervisor.start().await.unwrap();

        for _ in 0..3 {
            let task = materialize(&ws, "ok");
            let material = supervisor.execute(&task.task_id, &task).await.unwrap();
            assert_eq!(material.as_deref(), Some("STEEL"));
            assert!(task.has_artifact());
        }

        let stats = supervisor.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.workers.len(), 1);
        assert_eq!(stats.workers[0].tasks_served, 3);
        assert_eq!(stats.restarts, 0);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_err_reads_sidecar_and_keeps_worker() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let supervisor = Supervisor::new(stub_config(STRUCTURED_STUB));

        let task = materialize(&ws, "fail");
        let err = supervisor.execute(&task.task_id, &task).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Script);
        assert_eq!(err.detail, "ScriptError: boom");
        assert_eq!(supervisor.stats().workers[0].state, WorkerState::Ready);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_crash_fails_task_and_respawns() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let supervisor = Supervisor::new(stub_config(STRUCTURED_STUB));
        supervisor.start().await.unwrap();

        let task = materialize(&ws, "crash");
        let err = supervisor.execute(&task.task_id, &task).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProcessCrash);
        assert!(err.detail.contains("exit status: 7"));
        assert_eq!(task.read_sidecar().as_deref(), Some(err.detail.as_str()));

        wait_for_idle(&supervisor, 1).await;
        assert_eq!(supervisor.stats().restarts, 1);

        let task = materialize(&ws, "ok");
        assert!(supervisor.execute(&task.task_id, &task).await.is_ok());
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_protocol_violation_kills_worker() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let supervisor = Supervisor::new(stub_config(STRUCTURED_STUB).with_respawn_on_crash(false));

        let task = materialize(&ws, "garbage");
        let err = supervisor.execute(&task.task_id, &task).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Protocol);
        assert!(err.detail.contains("WAT"));
        assert_eq!(supervisor.stats().live, 0);
        assert!(supervisor.stats().workers.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_kills_worker() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let supervisor = Supervisor::new(stub_config(STRUCTURED_STUB));
        supervisor.start().await.unwrap();

        let task = materialize(&ws, "hang");
        let id = task.task_id.clone();
        let running = {
            let supervisor = supervisor.clone();
            let paths = task.paths().clone();
            tokio::spawn(async move { supervisor.execute(&paths.task_id, &paths).await })
        };

        for _ in 0..100 {
            if supervisor.stats().busy == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(supervisor.cancel(&id));

        let err = running.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProcessCrash);
        assert!(!supervisor.cancel(&id));
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_busy_when_saturated() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let supervisor = Supervisor::new(stub_config(STRUCTURED_STUB));
        supervisor.start().await.unwrap();

        let hung = materialize(&ws, "hang");
        let running = {
            let supervisor = supervisor.clone();
            let paths = hung.paths().clone();
            tokio::spawn(async move { supervisor.execute(&paths.task_id, &paths).await })
        };
        for _ in 0..100 {
            if supervisor.stats().busy == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let task = materialize(&ws, "ok");
        let err = supervisor.execute(&task.task_id, &task).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Busy);

        supervisor.cancel(&hung.task_id);
        let _ = running.await;
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_roster_shows_warming_worker() {
        let supervisor = Supervisor::new(stub_config(&format!("sleep 1; {}", STRUCTURED_STUB)));
        let starting = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.start().await })
        };

        let mut seen = None;
        for _ in 0..50 {
            if let Some(worker) = supervisor.stats().workers.first() {
                if worker.state == WorkerState::Warming {
                    seen = Some(worker.clone());
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let warming = seen.expect("worker never reported warming");
        assert!(warming.pid.is_some());

        starting.await.unwrap().unwrap();
        assert_eq!(supervisor.stats().workers[0].state, WorkerState::Ready);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_startup_timeout_is_fatal() {
        let supervisor = Supervisor::new(
            stub_config("sleep 30").with_startup_timeout(Duration::from_millis(200)),
        );
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, PoolError::Startup(_)));
        assert_eq!(supervisor.stats().live, 0);
    }

    #[tokio::test]
    async fn test_path_pair_failure_line_becomes_sidecar() {
        let script = r#"
echo READY
while read line; do
  echo 'EXCEPTION: line 2: bad pile || at pier'
done
"#;
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let mut config = stub_config(script);
        config.lifecycle = WorkerLifecycle::Persistent(WireProtocol::PathPair);
        let supervisor = Supervisor::new(config);

        let task = materialize(&ws, "whatever");
        let err = supervisor.execute(&task.task_id, &task).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Script);
        assert_eq!(
            task.read_sidecar().as_deref(),
            Some("EXCEPTION: line 2: bad pile || at pier")
        );
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_path_pair_labelled_sidecar_sets_kind() {
        let script = r#"
echo READY
while read line; do
  printf 'IOError: cannot read script' > "${line#*|}.err"
  echo 'FATAL: cannot read script'
done
"#;
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let mut config = stub_config(script);
        config.lifecycle = WorkerLifecycle::Persistent(WireProtocol::PathPair);
        let supervisor = Supervisor::new(config);

        let task = materialize(&ws, "whatever");
        let err = supervisor.execute(&task.task_id, &task).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.detail, "IOError: cannot read script");
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_success_without_artifact_is_engine_error() {
        let script = "echo READY; while read line; do echo OK; done";
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let supervisor = Supervisor::new(stub_config(script));

        let task = materialize(&ws, "ok");
        let err = supervisor.execute(&task.task_id, &task).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Engine);
        assert!(task.read_sidecar().is_some());
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_cold_nonzero_exit_without_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let config = PoolConfig::new(
            WorkerCommand::new("/bin/sh")
                .with_arg("-c")
                .with_arg("echo 'kernel segfault' >&2; exit 139")
                .with_arg("cold-stub"),
            WorkerLifecycle::Cold,
        )
        .with_capacity(1);
        let supervisor = Supervisor::new(config);

        let task = materialize(&ws, "anything");
        let err = supervisor.execute(&task.task_id, &task).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProcessCrash);
        assert!(err.detail.contains("exit status: 139"));
        assert!(err.detail.contains("kernel segfault"));
        assert!(task.read_sidecar().unwrap().contains("kernel segfault"));
    }
}
