//! Task dispatcher - the single entry point for running a script.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use shaperun_core::{ErrorKind, Parameters, Task, TaskError, TaskId, TaskState};
use tracing::{info, warn};

use crate::config::{WireProtocol, WorkerLifecycle};
use crate::error::PoolError;
use crate::supervisor::{PoolStats, Supervisor};
use crate::workspace::Workspace;

/// Final state of a submitted task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task: Task,

    /// Artifact path, present only on success.
    pub artifact: Option<PathBuf>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.task.state == TaskState::Succeeded
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.task.error.as_ref()
    }
}

/// Tasks finished since start, by outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutcomeCounts {
    pub succeeded: u64,
    pub failed: BTreeMap<ErrorKind, u64>,
}

/// What the gateway needs from the pool.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run `script` with `parameters` to completion. Never retries.
    async fn submit(&self, script: String, parameters: Parameters) -> TaskReport;

    /// Artifact of a previous task, if it is still on disk.
    fn artifact(&self, id: &TaskId) -> Result<Option<PathBuf>, PoolError>;

    /// Delete artifacts and sidecars older than `age`.
    fn reap(&self, age: Duration) -> Result<usize, PoolError>;

    fn pool_stats(&self) -> PoolStats;

    fn outcomes(&self) -> OutcomeCounts;
}

/// Materializes tasks, runs them through the supervisor and cleans up.
pub struct Dispatcher {
    workspace: Workspace,
    supervisor: Supervisor,
    outcomes: Mutex<OutcomeCounts>,
}

impl Dispatcher {
    pub fn new(workspace: Workspace, supervisor: Supervisor) -> Self {
        Self {
            workspace,
            supervisor,
            outcomes: Mutex::new(OutcomeCounts::default()),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    async fn run(&self, task: &mut Task) -> Result<Option<String>, TaskError> {
        let path_pair =
            self.supervisor.config().lifecycle == WorkerLifecycle::Persistent(WireProtocol::PathPair);
        if path_pair && !task.parameters.is_empty() {
            let err = PoolError::InvalidInput(
                "parameters are not supported by path-pair workers".to_string(),
            )
            .to_task_error();
            // No worker is involved, so the sidecar is written here.
            let paths = self.workspace.paths_for(&task.id);
            task.output_path = paths.output_path.clone();
            if let Err(e) = fs::write(paths.sidecar_path(), &err.detail) {
                warn!(task_id = %task.id, error = %e, "Failed to write sidecar");
            }
            return Err(err);
        }

        let materialized = self
            .workspace
            .materialize(task)
            .map_err(|e| e.to_task_error())?;
        task.output_path = materialized.output_path.clone();

        task.dispatch()
            .and_then(|()| task.start())
            .map_err(|e| PoolError::from(e).to_task_error())?;

        let outcome = self.supervisor.execute(&task.id, &materialized).await;
        materialized.finish();
        outcome
    }

    fn count(&self, task: &Task) {
        let mut outcomes = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &task.error {
            None => outcomes.succeeded += 1,
            Some(err) => *outcomes.failed.entry(err.kind).or_default() += 1,
        }
    }
}

#[async_trait]
impl TaskRunner for Dispatcher {
    async fn submit(&self, script: String, parameters: Parameters) -> TaskReport {
        let mut task = Task::new(script, parameters);
        info!(task_id = %task.id, params = task.parameters.len(), "Task submitted");

        let outcome = self.run(&mut task).await;
        let recorded = match outcome {
            Ok(material) => task.succeed(material),
            Err(err) => task.fail(err),
        };
        if let Err(e) = recorded {
            warn!(task_id = %task.id, error = %e, "Task state not recorded");
            let _ = task.fail(TaskError::new(ErrorKind::Engine, e.to_string()));
        }
        self.count(&task);

        match &task.error {
            None => info!(task_id = %task.id, material = ?task.material, "Task succeeded"),
            Some(err) => info!(task_id = %task.id, kind = %err.kind, "Task failed"),
        }

        let artifact = (task.state == TaskState::Succeeded).then(|| task.output_path.clone());
        TaskReport { task, artifact }
    }

    fn artifact(&self, id: &TaskId) -> Result<Option<PathBuf>, PoolError> {
        self.workspace.artifact_path(id)
    }

    fn reap(&self, age: Duration) -> Result<usize, PoolError> {
        self.workspace.reap_older_than(age)
    }

    fn pool_stats(&self) -> PoolStats {
        self.supervisor.stats()
    }

    fn outcomes(&self) -> OutcomeCounts {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
