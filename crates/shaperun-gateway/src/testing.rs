//! In-memory task runner for handler tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shaperun_core::{Parameters, Task, TaskError, TaskId, WorkerId, WorkerState};
use shaperun_pool::{
    OutcomeCounts, PoolError, PoolStats, TaskReport, TaskRunner, WorkerStats, ARTIFACT_EXTENSION,
};

pub const ARTIFACT_BODY: &str = "SKETCH-BREP 1\nsolids 0\nend\n";

/// Succeeds with [`ARTIFACT_BODY`] unless an outcome is queued.
pub struct StubRunner {
    pub dir: tempfile::TempDir,
    pub next: Mutex<Option<Result<Option<String>, TaskError>>>,
    pub submitted: Mutex<Vec<(String, Parameters)>>,
    pub outcomes: Mutex<OutcomeCounts>,
    pub stats: Mutex<PoolStats>,
}

impl Default for StubRunner {
    fn default() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            next: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            outcomes: Mutex::new(OutcomeCounts::default()),
            stats: Mutex::new(PoolStats {
                lifecycle: "persistent-structured".to_string(),
                capacity: 4,
                live: 0,
                idle: 0,
                busy: 0,
                restarts: 0,
                workers: Vec::new(),
            }),
        }
    }
}

impl StubRunner {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue(&self, outcome: Result<Option<String>, TaskError>) {
        *self.next.lock().unwrap() = Some(outcome);
    }

    pub fn add_worker(&self, state: WorkerState) {
        let mut stats = self.stats.lock().unwrap();
        let n = stats.workers.len() as u64 + 1;
        stats.workers.push(WorkerStats {
            id: WorkerId::numbered(n),
            state,
            pid: None,
            tasks_served: 0,
            started_at: Utc::now(),
        });
        stats.live += 1;
    }

    fn path_for(&self, id: &TaskId) -> PathBuf {
        self.dir.path().join(format!("{}.{}", id, ARTIFACT_EXTENSION))
    }
}

#[async_trait]
impl TaskRunner for StubRunner {
    async fn submit(&self, script: String, parameters: Parameters) -> TaskReport {
        self.submitted
            .lock()
            .unwrap()
            .push((script.clone(), parameters.clone()));

        let mut task = Task::new(script, parameters);
        task.output_path = self.path_for(&task.id);
        let outcome = self.next.lock().unwrap().take().unwrap_or(Ok(None));
        match outcome {
            Ok(material) => {
                std::fs::write(&task.output_path, ARTIFACT_BODY).unwrap();
                task.dispatch().unwrap();
                task.start().unwrap();
                task.succeed(material).unwrap();
                let artifact = Some(task.output_path.clone());
                TaskReport { task, artifact }
            }
            Err(err) => {
                task.fail(err).unwrap();
                TaskReport {
                    task,
                    artifact: None,
                }
            }
        }
    }

    fn artifact(&self, id: &TaskId) -> Result<Option<PathBuf>, PoolError> {
        if !id.is_path_safe() {
            return Err(PoolError::InvalidTaskId(id.to_string()));
        }
        let path = self.path_for(id);
        Ok(path.exists().then_some(path))
    }

    fn reap(&self, _age: Duration) -> Result<usize, PoolError> {
        Ok(0)
    }

    fn pool_stats(&self) -> PoolStats {
        self.stats.lock().unwrap().clone()
    }

    fn outcomes(&self) -> OutcomeCounts {
        self.outcomes.lock().unwrap().clone()
    }
}
