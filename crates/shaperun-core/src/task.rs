//! The Task type and its lifecycle transitions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, Parameters, TaskError, TaskId, TaskState};

/// A Task is one script execution request and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Script body.
    pub script: String,

    /// Named parameters bound into the script's scope.
    pub parameters: Parameters,

    /// Where the artifact is (or would be) written.
    pub output_path: PathBuf,

    /// Current lifecycle state.
    pub state: TaskState,

    /// Material tag reported by a successful script, upper-cased.
    pub material: Option<String>,

    /// Failure kind and detail if the task failed.
    pub error: Option<TaskError>,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// When the task reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new Task with a generated id.
    pub fn new(script: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            id: TaskId::generate(),
            script: script.into(),
            parameters,
            output_path: PathBuf::new(),
            state: TaskState::Created,
            material: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Builder method to set the output path.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Created → Dispatched.
    pub fn dispatch(&mut self) -> Result<(), CoreError> {
        self.transition(TaskState::Created, TaskState::Dispatched)
    }

    /// Dispatched → Running.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(TaskState::Dispatched, TaskState::Running)
    }

    /// Running → Succeeded.
    pub fn succeed(&mut self, material: Option<String>) -> Result<(), CoreError> {
        self.transition(TaskState::Running, TaskState::Succeeded)?;
        self.material = material;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Any non-terminal state → Failed.
    pub fn fail(&mut self, error: TaskError) -> Result<(), CoreError> {
        if self.state.is_terminal() {
            return Err(self.invalid(TaskState::Failed));
        }
        self.state = TaskState::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn transition(&mut self, from: TaskState, to: TaskState) -> Result<(), CoreError> {
        if self.state != from {
            return Err(self.invalid(to));
        }
        self.state = to;
        Ok(())
    }

    fn invalid(&self, to: TaskState) -> CoreError {
        CoreError::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}
