//! Lifecycle states for Tasks and Worker processes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a Task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Task created by the dispatcher, inputs not yet handed to the pool.
    #[default]
    Created,
    /// Handed to the supervisor, waiting for a ready worker.
    Dispatched,
    /// Request line sent to a worker.
    Running,
    /// Artifact written.
    Succeeded,
    /// Error detail captured.
    Failed,
}

impl TaskState {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Protocol state of a worker process.
///
/// `Starting → Warming → Ready → Busy → Ready → … → Dead`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// Slot reserved, process being spawned.
    #[default]
    Starting,
    /// Process running, waiting for its READY line.
    Warming,
    /// Idle and handshaken.
    Ready,
    /// Holding exactly one task.
    Busy,
    /// Pipe closed, exited, killed or violated the protocol.
    Dead,
}

impl WorkerState {
    /// Returns true if the worker can be handed a task right now.
    pub fn can_accept_tasks(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns true if the worker has completed its handshake and is alive.
    pub fn is_handshaken(&self) -> bool {
        matches!(self, Self::Ready | Self::Busy)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Created.is_terminal());
    }

    #[test]
    fn test_worker_states() {
        assert!(WorkerState::Ready.can_accept_tasks());
        assert!(!WorkerState::Busy.can_accept_tasks());
        assert!(!WorkerState::Warming.is_handshaken());
        assert!(WorkerState::Busy.is_handshaken());
    }

    #[test]
    fn test_serialized_form() {
        let json = serde_json::to_string(&WorkerState::Ready).unwrap();
        assert_eq!(json, "\"READY\"");
    }
}
