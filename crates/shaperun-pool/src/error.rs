//! Pool error types.

use std::time::Duration;

use shaperun_core::{CoreError, ErrorKind, TaskError};
use shaperun_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised by the workspace, the supervisor and the dispatcher.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker did not complete its `READY` handshake.
    #[error("Worker failed to start: {0}")]
    Startup(String),

    /// No worker became free within the acquire timeout.
    #[error("No worker available within {0:?}")]
    Busy(Duration),

    /// A worker died (or was killed) while holding a task.
    #[error("Worker crashed: {0}")]
    ProcessCrash(String),

    /// A worker answered outside the protocol grammar.
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// Task id that cannot name a workspace file.
    #[error("Invalid task id: {0}")]
    InvalidTaskId(String),

    /// Rejected task input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The supervisor is shutting down.
    #[error("Pool is shutting down")]
    ShuttingDown,

    /// Domain error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Workspace IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Startup(_) => ErrorKind::Startup,
            PoolError::Busy(_) | PoolError::ShuttingDown => ErrorKind::Busy,
            PoolError::ProcessCrash(_) => ErrorKind::ProcessCrash,
            PoolError::Protocol(_) => ErrorKind::Protocol,
            PoolError::InvalidTaskId(_) | PoolError::InvalidInput(_) => ErrorKind::InvalidInput,
            PoolError::Core(CoreError::InvalidInput(_)) => ErrorKind::InvalidInput,
            PoolError::Core(_) => ErrorKind::Io,
            PoolError::Io(_) => ErrorKind::Io,
        }
    }

    /// Task failure carrying `"<Label>: <message>"` detail.
    pub fn to_task_error(&self) -> TaskError {
        TaskError::new(self.kind(), format!("{}: {}", self.kind().label(), self))
    }
}
