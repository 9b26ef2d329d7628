//! Worker error types.

use std::path::PathBuf;

use shaperun_core::{CoreError, ErrorKind};
use shaperun_engine::EngineFailure;
use shaperun_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur while a worker handles a task or runs its loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The engine rejected the script or its result.
    #[error(transparent)]
    Engine(#[from] EngineFailure),

    /// A task input file could not be read.
    #[error("cannot read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The parameter file is not a flat JSON object.
    #[error("{0}")]
    Parameters(#[from] CoreError),

    /// Control channel failure.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Any other IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine panicked while handling the task.
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Engine(failure) => failure.kind(),
            WorkerError::Panicked(_) => ErrorKind::Engine,
            WorkerError::ReadInput { .. } | WorkerError::Io(_) => ErrorKind::Io,
            WorkerError::Parameters(_) => ErrorKind::InvalidInput,
            WorkerError::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// `"<Label>: <message>"`, the form written to sidecars.
    pub fn detail(&self) -> String {
        format!("{}: {}", self.kind().label(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_labels() {
        let err = WorkerError::from(EngineFailure::NullShape);
        assert_eq!(err.detail(), "EngineError: Result shape is null");

        let err = WorkerError::ReadInput {
            path: PathBuf::from("/ws/t_code.txt"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.detail().starts_with("IOError: cannot read /ws/t_code.txt"));

        let err = WorkerError::from(CoreError::InvalidInput("bad".into()));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
