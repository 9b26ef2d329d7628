//! Core domain errors and the task failure taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Core domain errors for shaperun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Why a task failed.
///
/// `Script`, `Engine` and `InvalidInput` are caused by the submitted script
/// or its parameters and are worth correcting on the client side. The rest
/// are service-side failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed request/response line; the worker is considered dead.
    Protocol,
    /// Missing `result`, unsupported result type, runtime error in the script.
    Script,
    /// Null or invalid shape, export failure.
    Engine,
    /// The worker died (or was killed) while holding the task.
    ProcessCrash,
    /// Workspace read/write failure.
    Io,
    /// Rejected before reaching a worker.
    InvalidInput,
    /// No worker became ready within the acquire timeout.
    Busy,
    /// A worker failed its warm-up handshake.
    Startup,
}

impl ErrorKind {
    const ALL: [ErrorKind; 8] = [
        ErrorKind::Protocol,
        ErrorKind::Script,
        ErrorKind::Engine,
        ErrorKind::ProcessCrash,
        ErrorKind::Io,
        ErrorKind::InvalidInput,
        ErrorKind::Busy,
        ErrorKind::Startup,
    ];

    /// Label used as the leading tag of error detail text.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Protocol => "ProtocolError",
            ErrorKind::Script => "ScriptError",
            ErrorKind::Engine => "EngineError",
            ErrorKind::ProcessCrash => "ProcessCrash",
            ErrorKind::Io => "IOError",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::Busy => "Busy",
            ErrorKind::Startup => "StartupError",
        }
    }

    /// True if the failure is the caller's to fix (bad script or input).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::Script | ErrorKind::Engine | ErrorKind::InvalidInput
        )
    }

    /// Recover the kind from detail text that starts with `"<label>:"`.
    pub fn from_detail(detail: &str) -> Option<ErrorKind> {
        let head = detail.trim_start();
        Self::ALL.into_iter().find(|kind| {
            head.strip_prefix(kind.label())
                .is_some_and(|rest| rest.starts_with(':'))
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A task failure: the taxonomy kind plus the captured detail text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn script(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Script, detail)
    }

    pub fn engine(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Engine, detail)
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, detail)
    }

    pub fn process_crash(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProcessCrash, detail)
    }

    pub fn io(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, detail)
    }

    /// Build from worker-written detail text (e.g. an `.err` sidecar),
    /// falling back to `default` when the text carries no kind tag.
    pub fn from_detail(detail: impl Into<String>, default: ErrorKind) -> Self {
        let detail = detail.into();
        let kind = ErrorKind::from_detail(&detail).unwrap_or(default);
        Self { kind, detail }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if ErrorKind::from_detail(&self.detail) == Some(self.kind) {
            f.write_str(&self.detail)
        } else {
            write!(f, "{}: {}", self.kind, self.detail)
        }
    }
}

impl std::error::Error for TaskError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_detail() {
        assert_eq!(
            ErrorKind::from_detail("ScriptError: variable 'result' not found"),
            Some(ErrorKind::Script)
        );
        assert_eq!(
            ErrorKind::from_detail("  EngineError: Result shape is null"),
            Some(ErrorKind::Engine)
        );
        assert_eq!(ErrorKind::from_detail("ScriptErrorish: nope"), None);
        assert_eq!(ErrorKind::from_detail("Traceback ..."), None);
    }

    #[test]
    fn test_client_errors() {
        assert!(ErrorKind::Script.is_client_error());
        assert!(ErrorKind::Engine.is_client_error());
        assert!(!ErrorKind::ProcessCrash.is_client_error());
        assert!(!ErrorKind::Io.is_client_error());
        assert!(!ErrorKind::Busy.is_client_error());
    }

    #[test]
    fn test_display_does_not_repeat_label() {
        let err = TaskError::from_detail("ScriptError: boom", ErrorKind::Engine);
        assert_eq!(err.kind, ErrorKind::Script);
        assert_eq!(err.to_string(), "ScriptError: boom");

        let err = TaskError::process_crash("worker exited");
        assert_eq!(err.to_string(), "ProcessCrash: worker exited");
    }
}
