//! Error types for shape engines.

use shaperun_core::ErrorKind;
use thiserror::Error;

/// Failures raised while running a script or exporting its result.
#[derive(Debug, Error)]
pub enum EngineFailure {
    /// The script finished without binding `result`.
    #[error("variable 'result' not found in script")]
    MissingResult,

    /// `result` is bound to something that is not a shape variant.
    #[error("Unsupported result type: {0}")]
    UnsupportedResult(String),

    /// The extracted shape is null/empty.
    #[error("Result shape is null")]
    NullShape,

    /// Syntax or runtime error inside the script.
    #[error("line {line}: {message}")]
    Script { line: usize, message: String },

    /// Serializing the shape to disk failed.
    #[error("export failed: {0}")]
    Export(String),

    /// Reading a previously exported artifact failed.
    #[error("import failed: {0}")]
    Import(String),

    /// The engine could not initialize.
    #[error("warm-up failed: {0}")]
    WarmUp(String),
}

impl EngineFailure {
    pub fn script(line: usize, message: impl Into<String>) -> Self {
        Self::Script {
            line,
            message: message.into(),
        }
    }

    /// Taxonomy kind of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineFailure::MissingResult
            | EngineFailure::UnsupportedResult(_)
            | EngineFailure::Script { .. } => ErrorKind::Script,
            EngineFailure::NullShape
            | EngineFailure::Export(_)
            | EngineFailure::Import(_)
            | EngineFailure::WarmUp(_) => ErrorKind::Engine,
        }
    }

    /// Detail text tagged with the kind label, as written to sidecars.
    pub fn detail(&self) -> String {
        format!("{}: {}", self.kind().label(), self)
    }

    /// True for failures raised by the script itself, as opposed to the
    /// result checks the worker performs afterwards.
    pub fn is_raised(&self) -> bool {
        matches!(self, EngineFailure::Script { .. } | EngineFailure::Export(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_names_binding() {
        let detail = EngineFailure::MissingResult.detail();
        assert_eq!(detail, "ScriptError: variable 'result' not found in script");
        assert_eq!(ErrorKind::from_detail(&detail), Some(ErrorKind::Script));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(EngineFailure::NullShape.kind(), ErrorKind::Engine);
        assert_eq!(
            EngineFailure::UnsupportedResult("number".into()).kind(),
            ErrorKind::Script
        );
        assert_eq!(EngineFailure::script(3, "boom").to_string(), "line 3: boom");
    }
}
