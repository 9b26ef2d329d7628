//! The contract a geometry kernel fulfils for a worker.

use std::path::Path;

use crate::{EngineFailure, Scope, ShapeHandle};

/// A scriptable geometry kernel.
///
/// Implementations are driven by a single worker thread, one task at a time.
pub trait ShapeEngine {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// One-time initialization before the worker announces `READY`.
    fn warm_up(&mut self) -> Result<(), EngineFailure> {
        Ok(())
    }

    /// Run `script` against `scope`. Bindings the script makes stay in
    /// `scope` for the caller to inspect.
    fn execute(&self, script: &str, scope: &mut Scope) -> Result<(), EngineFailure>;

    /// Serialize `shape` to `path`.
    fn export(&self, shape: &ShapeHandle, path: &Path) -> Result<(), EngineFailure>;
}
