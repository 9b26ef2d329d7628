//! The execution step shared by every worker lifecycle.

use std::any::Any;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use shaperun_core::Parameters;
use shaperun_engine::{EngineFailure, Scope, ShapeEngine, ShapeResult};
use shaperun_protocol::sidecar_path;
use tracing::{debug, warn};

use crate::error::WorkerError;

/// Runs scripts through a [`ShapeEngine`], one task at a time.
pub struct Executor<E> {
    engine: E,
}

impl<E: ShapeEngine> Executor<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn warm_up(&mut self) -> Result<(), EngineFailure> {
        self.engine.warm_up()
    }

    /// Execute `script` with `params` and export the result to `output`.
    ///
    /// Returns the upper-cased material tag if the script bound one. The
    /// scope lives only for this call.
    pub fn execute(
        &self,
        script: &str,
        params: &Parameters,
        output: &Path,
    ) -> Result<Option<String>, EngineFailure> {
        let mut scope = Scope::with_parameters(params);
        self.engine.execute(script, &mut scope)?;

        let value = scope.take_result().ok_or(EngineFailure::MissingResult)?;
        let shape = ShapeResult::classify(value)?.extract()?;
        self.engine.export(&shape, output)?;

        let material = scope.material();
        debug!(
            output = %output.display(),
            solids = shape.solids().len(),
            material = material.as_deref().unwrap_or(""),
            "Exported shape"
        );
        Ok(material)
    }

    /// Read the code and parameter files of a task, then execute it.
    pub fn execute_files(
        &self,
        code_file: &Path,
        args_file: &Path,
        output: &Path,
    ) -> Result<Option<String>, WorkerError> {
        let script = read_input(code_file)?;
        let params = Parameters::from_json_str(&read_input(args_file)?)?;
        Ok(self.execute(&script, &params, output)?)
    }
}

fn read_input(path: &Path) -> Result<String, WorkerError> {
    fs::read_to_string(path).map_err(|source| WorkerError::ReadInput {
        path: path.to_path_buf(),
        source,
    })
}

/// Leave the error channel consistent with `outcome`: a sidecar and no
/// artifact on failure, no stale sidecar on success.
pub fn record_outcome<T>(output: &Path, outcome: &Result<T, WorkerError>) {
    match outcome {
        Ok(_) => {
            if let Err(e) = remove_if_present(&sidecar_path(output)) {
                warn!(output = %output.display(), error = %e, "Failed to remove stale sidecar");
            }
        }
        Err(err) => write_sidecar(output, &err.detail()),
    }
}

/// Write `detail` to `<output>.err` and drop any partial artifact.
pub fn write_sidecar(output: &Path, detail: &str) {
    if let Err(e) = remove_if_present(output) {
        warn!(output = %output.display(), error = %e, "Failed to remove partial artifact");
    }
    let sidecar = sidecar_path(output);
    if let Err(e) = fs::write(&sidecar, detail) {
        warn!(sidecar = %sidecar.display(), error = %e, "Failed to write error sidecar");
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Run `f`, turning a panic into its message.
pub fn catch_internal<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaperun_engine::SketchEngine;

    fn executor() -> Executor<SketchEngine> {
        let mut executor = Executor::new(SketchEngine::new());
        executor.warm_up().unwrap();
        executor
    }

    #[test]
    fn test_valid_script_writes_one_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("t.brep");
        let params = Parameters::new().with("w", 100.0);

        let outcome = executor().execute("result = box(w, w, w)", &params, &out);
        assert_eq!(outcome.unwrap(), None);
        assert!(out.exists());
        assert!(!sidecar_path(&out).exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_result() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("t.brep");

        let err = executor()
            .execute("x = box(1, 1, 1)", &Parameters::new(), &out)
            .unwrap_err();
        assert!(matches!(err, EngineFailure::MissingResult));
        assert!(!out.exists());
    }

    #[test]
    fn test_material_reported() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("t.brep");
        let script = "result = cylinder(r, 10)\nmaterial = kind";
        let params = Parameters::new().with("r", 2.0).with("kind", "steel");

        let material = executor().execute(script, &params, &out).unwrap();
        assert_eq!(material.as_deref(), Some("STEEL"));
    }

    #[test]
    fn test_scope_does_not_leak_between_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor();

        let first = dir.path().join("a.brep");
        let material = executor
            .execute("result = box(1, 1, 1)\nmaterial = 'steel'", &Parameters::new(), &first)
            .unwrap();
        assert_eq!(material.as_deref(), Some("STEEL"));

        let second = dir.path().join("b.brep");
        let err = executor
            .execute("material", &Parameters::new(), &second)
            .unwrap_err();
        assert_eq!(err.to_string(), "line 1: name 'material' is not defined");

        let third = dir.path().join("c.brep");
        let err = executor
            .execute("x = 1", &Parameters::new(), &third)
            .unwrap_err();
        assert!(matches!(err, EngineFailure::MissingResult));
    }

    #[test]
    fn test_execute_files_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let code = dir.path().join("t_code.txt");
        let args = dir.path().join("t_args.json");
        let out = dir.path().join("t.brep");
        fs::write(&code, "result = 42").unwrap();
        fs::write(&args, "{}").unwrap();
        fs::write(sidecar_path(&out), "stale").unwrap();

        let outcome = executor().execute_files(&code, &args, &out);
        record_outcome(&out, &outcome);
        assert_eq!(
            fs::read_to_string(sidecar_path(&out)).unwrap(),
            "ScriptError: Unsupported result type: number"
        );

        fs::write(&code, "result = sphere(1)").unwrap();
        let outcome = executor().execute_files(&code, &args, &out);
        record_outcome(&out, &outcome);
        assert!(outcome.is_ok());
        assert!(out.exists());
        assert!(!sidecar_path(&out).exists());
    }

    #[test]
    fn test_bad_parameters_are_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let code = dir.path().join("t_code.txt");
        let args = dir.path().join("t_args.json");
        fs::write(&code, "result = box(1, 1, 1)").unwrap();
        fs::write(&args, "[1, 2]").unwrap();

        let err = executor()
            .execute_files(&code, &args, &dir.path().join("t.brep"))
            .unwrap_err();
        assert_eq!(err.kind(), shaperun_core::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_catch_internal() {
        assert_eq!(catch_internal(|| 7), Ok(7));
        let caught: Result<(), String> = catch_internal(|| panic!("kernel blew up"));
        assert_eq!(caught.unwrap_err(), "kernel blew up");
    }
}
