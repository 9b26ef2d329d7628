//! Cold lifecycle: one task from the command line, outcome in the exit status.

use std::io::Write;

use shaperun_engine::ShapeEngine;
use shaperun_protocol::{PathPairResponse, StructuredRequest};
use tracing::{error, info};

use crate::error::WorkerError;
use crate::executor::{catch_internal, record_outcome, write_sidecar, Executor};

/// Warm up, run `task`, and report. On success the `SUCCESS` line is written
/// to `stdout` and `true` is returned; on failure the detail is in the
/// sidecar.
pub fn run_cold<E: ShapeEngine, W: Write>(
    mut executor: Executor<E>,
    task: &StructuredRequest,
    stdout: &mut W,
) -> bool {
    if let Err(failure) = executor.warm_up() {
        error!(error = %failure, "Engine warm-up failed");
        write_sidecar(&task.output_path, &failure.detail());
        return false;
    }

    let outcome = catch_internal(|| {
        executor.execute_files(&task.code_file, &task.args_file, &task.output_path)
    })
    .unwrap_or_else(|panic| Err(WorkerError::Panicked(panic)));
    record_outcome(&task.output_path, &outcome);

    match outcome {
        Ok(material) => {
            info!(output = %task.output_path.display(), "Task succeeded");
            let line = PathPairResponse::success(material.as_deref()).encode();
            if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
                error!(error = %e, "Failed to write result line");
            }
            true
        }
        Err(err) => {
            info!(output = %task.output_path.display(), kind = %err.kind(), "Task failed");
            false
        }
    }
}
