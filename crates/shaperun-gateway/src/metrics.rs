//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use shaperun_core::{ErrorKind, WorkerState};

use crate::state::AppState;

const WORKER_STATES: [WorkerState; 5] = [
    WorkerState::Starting,
    WorkerState::Warming,
    WorkerState::Ready,
    WorkerState::Busy,
    WorkerState::Dead,
];

const FAILURE_KINDS: [ErrorKind; 8] = [
    ErrorKind::Protocol,
    ErrorKind::Script,
    ErrorKind::Engine,
    ErrorKind::ProcessCrash,
    ErrorKind::Io,
    ErrorKind::InvalidInput,
    ErrorKind::Busy,
    ErrorKind::Startup,
];

/// Collect all metrics from AppState and format as Prometheus text.
pub fn collect_metrics(state: &AppState) -> String {
    let mut output = String::new();

    collect_worker_metrics(state, &mut output);
    collect_task_metrics(state, &mut output);

    output
}

/// Collect worker metrics by state.
fn collect_worker_metrics(state: &AppState, output: &mut String) {
    let stats = state.runner.pool_stats();

    writeln!(
        output,
        "# HELP shaperun_workers Number of worker processes by state"
    )
    .ok();
    writeln!(output, "# TYPE shaperun_workers gauge").ok();
    for worker_state in WORKER_STATES {
        let count = stats
            .workers
            .iter()
            .filter(|w| w.state == worker_state)
            .count();
        writeln!(
            output,
            "shaperun_workers{{state=\"{}\"}} {count}",
            label(worker_state)
        )
        .ok();
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP shaperun_worker_restarts_total Replacement workers started after a death"
    )
    .ok();
    writeln!(output, "# TYPE shaperun_worker_restarts_total counter").ok();
    writeln!(output, "shaperun_worker_restarts_total {}", stats.restarts).ok();
}

/// Collect finished task counts by outcome.
fn collect_task_metrics(state: &AppState, output: &mut String) {
    let outcomes = state.runner.outcomes();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP shaperun_tasks_total Finished tasks by outcome"
    )
    .ok();
    writeln!(output, "# TYPE shaperun_tasks_total counter").ok();
    writeln!(
        output,
        "shaperun_tasks_total{{outcome=\"succeeded\"}} {}",
        outcomes.succeeded
    )
    .ok();
    for kind in FAILURE_KINDS {
        let count = outcomes.failed.get(&kind).copied().unwrap_or(0);
        writeln!(
            output,
            "shaperun_tasks_total{{outcome=\"failed\",kind=\"{}\"}} {count}",
            kind.label()
        )
        .ok();
    }
}

fn label(state: WorkerState) -> String {
    state.to_string().to_lowercase()
}
