//! shaperun worker binary

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shaperun_engine::SketchEngine;
use shaperun_protocol::{LineChannel, StructuredRequest};
use shaperun_worker::{
    run_cold, serve_path_pairs, serve_structured, setup_environment, Executor, WorkerError,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Runs modeling scripts for the shaperun supervisor.
#[derive(Parser, Debug)]
#[command(name = "shaperun-worker", version, about)]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run one task and exit (0 on success, 1 with detail in <output>.err)
    Run {
        /// Script file
        code_file: PathBuf,
        /// JSON object of parameters
        args_file: PathBuf,
        /// Where to write the artifact
        output_path: PathBuf,
    },
    /// Persistent loop over structured JSON task lines on stdin
    Serve,
    /// Persistent loop over `script|output` lines on stdin
    Paths,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr; stdout carries protocol lines.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    // Must happen before the runtime starts any threads.
    setup_environment();

    match args.mode {
        Mode::Run {
            code_file,
            args_file,
            output_path,
        } => {
            let task = StructuredRequest::new(code_file, args_file, output_path);
            let executor = Executor::new(SketchEngine::new());
            if run_cold(executor, &task, &mut std::io::stdout()) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Mode::Serve => exit_code(run_persistent(false)),
        Mode::Paths => exit_code(run_persistent(true)),
    }
}

fn run_persistent(path_pairs: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut executor = Executor::new(SketchEngine::new());
        executor.warm_up().map_err(WorkerError::from)?;

        let mut channel = LineChannel::new(tokio::io::stdin(), tokio::io::stdout());
        let served = if path_pairs {
            serve_path_pairs(&executor, &mut channel).await?
        } else {
            serve_structured(&executor, &mut channel).await?
        };
        info!(served, "Worker exiting");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn exit_code(result: Result<(), Box<dyn std::error::Error>>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Worker stopped");
            ExitCode::FAILURE
        }
    }
}
