//! Persistent lifecycle speaking the path-pair protocol.

use std::fs;
use std::io;

use shaperun_core::Parameters;
use shaperun_engine::ShapeEngine;
use shaperun_protocol::{
    FailureKind, LineChannel, PathPairRequest, PathPairResponse, ProtocolError, EXIT, READY,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::error::WorkerError;
use crate::executor::{catch_internal, record_outcome, write_sidecar, Executor};

/// Announce `READY`, then answer `script|output` lines until `EXIT` or EOF.
///
/// Scripts run with no parameters. The response line keeps the classic
/// `ERROR:`/`EXCEPTION:`/`FATAL:` wording; when the output path is known the
/// labelled detail also goes to the sidecar so the kind survives.
pub async fn serve_path_pairs<E, R, W>(
    executor: &Executor<E>,
    channel: &mut LineChannel<R, W>,
) -> Result<u64, WorkerError>
where
    E: ShapeEngine,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    channel.send_line(READY).await?;
    info!(engine = executor.engine().name(), "Worker ready (path-pair)");

    let mut served = 0;
    loop {
        let line = match channel.recv_line().await {
            Ok(line) => line,
            Err(ProtocolError::ChannelClosed) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == EXIT {
            info!(served, "Received EXIT");
            break;
        }

        let response = catch_internal(|| handle_path_pair(executor, line))
            .unwrap_or_else(|panic| PathPairResponse::failure(FailureKind::Fatal, &panic));
        channel.send_line(&response.encode()).await?;
        served += 1;
    }
    Ok(served)
}

/// Handle one `script|output` line.
pub fn handle_path_pair<E: ShapeEngine>(executor: &Executor<E>, line: &str) -> PathPairResponse {
    let request = match PathPairRequest::decode(line) {
        Ok(request) => request,
        Err(_) => {
            return PathPairResponse::failure(
                FailureKind::Error,
                &format!(
                    "Invalid request format. Expected 'script|output', got '{}'",
                    line
                ),
            )
        }
    };

    let script = match fs::read_to_string(&request.script_path) {
        Ok(script) => script,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return PathPairResponse::failure(
                FailureKind::Error,
                &format!("Script file not found: {}", request.script_path.display()),
            )
        }
        Err(source) => {
            let err = WorkerError::ReadInput {
                path: request.script_path.clone(),
                source,
            };
            warn!(error = %err, "Cannot read script");
            write_sidecar(&request.output_path, &err.detail());
            return PathPairResponse::failure(FailureKind::Fatal, &err.to_string());
        }
    };

    let outcome = executor
        .execute(&script, &Parameters::new(), &request.output_path)
        .map_err(WorkerError::from);
    record_outcome(&request.output_path, &outcome);

    match outcome {
        Ok(material) => {
            info!(output = %request.output_path.display(), "Task succeeded");
            PathPairResponse::success(material.as_deref())
        }
        Err(err) => {
            info!(output = %request.output_path.display(), error = %err, "Task failed");
            PathPairResponse::failure(failure_kind(&err), &err.to_string())
        }
    }
}

fn failure_kind(err: &WorkerError) -> FailureKind {
    match err {
        WorkerError::Engine(failure) if failure.is_raised() => FailureKind::Exception,
        WorkerError::Engine(_) => FailureKind::Error,
        _ => FailureKind::Fatal,
    }
}
