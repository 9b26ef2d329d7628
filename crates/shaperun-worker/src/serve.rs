//! Persistent lifecycle speaking the structured-task protocol.

use shaperun_engine::ShapeEngine;
use shaperun_protocol::{
    LineChannel, ProtocolError, StructuredRequest, StructuredResponse, EXIT, READY,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::error::WorkerError;
use crate::executor::{catch_internal, record_outcome, write_sidecar, Executor};

/// Announce `READY`, then answer task lines until `EXIT` or EOF.
///
/// Returns the number of tasks answered. The executor must already be
/// warmed up. Tasks run synchronously; the next line is not read until the
/// current response and sidecar are written.
pub async fn serve_structured<E, R, W>(
    executor: &Executor<E>,
    channel: &mut LineChannel<R, W>,
) -> Result<u64, WorkerError>
where
    E: ShapeEngine,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    channel.send_line(READY).await?;
    info!(engine = executor.engine().name(), "Worker ready (structured)");

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

        let response = handle_structured(executor, line);
        channel.send_line(&response.encode()).await?;
        served += 1;
    }
    Ok(served)
}

/// Handle one structured request line. Never fails: every problem becomes
/// `ERR` plus, where an output path is known, a sidecar.
pub fn handle_structured<E: ShapeEngine>(executor: &Executor<E>, line: &str) -> StructuredResponse {
    let request = match StructuredRequest::decode(line) {
        Ok(request) => request,
        Err(e) => {
            let err = WorkerError::from(e);
            warn!(error = %err, "Malformed task line");
            if let Some(output) = StructuredRequest::salvage_output_path(line) {
                write_sidecar(&output, &err.detail());
            }
            return StructuredResponse::Err;
        }
    };

    let outcome = catch_internal(|| {
        executor.execute_files(&request.code_file, &request.args_file, &request.output_path)
    })
    .unwrap_or_else(|panic| Err(WorkerError::Panicked(panic)));
    record_outcome(&request.output_path, &outcome);

    match outcome {
        Ok(material) => {
            info!(output = %request.output_path.display(), "Task succeeded");
            StructuredResponse::ok(material.as_deref())
        }
        Err(err) => {
            info!(output = %request.output_path.display(), error = %err, "Task failed");
            StructuredResponse::Err
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaperun_engine::SketchEngine;
    use shaperun_protocol::sidecar_path;
    use std::fs;
    use std::path::Path;
    use tokio::io::duplex;

    fn write_task(dir: &Path, name: &str, script: &str) -> StructuredRequest {
        let code = dir.join(format!("{}_code.txt", name));
        let args = dir.join(format!("{}_args.json", name));
        fs::write(&code, script).unwrap();
        fs::write(&args, "{}").unwrap();
        StructuredRequest::new(code, args, dir.join(format!("{}.brep", name)))
    }

    #[test]
    fn test_malformed_line_salvages_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("x.brep");
        let line = format!(r#"{{"outputPath": "{}"}}"#, output.display());

        let executor = Executor::new(SketchEngine::new());
        assert_eq!(handle_structured(&executor, &line), StructuredResponse::Err);
        let detail = fs::read_to_string(sidecar_path(&output)).unwrap();
        assert!(detail.starts_with("ProtocolError:"));

        assert_eq!(handle_structured(&executor, "not json"), StructuredResponse::Err);
    }

    #[tokio::test]
    async fn test_loop_over_duplex() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_task(dir.path(), "a", "result = box(1, 2, 3)\nmaterial = 'steel'");
        let bad = write_task(dir.path(), "b", "result = None");

        let (ours, theirs) = duplex(4096);
        let (their_read, their_write) = tokio::io::split(theirs);
        let (our_read, our_write) = tokio::io::split(ours);

        let worker = tokio::spawn(async move {
            let mut executor = Executor::new(SketchEngine::new());
            executor.warm_up().unwrap();
            let mut channel = LineChannel::new(their_read, their_write);
            serve_structured(&executor, &mut channel).await
        });

        let mut supervisor = LineChannel::new(our_read, our_write);
        assert_eq!(supervisor.recv_line().await.unwrap(), READY);

        supervisor.send_line(&good.encode().unwrap()).await.unwrap();
        assert_eq!(supervisor.recv_line().await.unwrap(), "OK|STEEL");

        supervisor.send_line("").await.unwrap();
        supervisor.send_line(&bad.encode().unwrap()).await.unwrap();
        assert_eq!(supervisor.recv_line().await.unwrap(), "ERR");
        let detail = fs::read_to_string(sidecar_path(&bad.output_path)).unwrap();
        assert_eq!(detail, "ScriptError: Unsupported result type: none");

        supervisor.send_line(EXIT).await.unwrap();
        assert_eq!(worker.await.unwrap().unwrap(), 2);
    }
}
