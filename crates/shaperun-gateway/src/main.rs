//! shaperun gateway server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use shaperun_gateway::{http, reaper, AppState, Config};
use shaperun_pool::{Dispatcher, Supervisor, WireProtocol, WorkerLifecycle, Workspace};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// HTTP gateway in front of a pool of shaperun workers.
#[derive(Parser, Debug)]
#[command(name = "shaperun-gateway", version, about)]
struct Args {
    /// HTTP bind address
    #[arg(long, env = "SHAPERUN_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Workspace directory for task files and artifacts
    #[arg(long, env = "SHAPERUN_WORKSPACE", default_value = "workspace")]
    workspace: PathBuf,

    /// Worker binary (defaults to shaperun-worker next to this binary)
    #[arg(long, env = "SHAPERUN_WORKER")]
    worker: Option<PathBuf>,

    /// Worker lifecycle
    #[arg(long, env = "SHAPERUN_LIFECYCLE", value_enum, default_value_t = Lifecycle::Structured)]
    lifecycle: Lifecycle,

    /// Maximum live workers
    #[arg(long, env = "SHAPERUN_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Seconds a worker has to announce READY
    #[arg(long, env = "SHAPERUN_STARTUP_TIMEOUT", default_value_t = 30)]
    startup_timeout: u64,

    /// Seconds a task may run before its worker is killed
    #[arg(long, env = "SHAPERUN_TASK_TIMEOUT", default_value_t = 300)]
    task_timeout: u64,

    /// Seconds a request waits for a free worker
    #[arg(long, env = "SHAPERUN_ACQUIRE_TIMEOUT", default_value_t = 30)]
    acquire_timeout: u64,

    /// Seconds artifacts are kept
    #[arg(long, env = "SHAPERUN_ARTIFACT_TTL", default_value_t = 86_400)]
    artifact_ttl: u64,

    /// Seconds between retention sweeps
    #[arg(long, env = "SHAPERUN_REAP_INTERVAL", default_value_t = 600)]
    reap_interval: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Lifecycle {
    /// Persistent workers, JSON task lines
    Structured,
    /// Persistent workers, `script|output` lines
    PathPair,
    /// One process per task
    Cold,
}

impl Args {
    fn into_config(self) -> Config {
        let lifecycle = match self.lifecycle {
            Lifecycle::Structured => WorkerLifecycle::Persistent(WireProtocol::Structured),
            Lifecycle::PathPair => WorkerLifecycle::Persistent(WireProtocol::PathPair),
            Lifecycle::Cold => WorkerLifecycle::Cold,
        };
        Config {
            bind_addr: self.bind,
            workspace_dir: self.workspace,
            worker_program: self.worker.unwrap_or_else(default_worker_program),
            lifecycle,
            capacity: self.workers,
            startup_timeout: Duration::from_secs(self.startup_timeout),
            task_timeout: Duration::from_secs(self.task_timeout),
            acquire_timeout: Duration::from_secs(self.acquire_timeout),
            artifact_ttl: Duration::from_secs(self.artifact_ttl),
            reap_interval: Duration::from_secs(self.reap_interval),
        }
    }
}

/// `shaperun-worker` beside the running executable, else from `PATH`.
fn default_worker_program() -> PathBuf {
    let name = format!("shaperun-worker{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = Args::parse().into_config();

    let workspace = Workspace::open(&config.workspace_dir).map_err(|e| {
        format!(
            "Failed to open workspace '{}': {}",
            config.workspace_dir.display(),
            e
        )
    })?;
    let supervisor = Supervisor::new(config.pool_config());
    supervisor.start().await?;

    let runner = Arc::new(Dispatcher::new(workspace, supervisor.clone()));
    let reaper = reaper::spawn_reaper(runner.clone(), config.artifact_ttl, config.reap_interval);
    let router = http::create_router(AppState::new(runner));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        bind_addr = %config.bind_addr,
        workspace = %config.workspace_dir.display(),
        worker = %config.worker_program.display(),
        lifecycle = config.lifecycle.label(),
        capacity = config.capacity,
        "Starting shaperun gateway"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining worker pool");
    reaper.abort();
    supervisor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
