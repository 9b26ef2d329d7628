//! shaperun CLI - command line interface for the shaperun gateway.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod error;
mod params;

use client::GatewayClient;
use error::ClientError;

/// shaperun CLI - run modeling scripts through a shaperun gateway
#[derive(Parser)]
#[command(name = "shaperun")]
#[command(about = "CLI for the shaperun gateway", long_about = None)]
struct Cli {
    /// Gateway base URL
    #[arg(short, long, env = "SHAPERUN_URL", default_value = "http://127.0.0.1:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script and save its artifact
    Generate {
        /// Script file
        script: PathBuf,

        /// Script parameter as name=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Output file (defaults to <task-id>.brep)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Download the artifact of an earlier task
    Download {
        /// Task ID
        task_id: String,

        /// Output file (defaults to <task-id>.brep)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Check gateway health
    Health,

    /// Show the worker pool
    Workers,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = GatewayClient::new(&cli.url);

    let result = match cli.command {
        Commands::Generate {
            script,
            params,
            out,
        } => generate(&client, script, &params, out).await,
        Commands::Download { task_id, out } => download(&client, task_id, out).await,
        Commands::Health => health(&client).await,
        Commands::Workers => list_workers(&client).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn generate(
    client: &GatewayClient,
    script: PathBuf,
    params: &[String],
    out: Option<PathBuf>,
) -> Result<(), ClientError> {
    let args = params::parse_params(params)?;
    let code = tokio::fs::read_to_string(&script).await?;

    let model = client.generate(&code, args).await?;
    let out = out.unwrap_or_else(|| default_output(&model.task_id));
    tokio::fs::write(&out, &model.bytes).await?;

    println!("Task:      {}", model.task_id);
    if let Some(material) = &model.material {
        println!("Material:  {}", material);
    }
    println!("Artifact:  {} ({} bytes)", out.display(), model.bytes.len());
    Ok(())
}

async fn download(
    client: &GatewayClient,
    task_id: String,
    out: Option<PathBuf>,
) -> Result<(), ClientError> {
    let bytes = client.download(&task_id).await?;
    let out = out.unwrap_or_else(|| default_output(&task_id));
    tokio::fs::write(&out, &bytes).await?;

    println!("Artifact:  {} ({} bytes)", out.display(), bytes.len());
    Ok(())
}

async fn health(client: &GatewayClient) -> Result<(), ClientError> {
    if client.health().await? {
        println!("ok");
        Ok(())
    } else {
        Err(ClientError::Rejected {
            status: 503,
            message: "gateway is not healthy".to_string(),
        })
    }
}

async fn list_workers(client: &GatewayClient) -> Result<(), ClientError> {
    let pool = client.workers().await?;

    println!(
        "Pool: {} ({} live / {} capacity, {} idle, {} busy, {} restarts)",
        pool.lifecycle, pool.live, pool.capacity, pool.idle, pool.busy, pool.restarts
    );
    println!("{:<12}  {:<10}  {:<8}  {:<6}  {}", "ID", "STATE", "PID", "TASKS", "STARTED");
    println!("{}", "-".repeat(72));

    for worker in pool.workers {
        let pid = worker
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12}  {:<10}  {:<8}  {:<6}  {}",
            worker.id, worker.state, pid, worker.tasks_served, worker.started_at
        );
    }

    Ok(())
}

fn default_output(task_id: &str) -> PathBuf {
    PathBuf::from(format!("{}.brep", task_id))
}
