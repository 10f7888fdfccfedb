//! `goc`: a CLI that drives an in-process [`goc_jobs::JobManager`] directly.
//! There is no HTTP layer here — a host service maps these same operations
//! onto routes; this binary is the reference driver and the one thing an
//! operator runs standalone.

mod app;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use goc_ids::{JobId, OwnerId};
use goc_protocol::{DatasetDescriptor, GenerationConfig};

use app::App;

#[derive(Parser)]
#[command(name = "goc", about = "Generation Orchestration Core driver")]
struct Cli {
    /// Path to config.toml. Defaults to `$GOC_HOME/config.toml` (`~/.goc/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit debug-level logs to stderr in addition to the rolling log file.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a generation job from a descriptor+config JSON file and print the new job id.
    Submit {
        /// JSON file with `{"owner_id": "...", "descriptor": {...}, "config": {...}}`.
        request: PathBuf,
    },
    /// Print the current state of a job.
    Status { job_id: String },
    /// Cancel a queued or running job.
    Cancel { job_id: String },
    /// Print quota/privacy-budget usage for an owner in the current period.
    UsageStats { owner_id: String },
    /// Print a signed download URL for a completed job's output.
    ArtifactUrl {
        job_id: String,
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
    /// Subscribe to a streaming job's row batches until it reaches a terminal state.
    Stream { job_id: String },
    /// Archive terminal jobs older than 7 days and print how many were archived.
    Archive,
}

#[derive(serde::Deserialize)]
struct SubmitRequest {
    owner_id: String,
    descriptor: DatasetDescriptor,
    config: GenerationConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    goc_logging::init_logging(goc_logging::LogConfig {
        app_name: "goc",
        verbose: cli.verbose,
        quiet_console: false,
    })
    .context("failed to initialize logging")?;

    let config_path = cli.config.unwrap_or_else(|| goc_logging::goc_home().join("config.toml"));
    let app_config = config::load_config(&config_path).with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let app = App::build(&app_config).await.context("failed to initialize GOC")?;

    match cli.command {
        Command::Submit { request } => submit(&app, &request).await,
        Command::Status { job_id } => status(&app, &job_id).await,
        Command::Cancel { job_id } => cancel(&app, &job_id).await,
        Command::UsageStats { owner_id } => usage_stats(&app, &owner_id).await,
        Command::ArtifactUrl { job_id, ttl_secs } => artifact_url(&app, &job_id, ttl_secs).await,
        Command::Stream { job_id } => stream(&app, &job_id).await,
        Command::Archive => archive(&app).await,
    }
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    JobId::parse(raw).map_err(|e| anyhow::anyhow!("invalid job id {raw:?}: {e}"))
}

fn parse_owner_id(raw: &str) -> Result<OwnerId> {
    OwnerId::parse(raw).map_err(|e| anyhow::anyhow!("invalid owner id {raw:?}: {e}"))
}

async fn submit(app: &App, request_path: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(request_path)
        .with_context(|| format!("failed to read {}", request_path.display()))?;
    let request: SubmitRequest = serde_json::from_str(&content).context("failed to parse submit request")?;
    let owner_id = parse_owner_id(&request.owner_id)?;
    let job_id = app
        .manager
        .submit(owner_id, request.descriptor, request.config)
        .await
        .map_err(|e| anyhow::anyhow!("submit failed: {e}"))?;
    println!("{job_id}");
    Ok(())
}

async fn status(app: &App, job_id: &str) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let job = app.manager.status(&job_id).await.map_err(|e| anyhow::anyhow!("status failed: {e}"))?;
    match job {
        Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
        None => println!("job not found"),
    }
    Ok(())
}

async fn cancel(app: &App, job_id: &str) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let cancelled = app.manager.cancel(&job_id).await.map_err(|e| anyhow::anyhow!("cancel failed: {e}"))?;
    println!("{cancelled}");
    Ok(())
}

async fn usage_stats(app: &App, owner_id: &str) -> Result<()> {
    let owner_id = parse_owner_id(owner_id)?;
    let stats = app
        .manager
        .usage_stats(&owner_id)
        .await
        .map_err(|e| anyhow::anyhow!("usage_stats failed: {e}"))?;
    println!(
        "rows_reserved={} rows_committed={} epsilon_spent={} delta_spent={}",
        stats.rows_reserved, stats.rows_committed, stats.epsilon_spent, stats.delta_spent
    );
    Ok(())
}

async fn artifact_url(app: &App, job_id: &str, ttl_secs: u64) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let url = app
        .manager
        .artifact_url(&job_id, Duration::from_secs(ttl_secs))
        .await
        .map_err(|e| anyhow::anyhow!("artifact_url failed: {e}"))?;
    println!("{url}");
    Ok(())
}

async fn stream(app: &App, job_id: &str) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let subscription = app
        .manager
        .stream_job(&job_id)
        .await
        .map_err(|e| anyhow::anyhow!("stream_job failed: {e}"))?;
    let Some(mut subscription) = subscription else {
        println!("job is not streaming (completed, non-streaming, or unknown)");
        return Ok(());
    };
    while let Some(chunk) = subscription.next().await {
        match chunk {
            Ok(chunk) => println!("{chunk:?}"),
            Err(_lagged) => eprintln!("warning: stream fell behind and skipped some row batches"),
        }
    }
    Ok(())
}

async fn archive(app: &App) -> Result<()> {
    let count = app
        .manager
        .archive_terminal_jobs()
        .await
        .map_err(|e| anyhow::anyhow!("archive failed: {e}"))?;
    println!("archived {count} jobs");
    Ok(())
}
