//! Demonstration harness for the AI task-generation pipeline: loads a
//! fixture set of reviews from disk, runs the pipeline against a real AI
//! CLI, and prints the resulting task list and failure report.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use taskgen_core::config::PipelineConfig;
use taskgen_core::error_tracker::ErrorTracker;
use taskgen_core::invoker::ProcessInvoker;
use taskgen_core::model::Review;
use taskgen_core::orchestrator::PipelineOrchestrator;
use taskgen_core::storage::JsonFileTaskStorage;
use tracing_subscriber::EnvFilter;

/// Run the AI task-generation pipeline over a fixture set of reviews.
#[derive(Parser, Debug)]
#[command(name = "taskgen", version, about)]
struct Cli {
    /// Path to a JSON file containing a `Vec<Review>` fixture.
    #[arg(long)]
    reviews: PathBuf,

    /// PR number the generated tasks are stored under.
    #[arg(long, default_value_t = 1)]
    pr_number: u64,

    /// Directory task and failure-log JSON files are written to.
    #[arg(long, default_value = "./taskgen-output")]
    output_dir: PathBuf,

    /// Name or path of the AI CLI binary to shell out to.
    #[arg(long)]
    ai_command: Option<String>,

    /// Model identifier to pass through to the assistant.
    #[arg(long)]
    ai_model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let reviews_text = std::fs::read_to_string(&cli.reviews)
        .with_context(|| format!("failed to read reviews fixture at {}", cli.reviews.display()))?;
    let reviews: Vec<Review> =
        serde_json::from_str(&reviews_text).context("failed to parse reviews fixture as JSON")?;

    let mut config = PipelineConfig::default();
    if let Some(cmd) = cli.ai_command {
        config.ai_command_name = cmd;
    }
    if let Some(model) = cli.ai_model {
        config.ai_model = model;
    }

    let invoker = Arc::new(ProcessInvoker::new(config.ai_command_name.clone(), config.ai_model.clone()));
    let storage = Arc::new(JsonFileTaskStorage::new(cli.output_dir.clone()));
    let error_log_path = cli.output_dir.join("error_log.json");
    let tracker = Arc::new(ErrorTracker::load_with_capacity(&error_log_path, config.error_log_capacity));

    let orchestrator = PipelineOrchestrator::new(config, invoker, storage, tracker, Some(error_log_path));
    let cancel = orchestrator.cancellation_handle();

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt signal; cancelling pipeline");
            let _ = cancel.send(true);
        }
    });

    let report = orchestrator.run(reviews, cli.pr_number).await?;
    ctrl_c.abort();

    println!(
        "processed {} comment(s), {} failed, {} task(s) stored",
        report.processed_comments,
        report.failed_comments,
        report.tasks.len()
    );
    if let Some(path) = &report.failure_log_path {
        println!("failure log: {}", path.display());
    }
    for task in &report.tasks {
        println!("  [{}] {} (#{})", task.priority, task.description, task.source_comment_id);
    }

    Ok(())
}
