use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colloquy_core::agent::{AgentClient, FakeAgentClient, HttpAgentClient};
use colloquy_core::config::{self, RunnerConfig};
use colloquy_core::engine::Engine;
use colloquy_core::model::{AgentProvider, JobStatus};
use colloquy_core::pipeline::Pipeline;
use colloquy_core::scraper::Scraper;
use colloquy_core::storage::{MemoryStore, ResultStore, SqliteStore};
use colloquy_validators::default_validator_set;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod report;

#[derive(Parser, Debug)]
#[command(name = "colloquy", version, about = "Batched conversational test execution")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter batch file.
    Init {
        #[arg(default_value = "batch.yaml")]
        path: PathBuf,
    },
    /// Execute a batch and print the result summary.
    Run {
        file: PathBuf,
        /// Worker pool size override.
        #[arg(long)]
        workers: Option<usize>,
        /// Persist results to a SQLite database at this path.
        #[arg(long)]
        db: Option<PathBuf>,
        /// Include scraped page content in the printed results.
        #[arg(long)]
        include_scraped: bool,
    },
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_env("COLLOQUY_LOG")
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = RunnerConfig::from_env();
    init_logging(&cfg.log_level);

    match cli.command {
        Command::Init { path } => {
            config::write_sample_batch(&path)?;
            eprintln!("wrote sample batch to {}", path.display());
            Ok(())
        }
        Command::Run {
            file,
            workers,
            db,
            include_scraped,
        } => run_batch(cfg, &file, workers, db, include_scraped).await,
    }
}

async fn run_batch(
    mut cfg: RunnerConfig,
    file: &PathBuf,
    workers: Option<usize>,
    db: Option<PathBuf>,
    include_scraped: bool,
) -> Result<()> {
    if let Some(n) = workers {
        cfg.max_workers = n;
    }

    let batch = config::load_batch(file)?;

    let store: Arc<dyn ResultStore> = match &db {
        Some(path) => Arc::new(SqliteStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };

    let agent: Arc<dyn AgentClient> = match batch.provider {
        AgentProvider::Http => Arc::new(HttpAgentClient::new()),
        AgentProvider::Fake => Arc::new(FakeAgentClient::new()),
    };

    let engine = Engine::new(
        agent,
        Scraper::new(),
        default_validator_set(),
        store.clone(),
        cfg.retry_policy(),
    );
    let pipeline = Pipeline::new(&cfg, engine, store);
    pipeline.start().await;

    let job_id = Uuid::new_v4().to_string();
    tracing::info!(job_id = %job_id, batch_id = %batch.batch_id, "submitting batch");
    pipeline
        .enqueue_batch(&job_id, &batch.batch_id, batch.tests)
        .await?;

    let status = loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let status = pipeline
            .get_status(&job_id)?
            .context("job record disappeared")?;
        tracing::debug!(
            progress = status.progress,
            current_test = status.current_test_id.as_deref().unwrap_or("-"),
            "waiting for batch"
        );
        if status.status.is_terminal() {
            break status;
        }
    };

    let results = pipeline
        .get_results(&job_id, include_scraped)?
        .context("job results disappeared")?;
    report::print_summary(&results);

    pipeline.stop().await;

    if status.status == JobStatus::Failed || results.failed_tests > 0 {
        std::process::exit(1);
    }
    Ok(())
}
