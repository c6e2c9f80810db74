use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use quire_client::{ReqwestFetcher, default_registry};
use quire_core::error::AppError;
use quire_core::job_queue::{self, JobSender};
use quire_core::traits::ResultSink;
use quire_core::{
    EngineConfig, EngineSettings, JobExecutor, JobResult, ScrapeJob, ScrapeType,
    TracingWorkerReporter, WorkerConfig, WorkerService,
};

#[derive(Parser)]
#[command(name = "quire", version, about = "Scrape engine for serialized fiction tracking")]
struct Cli {
    /// Engine configuration file (rate limiter, timeouts, per-type profiles)
    #[arg(short, long, env = "QUIRE_CONFIG", default_value = "config/engine.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and load every referenced schema
    Check,

    /// Run a single job and print its result as JSON
    Scrape {
        /// Scrape type (list, feed, news, toc, onetime_user, onetime_toc, search)
        #[arg(short = 't', long = "type")]
        scrape_type: ScrapeType,

        /// Target URL (repeatable)
        #[arg(short, long = "url", required = true)]
        urls: Vec<String>,

        /// Schema reference overriding the type default (e.g. "toc@2.0.0")
        #[arg(long)]
        schema: Option<String>,

        /// Succeed even when no record is accepted
        #[arg(long, default_value_t = false)]
        allow_empty: bool,

        /// Keep going after a target fails
        #[arg(long, default_value_t = false)]
        independent: bool,
    },

    /// Process JSON-lines jobs until the input ends or Ctrl-C
    Run {
        /// File with one job per line (reads stdin if omitted)
        #[arg(short, long)]
        jobs: Option<PathBuf>,

        /// Maximum jobs processed at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("quire=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;

    match cli.command {
        Commands::Check => cmd_check(&settings),
        Commands::Scrape {
            scrape_type,
            urls,
            schema,
            allow_empty,
            independent,
        } => {
            let mut job = ScrapeJob::new(scrape_type, urls);
            if let Some(schema) = schema {
                job = job.with_schema(schema);
            }
            if allow_empty {
                job = job.allow_empty(true);
            }
            if independent {
                job = job.independent_targets();
            }
            cmd_scrape(settings, job).await
        }
        Commands::Run { jobs, concurrency } => cmd_run(settings, jobs, concurrency).await,
    }
}

/// Load the config file, apply `QUIRE_*` overrides and resolve schemas.
///
/// A relative `schemas_dir` is taken relative to the config file.
fn load_settings(path: &Path) -> Result<EngineSettings> {
    let mut config = EngineConfig::from_file(path)?
        .apply_env()
        .context("Invalid QUIRE_* environment override")?;
    if config.schemas_dir.is_relative()
        && let Some(parent) = path.parent()
    {
        config.schemas_dir = parent.join(&config.schemas_dir);
    }
    config
        .resolve()
        .with_context(|| format!("Invalid engine configuration: {}", path.display()))
}

fn build_executor(settings: EngineSettings) -> Result<JobExecutor<ReqwestFetcher>> {
    let fetcher = ReqwestFetcher::with_timeout(settings.fetch_timeout)
        .context("Failed to create HTTP client")?;
    let registry = default_registry().context("Incomplete extractor registry")?;
    Ok(JobExecutor::new(fetcher, registry, settings)?)
}

fn cmd_check(settings: &EngineSettings) -> Result<()> {
    println!(
        "rate limit: {} fetches per {}ms",
        settings.rate_limit.limit, settings.rate_limit.window_ms
    );
    println!("fetch timeout: {}ms", settings.fetch_timeout.as_millis());
    for scrape_type in ScrapeType::ALL {
        if let Some(profile) = settings.profile(scrape_type) {
            println!(
                "{:<13} schema={} item='{}' allow_empty={}",
                scrape_type.as_str(),
                profile.schema_name,
                profile.selectors.item,
                profile.allow_empty
            );
        }
    }
    Ok(())
}

async fn cmd_scrape(settings: EngineSettings, job: ScrapeJob) -> Result<()> {
    let executor = build_executor(settings)?;
    tracing::info!(
        job_id = %job.id,
        scrape_type = %job.scrape_type,
        targets = job.targets.len(),
        "Running job"
    );

    let result = executor.submit(job).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(error) = result.failure() {
        anyhow::bail!("Job {} failed: {error}", result.job_id);
    }
    Ok(())
}

async fn cmd_run(
    settings: EngineSettings,
    jobs: Option<PathBuf>,
    concurrency: usize,
) -> Result<()> {
    let executor = Arc::new(build_executor(settings)?);
    let (sender, queue) = job_queue::channel(concurrency.max(1) * 2);
    let config = WorkerConfig::default().with_max_concurrent_jobs(concurrency);
    let worker = WorkerService::new(queue, executor, StdoutSink, config);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling in-flight jobs");
            ctrl_c.cancel();
        }
    });

    let reader = tokio::spawn(feed_jobs(jobs, sender));
    let processed = worker.run(cancel, &TracingWorkerReporter).await?;
    if reader.is_finished() {
        reader.await.context("Job reader panicked")??;
    } else {
        reader.abort();
    }

    tracing::info!(processed, "Worker finished");
    Ok(())
}

/// Parse JSON-lines jobs and enqueue them. Malformed lines are logged and
/// skipped. Dropping the sender at the end closes the queue.
async fn feed_jobs(path: Option<PathBuf>, sender: JobSender) -> Result<()> {
    let input: Box<dyn AsyncRead + Send + Unpin> = match path {
        Some(path) => Box::new(
            tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open jobs file: {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(input).lines();

    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ScrapeJob>(&line) {
            Ok(job) => {
                if sender.send(job).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(line = line_no, error = %e, "Skipping malformed job"),
        }
    }
    Ok(())
}

/// Writes each result as one JSON line on stdout.
#[derive(Debug, Clone)]
struct StdoutSink;

impl ResultSink for StdoutSink {
    async fn emit(&self, result: &JobResult) -> Result<(), AppError> {
        let line = serde_json::to_string(result)?;
        println!("{line}");
        Ok(())
    }
}
