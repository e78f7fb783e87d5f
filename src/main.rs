//! TrialScope - reaction-time analysis for layout learning experiments
//!
//! A CLI tool that cleans trial data, aggregates mean response times,
//! runs a two-way ANOVA on layout type and table, and writes CSV tables
//! and SVG charts. Analyses run as background jobs on a worker pool.
//!
//! Exit codes:
//!   0 - Success (every job succeeded, with or without a result)
//!   1 - Runtime error (bad config, unreadable batch, etc.)
//!   2 - At least one analysis job failed

mod analysis;
mod cli;
mod config;
mod error;
mod ingest;
mod jobs;
mod models;
mod report;
mod scanner;
mod schema;

use anyhow::{Context, Result};
use cli::{Args, Command};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use jobs::{AnalysisPipeline, FetchResult, Job, JobOutcome, Orchestrator};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .trialscope.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!("⚠️  .trialscope.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .trialscope.toml")?;

    println!("✅ Created .trialscope.toml with default settings.");
    println!("   Edit it to set the data directory, worker count and analysis parameters.");
    Ok(())
}

/// Initialize logging at `level`. `RUST_LOG` wins when set.
fn init_logging(level: tracing::Level) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Dispatch the subcommand. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    match &args.command {
        // No logging or config needed
        Command::InitConfig => handle_init_config().map(|_| 0),
        Command::Analyze { datasets, json } => {
            let config = prepare(&args)?;
            run_analyze(&config, datasets, *json, args.quiet).await
        }
        Command::Ingest { batch } => handle_ingest(&prepare(&args)?, batch),
        Command::List => handle_list(&prepare(&args)?),
    }
}

/// Load the configuration, apply CLI overrides and start logging.
///
/// The config is read first so that `verbose` in the file can raise the
/// log level.
fn prepare(args: &Args) -> Result<Config> {
    let (mut config, source) = load_config(args)?;
    config.merge_with_args(args);

    init_logging(args.log_level(config.general.verbose))?;

    info!("TrialScope v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", source);
    debug!("Arguments: {:?}", args);
    Ok(config)
}

/// Queue every dataset, wait for the jobs and print their outcome.
async fn run_analyze(config: &Config, datasets: &[String], json: bool, quiet: bool) -> Result<i32> {
    let start_time = Instant::now();
    let show_text = !json && !quiet;

    if show_text {
        println!("🔬 Analyzing {} dataset(s)", datasets.len());
        println!("   Data: {}", config.general.data_dir.display());
        println!("   Output: {}", config.general.effective_output_dir().display());
        println!("   Workers: {}", config.general.workers);
    }

    let poll_interval = Duration::from_millis(config.general.poll_interval_ms.max(1));
    let pipeline = AnalysisPipeline::new(config);
    let orchestrator = Orchestrator::start(Arc::new(pipeline), config.general.workers, poll_interval);

    let mut ids = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let id = orchestrator.enqueue(dataset.clone()).await?;
        debug!("Queued {} as job {}", dataset, id);
        ids.push(id);
    }

    let progress_bar = if show_text {
        let pb = ProgressBar::new(ids.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut finished = Vec::with_capacity(ids.len());
    for id in &ids {
        let job = orchestrator
            .wait(*id)
            .await
            .with_context(|| format!("Job {} disappeared from the registry", id))?;
        let result = orchestrator.fetch_result(*id).await;
        progress_bar.inc(1);
        finished.push((job, result));
    }
    progress_bar.finish_and_clear();

    let jobs = orchestrator.jobs().await;
    orchestrator.shutdown().await;

    let failed = finished
        .iter()
        .filter(|(_, result)| matches!(result, FetchResult::Failed(_)))
        .count();

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else if !quiet {
        print_summary(&finished, start_time.elapsed().as_secs_f64());
    }

    if failed > 0 {
        if !json {
            eprintln!("\n⛔ {} job(s) failed (exit code 2).", failed);
        }
        return Ok(2);
    }
    Ok(0)
}

/// Print one block per job.
fn print_summary(finished: &[(Job, FetchResult)], duration: f64) {
    println!("\n📊 Job Summary:");
    for (job, result) in finished {
        let took = job
            .duration_seconds()
            .map(|s| format!(" in {:.2}s", s))
            .unwrap_or_default();

        match result {
            FetchResult::Ready(artifacts) => {
                println!("   ✅ {} ({}){}", job.dataset, job.id, took);
                for path in artifacts.paths() {
                    println!("      📄 {}", path.display());
                }
            }
            FetchResult::NoResult(reason) => {
                println!("   ➖ {} ({}){}: no result, {}", job.dataset, job.id, took, reason);
            }
            FetchResult::Failed(failure) => {
                println!("   ❌ {} ({}){}: {}", job.dataset, job.id, took, failure);
            }
            FetchResult::Pending(state) => {
                println!("   ⏳ {} ({}): {}", job.dataset, job.id, state);
            }
            FetchResult::NotFound => {
                println!("   ❓ {} ({}): unknown job", job.dataset, job.id);
            }
        }

        if let Some(cleaning) = job.outcome.as_ref().map(JobOutcome::cleaning) {
            println!(
                "      Rows read: {} | retained: {} | outliers removed: {}",
                cleaning.rows_read, cleaning.rows_retained, cleaning.outliers_removed
            );
        }
    }
    println!("   Duration: {:.1}s", duration);
}

/// Append a batch of trials to the data directory.
fn handle_ingest(config: &Config, batch_path: &std::path::Path) -> Result<i32> {
    let content = std::fs::read_to_string(batch_path)
        .with_context(|| format!("Failed to read batch file {}", batch_path.display()))?;
    let batch = ingest::TrialBatch::from_json(&content)?;

    let summary = ingest::append_batch(&config.general.data_dir, &config.dataset, &batch)?;

    println!("📥 Appended {} trial(s) for {}", summary.rows, batch.participant);
    println!("   {}", summary.population_file.display());
    println!("   {}", summary.participant_file.display());
    Ok(0)
}

/// List datasets and artifacts.
fn handle_list(config: &Config) -> Result<i32> {
    let data_scanner = scanner::DataScanner::new(
        config.general.data_dir.clone(),
        config.general.effective_output_dir(),
        config.dataset.clone(),
    );

    let datasets = data_scanner.datasets()?;
    println!("📂 Datasets in {}:", config.general.data_dir.display());
    if datasets.is_empty() {
        println!("   (none)");
    }
    for file in &datasets {
        let label = match &file.kind {
            scanner::FileKind::Population => "population".to_string(),
            scanner::FileKind::Participant { participant } => format!("participant {}", participant),
            scanner::FileKind::Artifact => "artifact".to_string(),
            scanner::FileKind::Other => "other".to_string(),
        };
        println!("   📄 {} ({} bytes, {})", file.name, file.size, label);
    }

    let artifacts = data_scanner.artifacts()?;
    println!(
        "\n📊 Artifacts in {}:",
        config.general.effective_output_dir().display()
    );
    if artifacts.is_empty() {
        println!("   (none)");
    }
    for file in &artifacts {
        let modified = file
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!("   📄 {} ({} bytes) {}", file.name, file.size, modified);
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging starts, so the source is returned for the caller
/// to log.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, config_path.display().to_string()));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, config::CONFIG_FILE_NAME.to_string())),
        Ok(None) => Ok((Config::default(), "defaults".to_string())),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}", e);
            Ok((Config::default(), "defaults".to_string()))
        }
    }
}
