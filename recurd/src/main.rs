//! recurd - Recurring Job Runner
//!
//! CLI entry point for scheduling configured jobs on a dispatcher pool.

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{info, warn};

use recurd::cli::{Cli, Command, OutputFormat, get_log_path};
use recurd::config::Config;
use recurd::events::{FanoutSink, IterationRecord, JsonlSink, OutcomeSink, TracingSink, read_records};
use recurd::jobs::{CommandAction, JobSpec, schedule_jobs};
use recurd::scheduler::{LoopHandle, SchedulerPool};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "recurd loaded config: workers={}, max_loops={}, jobs={}",
        config.pool.workers,
        config.pool.max_loops,
        config.jobs.len()
    );

    // Dispatch command
    match cli.command {
        Some(Command::Run { for_secs }) => cmd_run(&config, for_secs.map(Duration::from_secs)).await,
        Some(Command::Check { format }) => cmd_check(&config, format),
        Some(Command::Once { job }) => cmd_once(&config, &job).await,
        Some(Command::History { job, lines, format }) => cmd_history(&config, job.as_deref(), lines, format),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Build the outcome sink: tracing always, JSONL when configured
fn build_sink(config: &Config) -> Result<FanoutSink> {
    let mut sink = FanoutSink::new().with(Arc::new(TracingSink));

    if let Some(path) = config.log.expanded_jsonl_path() {
        let jsonl = JsonlSink::open(&path).context(format!("Failed to open outcome log {}", path.display()))?;
        info!("Writing outcomes to {}", path.display());
        sink = sink.with(Arc::new(jsonl));
    }

    Ok(sink)
}

/// Schedule every enabled job and run until interrupted
async fn cmd_run(config: &Config, run_for: Option<Duration>) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let sink: Arc<dyn OutcomeSink> = Arc::new(build_sink(config)?);
    let pool = SchedulerPool::new(config.pool.clone(), sink)?;
    let handles = schedule_jobs(&pool, config.enabled_jobs())?;

    if handles.is_empty() {
        println!("{} No enabled jobs in config, nothing to run", "!".yellow());
        return Ok(());
    }

    println!(
        "{} Scheduled {} job(s) on {} dispatcher(s)",
        "✓".green(),
        handles.len(),
        pool.worker_count()
    );
    for handle in &handles {
        println!("  {} every {:?} ({})", handle.name().cyan(), handle.interval(), handle.id());
    }
    println!("Press Ctrl+C to stop");

    wait_for_shutdown(run_for).await?;

    info!("Shutting down scheduler");
    let report = pool.shutdown().await;
    if report.loops_remaining > 0 {
        warn!(remaining = report.loops_remaining, "Loops did not exit before the shutdown timeout");
    }

    print_summary(&handles);
    if report.loops_remaining > 0 {
        println!(
            "{} {} loop(s) were still running at exit",
            "!".yellow(),
            report.loops_remaining
        );
    }
    Ok(())
}

/// Wait for Ctrl+C, SIGTERM or the optional run duration
async fn wait_for_shutdown(run_for: Option<Duration>) -> Result<()> {
    let deadline = async {
        match run_for {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
            _ = deadline => info!("Run duration elapsed"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                warn!("Ctrl+C received");
            }
            _ = deadline => info!("Run duration elapsed"),
        }
    }

    Ok(())
}

fn print_summary(handles: &[LoopHandle]) {
    println!();
    println!("Job summary");
    println!("-----------");
    for handle in handles {
        let stats = handle.stats();
        let marker = if stats.failures == 0 { "✓".green() } else { "✗".red() };
        println!(
            "{} {}: {} run(s), {} failure(s)",
            marker,
            handle.name(),
            stats.runs,
            stats.failures
        );
        if let Some(err) = &stats.last_error {
            println!("    last error: {}", err);
        }
    }
}

/// Validate the config and list its jobs
fn cmd_check(config: &Config, format: OutputFormat) -> Result<()> {
    let validation = config.validate();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "valid": validation.is_ok(),
                "error": validation.as_ref().err().map(|e| e.to_string()),
                "pool": config.pool,
                "log": config.log,
                "jobs": config.jobs,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Pool");
            println!("----");
            println!("Workers:          {}", config.pool.resolved_workers());
            println!("Max loops:        {}", config.pool.resolved_max_loops());
            println!("Overflow:         {:?}", config.pool.overflow);
            println!("Shutdown:         {:?}", config.pool.shutdown);
            println!("Shutdown timeout: {:?}", config.pool.shutdown_timeout());
            if let Some(path) = config.log.expanded_jsonl_path() {
                println!("Outcome log:      {}", path.display());
            }
            println!();

            if config.jobs.is_empty() {
                println!("No jobs configured.");
            } else {
                let enabled = config.enabled_jobs().count();
                println!("Jobs ({} of {} enabled)", enabled, config.jobs.len());
                println!("----");
                for job in &config.jobs {
                    print_job(job);
                }
            }
            println!();

            match &validation {
                Ok(()) => println!("{} Config is valid", "✓".green()),
                Err(e) => println!("{} {}", "✗".red(), e),
            }
        }
    }

    validation
}

fn print_job(job: &JobSpec) {
    let state = if job.enabled { "enabled".green() } else { "disabled".dimmed() };
    let first = if job.run_immediately { "immediately" } else { "after one interval" };
    println!("  {} [{}]", job.name.cyan(), state);
    println!("    every {}s, first run {}", job.interval_secs, first);
    println!("    $ {}", job.command);
}

/// Run one job a single time
async fn cmd_once(config: &Config, name: &str) -> Result<()> {
    let job = config
        .job(name)
        .ok_or_else(|| eyre::eyre!("No job named '{}' in config", name))?;
    job.validate()?;

    info!(job = %job.name, command = %job.command, "Running job once");
    let started = Instant::now();
    let result = CommandAction::new(job.command.clone()).execute().await;
    let elapsed = started.elapsed();

    match result {
        Ok(()) => {
            println!("{} {} succeeded in {:?}", "✓".green(), job.name, elapsed);
            Ok(())
        }
        Err(e) => {
            println!("{} {} failed in {:?}: {}", "✗".red(), job.name, elapsed, e);
            Err(eyre::Report::new(e).wrap_err(format!("Job '{}' failed", job.name)))
        }
    }
}

/// Print the most recent records from the JSONL outcome log
fn cmd_history(config: &Config, job: Option<&str>, lines: usize, format: OutputFormat) -> Result<()> {
    let Some(path) = config.log.expanded_jsonl_path() else {
        println!("No outcome log configured. Set log.jsonl-path in the config file.");
        return Ok(());
    };

    let records: Vec<IterationRecord> = read_records(&path)
        .context(format!("Failed to read outcome log {}", path.display()))?
        .into_iter()
        .filter(|r| job.is_none_or(|name| r.task_name == name))
        .collect();
    let start = records.len().saturating_sub(lines);
    let recent = &records[start..];

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(recent)?);
        }
        OutputFormat::Text => {
            if recent.is_empty() {
                println!("No records in {}", path.display());
                return Ok(());
            }
            for record in recent {
                let marker = if record.is_failure() { "✗".red() } else { "✓".green() };
                print!(
                    "{} {} {} #{} ({}ms)",
                    marker,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.task_name,
                    record.iteration,
                    record.duration_ms
                );
                match &record.error {
                    Some(err) => println!(": {}", err),
                    None => println!(),
                }
            }
        }
    }

    Ok(())
}
