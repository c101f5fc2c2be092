//! primesieve CLI entry point

use anyhow::{Context, Result};
use primesieve::config::cli::{Cli, ExecutionMode};
use primesieve::config::toml::{load_config, parse_duration_ms};
use primesieve::config::validator::validate_config;
use primesieve::config::{Config, OutputFormat, RuntimeConfig};
use primesieve::distributed::{run_cluster, run_coordinator, run_with_config, run_worker};
use primesieve::output::{json, text, RunReport};
use primesieve::sieve::{partition_all, sequential};
use primesieve::util::verification::verify_outcome;
use std::time::{Duration, Instant};
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;
    setup_logging(cli.verbose, cli.quiet);

    match cli.mode {
        ExecutionMode::Worker => run_worker_mode(&cli),
        mode => run_root_mode(&cli, mode),
    }
}

/// Log to stderr; `RUST_LOG` overrides the verbosity flags
fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info"),
            2 => tracing_subscriber::EnvFilter::new("debug"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .init();
}

/// Run a non-root worker; all settings but the timeout come from rank 0
fn run_worker_mode(cli: &Cli) -> Result<()> {
    let connect = cli
        .connect
        .as_deref()
        .context("--connect is required in worker mode")?;
    let timeout_ms = match cli.timeout {
        Some(ref t) => parse_duration_ms(t).context("Invalid timeout")?,
        None => RuntimeConfig::default().timeout_ms,
    };

    let outcome = run_worker(connect, cli.rank, Duration::from_millis(timeout_ms))?;
    info!(
        rank = outcome.rank,
        start = outcome.partition.start,
        stop = outcome.partition.stop,
        local_count = outcome.local_count,
        "Worker done"
    );
    Ok(())
}

/// Run as rank 0 (or alone) and report
fn run_root_mode(cli: &Cli, mode: ExecutionMode) -> Result<()> {
    let config = load_config(cli)?;
    validate_config(&config).context("Configuration validation failed")?;

    let mode_name = format!("{:?}", mode).to_lowercase();
    if cli.dry_run {
        print_configuration(&config, &mode_name);
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let outcome = match mode {
        ExecutionMode::Sequential => {
            let started = Instant::now();
            let count = sequential::count_primes(config.sieve.limit);
            let report = RunReport::sequential(config.sieve.limit, count, started.elapsed());
            return emit_report(&report, &config);
        }
        ExecutionMode::Standalone => run_with_config(&config).context("Sieve run failed")?,
        ExecutionMode::Cluster => run_cluster(&config)?,
        ExecutionMode::Coordinator => run_coordinator(&config, &cli.listen)?,
        ExecutionMode::Worker => anyhow::bail!("worker mode does not report"),
    };

    let verification = config.sieve.verify.then(|| verify_outcome(&outcome));
    let report = RunReport::from_outcome(&mode_name, &config, &outcome, verification.clone());
    emit_report(&report, &config)?;

    if let Some(v) = verification {
        if !v.passed() {
            anyhow::bail!(
                "Verification failed: expected {} primes, got {} ({} mismatched indices reported)",
                v.expected_count,
                v.actual_count,
                v.mismatches.len()
            );
        }
        info!(partitions = v.partitions_checked, "Verification passed");
    }

    Ok(())
}

fn emit_report(report: &RunReport, config: &Config) -> Result<()> {
    match config.output.format {
        OutputFormat::Text => text::print_results(report),
        OutputFormat::Json => json::print_json(report)?,
    }

    if let Some(ref path) = config.output.json_output {
        json::write_json_output(path, report, true)
            .with_context(|| format!("Failed to write JSON report to {}", path.display()))?;
        info!(path = %path.display(), "JSON report written");
    }

    Ok(())
}

fn print_configuration(config: &Config, mode: &str) {
    println!("Configuration:");
    println!("  Mode: {}", mode);
    println!("  Sieve:");
    println!("    Limit: {}", config.sieve.limit);
    println!("    Election: {}", config.sieve.election);
    println!("    Verify: {}", config.sieve.verify);
    println!("  Workers:");
    println!("    Count: {}", config.workers.count);
    println!("    Threads per worker: {}", config.workers.threads());
    for part in partition_all(config.sieve.limit, config.workers.count) {
        println!("    Rank {}: [{}, {})", part.rank, part.start, part.stop);
    }
    println!("  Runtime:");
    println!("    Timeout: {}ms", config.runtime.timeout_ms);
}
