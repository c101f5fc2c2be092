//! CLI argument parsing using clap

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Standalone mode (default) - every worker is a thread of this process
    Standalone,
    /// Cluster mode - spawn one local process per extra worker
    Cluster,
    /// Coordinator mode - act as rank 0 and wait for external workers
    Coordinator,
    /// Worker mode - join a coordinator (spawned by cluster mode or started by hand)
    Worker,
    /// Sequential reference sieve only
    Sequential,
}

/// Candidate election strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ElectionArg {
    /// Minimum over every worker's local scan
    GlobalMin,
    /// Coordinator's own range only
    Coordinator,
}

/// primesieve - hybrid parallel Sieve of Eratosthenes
#[derive(Parser, Debug)]
#[command(name = "primesieve")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode
    #[arg(long, value_enum, default_value = "standalone")]
    pub mode: ExecutionMode,

    /// Exclusive upper bound N (accepts k, M, G suffixes, e.g. 10M) [default: 10000]
    #[arg(short = 'n', long, env = "PRIMESIEVE_LIMIT")]
    pub limit: Option<String>,

    /// Number of workers [default: 1]
    #[arg(short = 'w', long, env = "PRIMESIEVE_WORKERS")]
    pub workers: Option<usize>,

    /// Marking threads per worker [default: CPUs / workers]
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Candidate election strategy [default: global-min]
    #[arg(long, value_enum)]
    pub election: Option<ElectionArg>,

    /// Timeout for every blocking receive (e.g. 500ms, 30s, 2m) [default: 30s]
    #[arg(long)]
    pub timeout: Option<String>,

    /// Compare the result against the sequential reference
    #[arg(long)]
    pub verify: bool,

    /// TOML configuration file (CLI options take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON report to a file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Address to listen on (coordinator mode)
    #[arg(long, default_value = "0.0.0.0:7878")]
    pub listen: String,

    /// Coordinator address to join (worker mode)
    #[arg(long)]
    pub connect: Option<String>,

    /// Rank to request from the coordinator (worker mode)
    #[arg(long)]
    pub rank: Option<usize>,

    /// Validate and print the configuration without sieving
    #[arg(long)]
    pub dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable logging
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mode == ExecutionMode::Worker {
            // Everything else comes from the coordinator's handshake
            if self.connect.is_none() {
                anyhow::bail!("--connect is required in worker mode");
            }
            return Ok(());
        }

        if self.connect.is_some() {
            anyhow::bail!("--connect is only valid in worker mode");
        }
        if self.rank.is_some() {
            anyhow::bail!("--rank is only valid in worker mode");
        }

        if self.workers == Some(0) {
            anyhow::bail!("workers must be at least 1");
        }
        if self.threads == Some(0) {
            anyhow::bail!("threads must be at least 1");
        }
        if self.mode == ExecutionMode::Sequential && self.workers.is_some_and(|w| w > 1) {
            anyhow::bail!("sequential mode always runs a single worker");
        }
        if self.verbose > 0 && self.quiet {
            anyhow::bail!("--verbose and --quiet are mutually exclusive");
        }

        Ok(())
    }
}
