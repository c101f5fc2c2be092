//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! The same `Config` is shipped to remote workers in the handshake, so every
//! section is serde-serializable.

pub mod cli;
pub mod toml;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sieve: SieveConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Configuration for a run over `[0, limit)` with `workers` workers,
    /// everything else at its default
    pub fn for_run(limit: usize, workers: usize) -> Self {
        Self {
            sieve: SieveConfig {
                limit,
                ..Default::default()
            },
            workers: WorkerConfig {
                count: workers,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// What to sieve and how candidates are elected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SieveConfig {
    /// Exclusive upper bound of the candidate domain
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// How the next candidate is elected each round
    #[serde(default)]
    pub election: ElectionStrategy,
    /// Compare the result against the sequential reference
    #[serde(default)]
    pub verify: bool,
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            election: ElectionStrategy::default(),
            verify: false,
        }
    }
}

fn default_limit() -> usize {
    10_000
}

/// Candidate election strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElectionStrategy {
    /// Every worker scans its own range; the coordinator takes the minimum
    #[default]
    GlobalMin,
    /// Only the coordinator's own range is scanned
    Coordinator,
}

impl fmt::Display for ElectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElectionStrategy::GlobalMin => write!(f, "global-min"),
            ElectionStrategy::Coordinator => write!(f, "coordinator"),
        }
    }
}

/// Worker group settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of workers (ranks); fixed for the whole run
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// Marking threads inside each worker (default: CPUs / workers)
    #[serde(default)]
    pub threads_per_worker: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            threads_per_worker: None,
        }
    }
}

impl WorkerConfig {
    /// Marking threads each worker should start on this machine
    pub fn threads(&self) -> usize {
        self.threads_per_worker
            .unwrap_or_else(|| crate::util::resource::default_threads_per_worker(self.count))
    }
}

fn default_worker_count() -> usize {
    1
}

/// Runtime behaviour of the message-passing layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on any blocking receive (broadcast, gather, handshake)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Report settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Report format on stdout
    #[serde(default)]
    pub format: OutputFormat,
    /// Also write the JSON report to this file
    #[serde(default)]
    pub json_output: Option<PathBuf>,
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
