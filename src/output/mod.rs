//! Run reports
//!
//! A `RunReport` is built once, on rank 0, from the finished run and then
//! rendered as text or JSON.

pub mod json;
pub mod text;

use crate::config::Config;
use crate::distributed::SieveOutcome;
use crate::sieve::partition_all;
use crate::util::verification::VerificationReport;
use json::JsonDuration;
use serde::Serialize;
use std::time::Duration;

/// Everything printed about one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// RFC 3339 timestamp of report creation
    pub generated_at: String,
    pub mode: String,
    pub limit: usize,
    pub workers: usize,
    pub threads_per_worker: usize,
    pub election: String,
    pub prime_count: u64,
    pub elapsed: JsonDuration,
    pub rounds: u64,
    pub sieving_primes: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_candidate: Option<usize>,
    pub per_rank: Vec<RankReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

/// One worker's share of the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankReport {
    pub rank: usize,
    pub start: usize,
    pub stop: usize,
    pub prime_count: u64,
}

impl RunReport {
    /// Report for a run of the distributed sieve
    pub fn from_outcome(
        mode: &str,
        config: &Config,
        outcome: &SieveOutcome,
        verification: Option<VerificationReport>,
    ) -> Self {
        let per_rank = partition_all(outcome.limit, outcome.per_rank.len())
            .into_iter()
            .zip(&outcome.per_rank)
            .map(|(part, &prime_count)| RankReport {
                rank: part.rank,
                start: part.start,
                stop: part.stop,
                prime_count,
            })
            .collect();

        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            mode: mode.to_string(),
            limit: outcome.limit,
            workers: outcome.per_rank.len(),
            threads_per_worker: config.workers.threads(),
            election: config.sieve.election.to_string(),
            prime_count: outcome.prime_count,
            elapsed: JsonDuration::from_duration(outcome.elapsed),
            rounds: outcome.summary.rounds,
            sieving_primes: outcome.summary.sieving_primes.clone(),
            final_candidate: outcome.summary.final_candidate,
            per_rank,
            verification,
        }
    }

    /// Report for the single-threaded reference sieve
    pub fn sequential(limit: usize, prime_count: u64, elapsed: Duration) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            mode: "sequential".to_string(),
            limit,
            workers: 1,
            threads_per_worker: 1,
            election: "none".to_string(),
            prime_count,
            elapsed: JsonDuration::from_duration(elapsed),
            rounds: 0,
            sieving_primes: Vec::new(),
            final_candidate: None,
            per_rank: vec![RankReport {
                rank: 0,
                start: 0,
                stop: limit,
                prime_count,
            }],
            verification: None,
        }
    }
}
