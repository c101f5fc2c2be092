//! In-process sieve driver
//!
//! Runs every worker on its own named thread, connected by the channel
//! transport, and assembles the per-worker results once all of them have
//! converged.

use crate::comm::{local_group, Communicator};
use crate::config::Config;
use crate::coordinator::RoundSummary;
use crate::error::{SieveError, SieveResult};
use crate::worker::{SieveWorker, WorkerOutcome};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of a whole sieve run
#[derive(Debug, Clone)]
pub struct SieveOutcome {
    /// Exclusive upper bound that was sieved
    pub limit: usize,
    /// Primes in `[0, limit)`
    pub prime_count: u64,
    /// Local count of every rank, indexed by rank
    pub per_rank: Vec<u64>,
    /// Worker results held by this process, ascending by rank
    ///
    /// Every rank for an in-process run; rank 0 only when the workers were
    /// separate processes.
    pub workers: Vec<WorkerOutcome>,
    /// Rounds as observed by rank 0
    pub summary: RoundSummary,
    pub elapsed: Duration,
}

impl SieveOutcome {
    /// Assemble an outcome from worker results whose first entry is rank 0
    pub fn assemble(
        limit: usize,
        workers: Vec<WorkerOutcome>,
        elapsed: Duration,
    ) -> SieveResult<Self> {
        let root = workers
            .first()
            .filter(|w| w.rank == 0)
            .ok_or_else(|| SieveError::protocol("no outcome from rank 0"))?;
        let reduction = root
            .reduction
            .clone()
            .ok_or_else(|| SieveError::protocol("rank 0 finished without a reduction"))?;
        let summary = root.summary.clone();

        // Lockstep rounds mean every rank applied the same sieving primes
        let diverged = workers
            .iter()
            .find(|w| w.summary.sieving_primes != summary.sieving_primes);
        if let Some(w) = diverged {
            return Err(SieveError::protocol(format!(
                "rank {} sieved with {:?}, rank 0 with {:?}",
                w.rank, w.summary.sieving_primes, summary.sieving_primes
            )));
        }

        Ok(Self {
            limit,
            prime_count: reduction.total,
            per_rank: reduction.per_rank,
            workers,
            summary,
            elapsed,
        })
    }

    /// True when this outcome holds every rank's bitmap
    pub fn is_complete(&self) -> bool {
        self.workers.len() == self.per_rank.len()
    }

    /// Global indices of every prime held, ascending
    pub fn primes(&self) -> Vec<usize> {
        self.workers.iter().flat_map(|w| w.primes()).collect()
    }

    /// Local bitmaps in rank order
    pub fn bitmaps(&self) -> Vec<&[bool]> {
        self.workers.iter().map(|w| w.flags.as_slice()).collect()
    }

    /// Prime count and the local bitmaps in rank order
    pub fn into_parts(self) -> (u64, Vec<Vec<bool>>) {
        let bitmaps = self.workers.into_iter().map(|w| w.flags).collect();
        (self.prime_count, bitmaps)
    }
}

/// Sieve `[0, limit)` with `workers` in-process workers and default settings
pub fn run(limit: usize, workers: usize) -> SieveResult<SieveOutcome> {
    run_with_config(&Config::for_run(limit, workers))
}

/// Sieve with one thread per worker over the channel transport
pub fn run_with_config(config: &Config) -> SieveResult<SieveOutcome> {
    let workers = config.workers.count;
    if workers == 0 {
        return Err(SieveError::InvalidConfig("worker count must be at least 1".to_string()));
    }

    let limit = config.sieve.limit;
    info!(
        limit,
        workers,
        threads_per_worker = config.workers.threads(),
        election = %config.sieve.election,
        "Starting sieve"
    );

    let started = Instant::now();
    let mut handles = Vec::with_capacity(workers);
    for mut comm in local_group(workers, config.runtime.timeout()) {
        let rank = comm.rank();
        let config = config.clone();
        let handle = thread::Builder::new()
            .name(format!("sieve-worker-{}", rank))
            .spawn(move || SieveWorker::new(&config, rank)?.run(&mut comm))
            .map_err(|e| SieveError::transport(format!("Failed to spawn worker {}", rank), e))?;
        handles.push(handle);
    }

    let mut outcomes = Vec::with_capacity(workers);
    let mut failure: Option<SieveError> = None;
    for (rank, handle) in handles.into_iter().enumerate() {
        let err = match handle.join() {
            Ok(Ok(outcome)) => {
                outcomes.push(outcome);
                continue;
            }
            Ok(Err(err)) => err,
            Err(_) => SieveError::WorkerPanicked { rank },
        };
        warn!(rank, error = %err, "Worker failed");
        failure = Some(match failure {
            Some(first) if !first.is_peer_loss() || err.is_peer_loss() => first,
            _ => err,
        });
    }
    if let Some(err) = failure {
        return Err(err);
    }

    let outcome = SieveOutcome::assemble(limit, outcomes, started.elapsed())?;
    info!(
        prime_count = outcome.prime_count,
        rounds = outcome.summary.rounds,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "Sieve converged"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElectionStrategy;
    use crate::sieve::{partition_all, sequential};
    use rand::Rng;

    fn config(limit: usize, workers: usize, threads: usize) -> Config {
        let mut config = Config::for_run(limit, workers);
        config.workers.threads_per_worker = Some(threads);
        config
    }

    #[test]
    fn test_thirty_with_any_worker_count() {
        for workers in [1, 2, 3, 5, 10] {
            let outcome = run_with_config(&config(30, workers, 2)).unwrap();
            assert_eq!(outcome.prime_count, 10, "workers = {}", workers);
            assert_eq!(outcome.primes(), vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        }
    }

    #[test]
    fn test_known_counts() {
        assert_eq!(run(100, 4).unwrap().prime_count, 25);
        assert_eq!(run(1_000, 3).unwrap().prime_count, 168);
        assert_eq!(run(10_000, 4).unwrap().prime_count, 1_229);
    }

    #[test]
    fn test_degenerate_limits() {
        for limit in 0..=2 {
            let outcome = run_with_config(&config(limit, 2, 1)).unwrap();
            assert_eq!(outcome.prime_count, 0);
            assert_eq!(outcome.summary.rounds, 0);
        }
        assert_eq!(run_with_config(&config(3, 1, 1)).unwrap().prime_count, 1);
    }

    #[test]
    fn test_more_workers_than_candidates() {
        let outcome = run_with_config(&config(3, 5, 1)).unwrap();
        assert_eq!(outcome.prime_count, 1);
        assert_eq!(outcome.per_rank, vec![0, 0, 0, 0, 1]);
        assert_eq!(outcome.primes(), vec![2]);
    }

    #[test]
    fn test_single_worker_matches_sequential_bitmap() {
        let (count, bitmaps) = run_with_config(&config(500, 1, 3)).unwrap().into_parts();
        assert_eq!(count, sequential::count_primes(500));
        assert_eq!(bitmaps, vec![sequential::sieve(500)]);
    }

    #[test]
    fn test_bitmaps_follow_partitions() {
        let outcome = run_with_config(&config(97, 4, 2)).unwrap();
        assert!(outcome.is_complete());

        let reference = sequential::sieve(97);
        for (part, bitmap) in partition_all(97, 4).iter().zip(outcome.bitmaps()) {
            assert_eq!(bitmap, &reference[part.range()]);
        }
        assert_eq!(outcome.per_rank.iter().sum::<u64>(), outcome.prime_count);
    }

    #[test]
    fn test_random_agreement_with_sequential() {
        let mut rng = rand::thread_rng();
        for _ in 0..25 {
            let limit = rng.gen_range(0..4_000);
            let workers = rng.gen_range(1..=8);
            let threads = rng.gen_range(1..=3);
            let outcome = run_with_config(&config(limit, workers, threads)).unwrap();
            assert_eq!(
                outcome.primes(),
                sequential::primes(limit),
                "limit = {}, workers = {}",
                limit,
                workers
            );
        }
    }

    #[test]
    fn test_sieving_primes_stop_at_square_root() {
        let outcome = run_with_config(&config(121, 3, 1)).unwrap();
        assert_eq!(outcome.summary.sieving_primes, vec![2, 3, 5, 7, 11]);
        assert_eq!(outcome.summary.final_candidate, Some(13));
    }

    #[test]
    fn test_coordinator_election_within_root_range() {
        let mut cfg = config(1_000, 2, 1);
        cfg.sieve.election = ElectionStrategy::Coordinator;
        assert_eq!(run_with_config(&cfg).unwrap().prime_count, 168);
    }

    #[test]
    fn test_coordinator_election_exhausts() {
        // Rank 0 holds [0, 10) but sieving primes run up to √100 = 10
        let mut cfg = config(100, 10, 1);
        cfg.sieve.election = ElectionStrategy::Coordinator;
        match run_with_config(&cfg) {
            Err(SieveError::ElectionExhausted { candidate, range_end }) => {
                assert_eq!(candidate, 7);
                assert_eq!(range_end, 10);
            }
            other => panic!("expected exhausted election, got {:?}", other.map(|o| o.prime_count)),
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(run(100, 0), Err(SieveError::InvalidConfig(_))));
    }
}
