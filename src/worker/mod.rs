//! Sieve worker
//!
//! A `SieveWorker` is one rank of the distributed sieve. It owns the bitmap
//! for its partition and the thread pool that marks it, and talks to the
//! rest of the group only through a `Communicator`.
//!
//! # Lifecycle
//!
//! 1. **Creation**: `SieveWorker::new()` computes the partition, allocates
//!    the bitmap and builds the marking pool
//! 2. **Rounds**: `run()` drives the `RoundCoordinator` until it converges
//! 3. **Reduction**: local prime counts are gathered on rank 0
//! 4. **Completion**: returns a `WorkerOutcome` holding the bitmap
//!
//! The same code runs on a thread (in-process transport) and in a separate
//! process (TCP transport).

use crate::comm::Communicator;
use crate::config::Config;
use crate::coordinator::{RoundCoordinator, RoundSummary};
use crate::error::{SieveError, SieveResult};
use crate::sieve::{partition, LocalBitmap, LocalMarker, Partition};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Global prime count assembled on rank 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reduction {
    /// Sum of every rank's local count
    pub total: u64,
    /// Local count of each rank, indexed by rank
    pub per_rank: Vec<u64>,
}

/// Result of one worker's run
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub rank: usize,
    pub partition: Partition,
    /// Final flags for `partition`, index `i` standing for `partition.start + i`
    pub flags: Vec<bool>,
    /// Primes found in `partition`
    pub local_count: u64,
    pub summary: RoundSummary,
    /// Present on rank 0 only
    pub reduction: Option<Reduction>,
}

impl WorkerOutcome {
    /// Global indices still marked prime in this partition
    pub fn primes(&self) -> impl Iterator<Item = usize> + '_ {
        let start = self.partition.start;
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, flag)| **flag)
            .map(move |(i, _)| start + i)
    }
}

/// One rank of the distributed sieve
pub struct SieveWorker {
    rank: usize,
    workers: usize,
    limit: usize,
    config: Config,
    bitmap: LocalBitmap,
    marker: LocalMarker,
}

impl SieveWorker {
    /// Prepare rank `rank` of a group sized by `config.workers.count`
    pub fn new(config: &Config, rank: usize) -> SieveResult<Self> {
        let workers = config.workers.count;
        if workers == 0 {
            return Err(SieveError::InvalidConfig("worker count must be at least 1".to_string()));
        }
        if rank >= workers {
            return Err(SieveError::InvalidConfig(format!(
                "rank {} out of range for {} workers",
                rank, workers
            )));
        }

        let limit = config.sieve.limit;
        let part = partition(limit, workers, rank);
        let marker = LocalMarker::new(rank, config.workers.threads())?;

        debug!(
            rank,
            start = part.start,
            stop = part.stop,
            threads = marker.threads(),
            "Worker ready"
        );

        Ok(Self {
            rank,
            workers,
            limit,
            config: config.clone(),
            bitmap: LocalBitmap::new(part),
            marker,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn partition(&self) -> Partition {
        self.bitmap.partition()
    }

    /// Run every round, then reduce the local counts onto rank 0
    pub fn run<C: Communicator>(self, comm: &mut C) -> SieveResult<WorkerOutcome> {
        if comm.rank() != self.rank || comm.size() != self.workers {
            return Err(SieveError::InvalidConfig(format!(
                "worker is rank {}/{} but communicator is rank {}/{}",
                self.rank,
                self.workers,
                comm.rank(),
                comm.size()
            )));
        }

        let started = Instant::now();
        let summary = RoundCoordinator::new(
            comm,
            &self.bitmap,
            &self.marker,
            self.limit,
            self.config.sieve.election,
        )
        .run()?;

        let local_count = self.bitmap.count();
        let gathered = comm.gather(Some(local_count))?;
        let reduction = gathered.map(|values| {
            let per_rank: Vec<u64> = values.into_iter().map(|v| v.unwrap_or(0)).collect();
            Reduction {
                total: per_rank.iter().sum(),
                per_rank,
            }
        });

        info!(
            rank = self.rank,
            rounds = summary.rounds,
            local_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Worker finished"
        );

        let partition = self.bitmap.partition();
        Ok(WorkerOutcome {
            rank: self.rank,
            partition,
            flags: self.bitmap.into_flags(),
            local_count,
            summary,
            reduction,
        })
    }
}
