//! Result verification
//!
//! Compares a distributed run against the sequential reference sieve. The
//! prime count is always checked; flags are checked for every partition the
//! outcome actually holds (all of them in-process, only rank 0's in the
//! multi-process modes).

use crate::distributed::SieveOutcome;
use crate::sieve::sequential;
use crate::worker::WorkerOutcome;
use serde::Serialize;

/// At most this many differing indices are kept in a report
pub const MAX_REPORTED_MISMATCHES: usize = 16;

/// Verification result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub limit: usize,
    pub expected_count: u64,
    pub actual_count: u64,
    /// First global indices whose flag differs from the reference
    pub mismatches: Vec<usize>,
    /// Number of partitions whose flags were compared
    pub partitions_checked: usize,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.expected_count == self.actual_count && self.mismatches.is_empty()
    }
}

/// Check only a prime count
#[cfg(test)]
pub(crate) fn verify_count(limit: usize, actual_count: u64) -> VerificationReport {
    VerificationReport {
        limit,
        expected_count: sequential::count_primes(limit),
        actual_count,
        mismatches: Vec::new(),
        partitions_checked: 0,
    }
}

/// Check the count and every partition held by `outcome`
pub fn verify_outcome(outcome: &SieveOutcome) -> VerificationReport {
    let reference = sequential::sieve(outcome.limit);
    let expected_count = reference.iter().filter(|&&flag| flag).count() as u64;

    let mut mismatches = Vec::new();
    for worker in &outcome.workers {
        collect_mismatches(&reference, worker, &mut mismatches);
    }

    VerificationReport {
        limit: outcome.limit,
        expected_count,
        actual_count: outcome.prime_count,
        mismatches,
        partitions_checked: outcome.workers.len(),
    }
}

fn collect_mismatches(reference: &[bool], worker: &WorkerOutcome, out: &mut Vec<usize>) {
    let start = worker.partition.start;
    if worker.flags.len() != worker.partition.len() {
        // Wrong-sized bitmap: report the partition start rather than guess
        if out.len() < MAX_REPORTED_MISMATCHES {
            out.push(start);
        }
        return;
    }

    for (i, &flag) in worker.flags.iter().enumerate() {
        if out.len() >= MAX_REPORTED_MISMATCHES {
            return;
        }
        let index = start + i;
        if reference.get(index).copied() != Some(flag) {
            out.push(index);
        }
    }
}
