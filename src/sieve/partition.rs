//! Range partitioning
//!
//! Splits the candidate domain `[0, limit)` into one contiguous half-open
//! range per worker. Every worker gets `limit / workers` numbers; the last
//! worker also absorbs the remainder of the integer division.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A worker's half-open slice `[start, stop)` of the candidate domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Rank of the owning worker
    pub rank: usize,
    /// First global index owned (inclusive)
    pub start: usize,
    /// One past the last global index owned
    pub stop: usize,
}

impl Partition {
    /// Number of indices in this partition
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Whether `index` falls inside this partition
    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.stop).contains(&index)
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.stop
    }
}

/// Compute the partition owned by `rank`
///
/// `workers` must be at least 1 and `rank` must be below `workers`; both are
/// checked when the configuration is validated.
pub fn partition(limit: usize, workers: usize, rank: usize) -> Partition {
    debug_assert!(workers > 0 && rank < workers);

    let chunk = limit / workers;
    let start = chunk * rank;
    let stop = if rank == workers - 1 {
        limit
    } else {
        chunk * (rank + 1)
    };

    Partition { rank, start, stop }
}

/// Partitions for every rank, in rank order
pub fn partition_all(limit: usize, workers: usize) -> Vec<Partition> {
    (0..workers).map(|rank| partition(limit, workers, rank)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let parts = partition_all(100, 4);
        let ranges: Vec<_> = parts.iter().map(|p| (p.start, p.stop)).collect();
        assert_eq!(ranges, vec![(0, 25), (25, 50), (50, 75), (75, 100)]);
    }

    #[test]
    fn test_last_worker_absorbs_remainder() {
        let parts = partition_all(30, 4);
        assert_eq!(parts[0].len(), 7);
        assert_eq!(parts[1].len(), 7);
        assert_eq!(parts[2].len(), 7);
        assert_eq!(parts[3], Partition { rank: 3, start: 21, stop: 30 });
    }

    #[test]
    fn test_exhaustive_and_disjoint() {
        for limit in [0usize, 1, 2, 7, 30, 97, 1000] {
            for workers in 1..=12 {
                let parts = partition_all(limit, workers);
                assert_eq!(parts.first().map(|p| p.start), Some(0));
                assert_eq!(parts.last().map(|p| p.stop), Some(limit));
                for pair in parts.windows(2) {
                    assert_eq!(
                        pair[0].stop, pair[1].start,
                        "gap or overlap for limit={} workers={}",
                        limit, workers
                    );
                }
                let covered: usize = parts.iter().map(Partition::len).sum();
                assert_eq!(covered, limit);
            }
        }
    }

    #[test]
    fn test_more_workers_than_numbers() {
        let parts = partition_all(3, 5);
        assert!(parts[..4].iter().all(Partition::is_empty));
        assert_eq!(parts[4].range(), 0..3);
    }

    #[test]
    fn test_single_worker_owns_everything() {
        let p = partition(42, 1, 0);
        assert_eq!(p.range(), 0..42);
        assert!(p.contains(0));
        assert!(p.contains(41));
        assert!(!p.contains(42));
    }
}
