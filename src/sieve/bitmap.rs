//! Local prime bitmap
//!
//! One flag per global index in the owning worker's partition, indexed by
//! `global - start`. Flags only ever go from `true` to `false`. Writes from
//! marker threads are serialized by a mutex held for the single store.

use super::partition::Partition;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Primality flags for one worker's partition
#[derive(Debug)]
pub struct LocalBitmap {
    partition: Partition,
    flags: Mutex<Vec<bool>>,
}

impl LocalBitmap {
    /// Create an all-true bitmap for `partition`
    ///
    /// Global indices 0 and 1 are cleared by whichever partition owns them.
    pub fn new(partition: Partition) -> Self {
        let mut flags = vec![true; partition.len()];
        for index in [0usize, 1] {
            if partition.contains(index) {
                flags[index - partition.start] = false;
            }
        }

        Self {
            partition,
            flags: Mutex::new(flags),
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn start(&self) -> usize {
        self.partition.start
    }

    pub fn stop(&self) -> usize {
        self.partition.stop
    }

    // A panicking marker thread can only have left flags cleared, never set,
    // so a poisoned lock still guards a consistent bitmap.
    fn lock(&self) -> MutexGuard<'_, Vec<bool>> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a global index as composite
    ///
    /// Callers guarantee `index` lies inside the partition.
    #[inline]
    pub fn clear(&self, index: usize) {
        let offset = index - self.partition.start;
        let mut flags = self.lock();
        flags[offset] = false;
    }

    /// Current flag for a global index, `false` outside the partition
    #[cfg(test)]
    pub(crate) fn is_set(&self, index: usize) -> bool {
        if !self.partition.contains(index) {
            return false;
        }
        self.lock()[index - self.partition.start]
    }

    /// Smallest global index strictly greater than `candidate` still set
    pub fn next_set_after(&self, candidate: usize) -> Option<usize> {
        let from = candidate.saturating_add(1).max(self.partition.start);
        if from >= self.partition.stop {
            return None;
        }

        let flags = self.lock();
        flags[from - self.partition.start..]
            .iter()
            .position(|&flag| flag)
            .map(|pos| from + pos)
    }

    /// Number of indices still set
    pub fn count(&self) -> u64 {
        self.lock().iter().filter(|&&flag| flag).count() as u64
    }

    /// Global indices still set, ascending
    #[cfg(test)]
    pub(crate) fn set_indices(&self) -> Vec<usize> {
        let start = self.partition.start;
        self.lock()
            .iter()
            .enumerate()
            .filter(|(_, flag)| **flag)
            .map(|(offset, _)| start + offset)
            .collect()
    }

    /// Consume the bitmap and return the raw flags
    pub fn into_flags(self) -> Vec<bool> {
        self.flags.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
