//! Local marker
//!
//! Clears every multiple of the current candidate inside one worker's
//! partition. The sweep over multiples runs on the worker's own rayon pool;
//! each thread computes its target index independently and only the store
//! itself goes through the bitmap's lock.

use super::bitmap::LocalBitmap;
use crate::error::SieveResult;
use rayon::prelude::*;
use rayon::ThreadPool;

/// First multiple of `candidate` that the sweep over `[start, ..)` clears
///
/// This is `max(candidate, ceil(start / candidate)) * candidate`: the sweep
/// never starts below `candidate²`, so the candidate itself and multiples
/// already covered by smaller primes are left alone even when the
/// partition begins below `candidate²`. Returns `None` for a zero candidate
/// or when the multiple does not fit in `usize`.
pub fn first_multiple(start: usize, candidate: usize) -> Option<usize> {
    if candidate == 0 {
        return None;
    }
    start
        .div_ceil(candidate)
        .max(candidate)
        .checked_mul(candidate)
}

/// Thread-parallel marker owned by a single worker
pub struct LocalMarker {
    pool: ThreadPool,
}

impl LocalMarker {
    /// Build a marker backed by `threads` rayon threads
    pub fn new(rank: usize, threads: usize) -> SieveResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |i| format!("sieve-{}-mark-{}", rank, i))
            .build()?;

        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Clear every multiple of `candidate` in the bitmap's partition
    ///
    /// Returns the number of stores issued. All threads have finished when
    /// this returns.
    pub fn mark(&self, bitmap: &LocalBitmap, candidate: usize) -> u64 {
        let stop = bitmap.stop();
        let first = match first_multiple(bitmap.start(), candidate) {
            Some(first) if first < stop => first,
            _ => return 0,
        };
        let multiples = (stop - first).div_ceil(candidate);

        self.pool.install(|| {
            (0..multiples)
                .into_par_iter()
                .for_each(|i| bitmap.clear(first + i * candidate));
        });

        multiples as u64
    }
}

impl std::fmt::Debug for LocalMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMarker")
            .field("threads", &self.threads())
            .finish()
    }
}
