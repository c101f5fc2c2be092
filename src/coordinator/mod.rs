//! Round coordinator
//!
//! Drives one worker through the sieve rounds. Every worker runs the same
//! state machine in lockstep; the collectives in `Electing` and
//! `Broadcasting` are the only points where workers wait for each other.
//!
//! ```text
//!            k² > N
//! AwaitCandidate ──────────────────────────────▶ Converged
//!     │  ▲  k² ≤ N                                   ▲
//!     ▼  │                                           │ no candidate
//! Marking ──▶ Electing ──▶ Broadcasting ─────────────┘
//!                              │ next k
//!                              └──▶ AwaitCandidate
//! ```
//!
//! Rank 0 is the coordinator. With `ElectionStrategy::GlobalMin` every
//! worker scans its own bitmap and rank 0 takes the minimum of the gathered
//! results; with `ElectionStrategy::Coordinator` only rank 0's range is
//! scanned.

use crate::comm::Communicator;
use crate::config::ElectionStrategy;
use crate::error::{SieveError, SieveResult};
use crate::sieve::sequential::continues;
use crate::sieve::{LocalBitmap, LocalMarker};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// First candidate of every run
pub const FIRST_CANDIDATE: usize = 2;

/// Round state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// Holding candidate `k`, about to run the continuation test
    AwaitCandidate,
    /// Clearing multiples of `k` in the local range
    Marking,
    /// Determining the next candidate
    Electing,
    /// Distributing the elected candidate from rank 0
    Broadcasting,
    /// Terminal: every sieving prime has been applied
    Converged,
}

/// What one worker observed over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Number of completed rounds
    pub rounds: u64,
    /// Candidate used in each round, in order
    pub sieving_primes: Vec<usize>,
    /// Candidate that failed the continuation test, `None` when the
    /// election found no candidate left
    pub final_candidate: Option<usize>,
    /// Bitmap stores issued by this worker's marker
    pub marks: u64,
}

/// Round state machine for one worker
pub struct RoundCoordinator<'a, C: Communicator> {
    comm: &'a mut C,
    bitmap: &'a LocalBitmap,
    marker: &'a LocalMarker,
    limit: usize,
    election: ElectionStrategy,
    state: RoundState,
    candidate: usize,
    elected: Option<u64>,
    summary: RoundSummary,
}

impl<'a, C: Communicator> RoundCoordinator<'a, C> {
    pub fn new(
        comm: &'a mut C,
        bitmap: &'a LocalBitmap,
        marker: &'a LocalMarker,
        limit: usize,
        election: ElectionStrategy,
    ) -> Self {
        Self {
            comm,
            bitmap,
            marker,
            limit,
            election,
            state: RoundState::AwaitCandidate,
            candidate: FIRST_CANDIDATE,
            elected: None,
            summary: RoundSummary::default(),
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    /// Candidate of the current round
    pub fn candidate(&self) -> usize {
        self.candidate
    }

    pub fn summary(&self) -> &RoundSummary {
        &self.summary
    }

    /// Perform one transition and return the new state
    pub fn step(&mut self) -> SieveResult<RoundState> {
        let rank = self.comm.rank();
        trace!(rank, state = ?self.state, k = self.candidate, "Round step");

        self.state = match self.state {
            RoundState::AwaitCandidate => {
                if continues(self.candidate, self.limit) {
                    RoundState::Marking
                } else {
                    self.summary.final_candidate = Some(self.candidate);
                    RoundState::Converged
                }
            }
            RoundState::Marking => {
                let stores = self.marker.mark(self.bitmap, self.candidate);
                self.summary.marks += stores;
                self.summary.rounds += 1;
                self.summary.sieving_primes.push(self.candidate);
                debug!(
                    rank,
                    round = self.summary.rounds,
                    k = self.candidate,
                    stores,
                    "Marked multiples"
                );
                RoundState::Electing
            }
            RoundState::Electing => {
                self.elected = self.elect()?;
                RoundState::Broadcasting
            }
            RoundState::Broadcasting => {
                let next = self.comm.broadcast(self.elected.take())?;
                match next {
                    None => {
                        debug!(rank, k = self.candidate, "No candidate left");
                        self.summary.final_candidate = None;
                        RoundState::Converged
                    }
                    Some(next) => {
                        self.candidate = self.advance(next)?;
                        RoundState::AwaitCandidate
                    }
                }
            }
            RoundState::Converged => RoundState::Converged,
        };

        Ok(self.state)
    }

    /// Step until `Converged`
    pub fn run(mut self) -> SieveResult<RoundSummary> {
        while self.step()? != RoundState::Converged {}
        Ok(self.summary)
    }

    /// Next candidate as seen from this rank; meaningful on rank 0 only
    fn elect(&mut self) -> SieveResult<Option<u64>> {
        match self.election {
            ElectionStrategy::GlobalMin => {
                let local = self.bitmap.next_set_after(self.candidate).map(|k| k as u64);
                let gathered = self.comm.gather(local)?;
                Ok(gathered.and_then(|values| values.into_iter().flatten().min()))
            }
            ElectionStrategy::Coordinator => {
                if !self.comm.is_root() {
                    return Ok(None);
                }
                match self.bitmap.next_set_after(self.candidate) {
                    Some(next) => Ok(Some(next as u64)),
                    // Every prime up to √N lies in our range and none is left
                    None if !continues(self.bitmap.stop(), self.limit) => Ok(None),
                    None => Err(SieveError::ElectionExhausted {
                        candidate: self.candidate,
                        range_end: self.bitmap.stop(),
                    }),
                }
            }
        }
    }

    /// Validate a broadcast candidate against the current one
    fn advance(&self, next: u64) -> SieveResult<usize> {
        let next = usize::try_from(next).map_err(|_| {
            SieveError::protocol(format!("candidate {} does not fit in usize", next))
        })?;
        if next <= self.candidate {
            return Err(SieveError::protocol(format!(
                "broadcast candidate {} does not advance past {}",
                next, self.candidate
            )));
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::local_group;
    use crate::sieve::partition;
    use std::time::Duration;

    fn single(limit: usize) -> (crate::comm::LocalCommunicator, LocalBitmap, LocalMarker) {
        let comm = local_group(1, Duration::from_secs(5)).pop().unwrap();
        let bitmap = LocalBitmap::new(partition(limit, 1, 0));
        let marker = LocalMarker::new(0, 2).unwrap();
        (comm, bitmap, marker)
    }

    #[test]
    fn test_election_sequence_for_hundred() {
        let (mut comm, bitmap, marker) = single(100);
        let mut rounds =
            RoundCoordinator::new(&mut comm, &bitmap, &marker, 100, ElectionStrategy::GlobalMin);

        assert_eq!(rounds.state(), RoundState::AwaitCandidate);
        assert_eq!(rounds.candidate(), 2);

        let mut elected = Vec::new();
        loop {
            match rounds.step().unwrap() {
                RoundState::AwaitCandidate => elected.push(rounds.candidate()),
                RoundState::Converged => break,
                _ => {}
            }
        }

        assert_eq!(elected, vec![3, 5, 7, 11]);
        let summary = rounds.summary().clone();
        assert_eq!(summary.sieving_primes, vec![2, 3, 5, 7]);
        assert_eq!(summary.final_candidate, Some(11));
        assert_eq!(summary.rounds, 4);
        assert_eq!(bitmap.count(), 25);
    }

    #[test]
    fn test_state_order_within_round() {
        let (mut comm, bitmap, marker) = single(30);
        let mut rounds =
            RoundCoordinator::new(&mut comm, &bitmap, &marker, 30, ElectionStrategy::GlobalMin);

        let states: Vec<RoundState> = (0..5).map(|_| rounds.step().unwrap()).collect();
        assert_eq!(
            states,
            vec![
                RoundState::Marking,
                RoundState::Electing,
                RoundState::Broadcasting,
                RoundState::AwaitCandidate,
                RoundState::Marking,
            ]
        );
        assert_eq!(rounds.candidate(), 3);
    }

    #[test]
    fn test_converges_immediately_below_four() {
        for limit in 0..4 {
            let (mut comm, bitmap, marker) = single(limit);
            let strategy = ElectionStrategy::GlobalMin;
            let summary = RoundCoordinator::new(&mut comm, &bitmap, &marker, limit, strategy)
                .run()
                .unwrap();
            assert_eq!(summary.rounds, 0);
            assert_eq!(summary.final_candidate, Some(2));
        }
    }

    #[test]
    fn test_converged_is_terminal() {
        let (mut comm, bitmap, marker) = single(3);
        let mut rounds =
            RoundCoordinator::new(&mut comm, &bitmap, &marker, 3, ElectionStrategy::Coordinator);
        assert_eq!(rounds.step().unwrap(), RoundState::Converged);
        assert_eq!(rounds.step().unwrap(), RoundState::Converged);
    }

    #[test]
    fn test_coordinator_election_single_worker() {
        let (mut comm, bitmap, marker) = single(1000);
        let strategy = ElectionStrategy::Coordinator;
        let summary = RoundCoordinator::new(&mut comm, &bitmap, &marker, 1000, strategy)
            .run()
            .unwrap();
        assert_eq!(summary.sieving_primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31]);
        assert_eq!(summary.final_candidate, Some(37));
        assert_eq!(bitmap.count(), 168);
    }
}
