//! Message-passing runtime
//!
//! Workers share no memory. They coordinate only through two blocking
//! collectives rooted at rank 0:
//!
//! - `broadcast`: the root's value is delivered to every rank
//! - `gather`: every rank's value is delivered to the root, in rank order
//!
//! Every collective call advances a sequence number on each rank, so a
//! message from the wrong collective is detected instead of silently
//! consumed. Receives are bounded by the configured timeout.
//!
//! # Modules
//!
//! - `protocol`: message definitions and framing
//! - `local`: in-process transport over crossbeam channels
//! - `tcp`: multi-process transport over TCP

pub mod local;
pub mod protocol;
pub mod tcp;

use crate::error::{SieveError, SieveResult};
use protocol::Message;

pub use local::{local_group, LocalCommunicator};
pub use tcp::TcpCommunicator;

/// Rank of the coordinator
pub const ROOT_RANK: usize = 0;

/// Collective operations between a fixed group of workers
pub trait Communicator {
    /// Rank of this worker in `[0, size)`
    fn rank(&self) -> usize;

    /// Number of workers in the group
    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT_RANK
    }

    /// One-to-all from the root
    ///
    /// The root's `value` is returned on every rank; the argument passed by
    /// other ranks is ignored. Blocks until the root's value arrives.
    fn broadcast(&mut self, value: Option<u64>) -> SieveResult<Option<u64>>;

    /// All-to-root
    ///
    /// The root receives every rank's value indexed by rank; other ranks
    /// receive `None`. Blocks the root until every rank has contributed.
    fn gather(&mut self, value: Option<u64>) -> SieveResult<Option<Vec<Option<u64>>>>;
}

/// Unpack a broadcast for collective `seq`
fn expect_broadcast(msg: Message, seq: u64) -> SieveResult<Option<u64>> {
    match msg {
        Message::Broadcast(b) if b.seq == seq => Ok(b.value),
        Message::Broadcast(b) => Err(SieveError::protocol(format!(
            "expected BROADCAST #{}, got BROADCAST #{}",
            seq, b.seq
        ))),
        other => Err(SieveError::protocol(format!(
            "expected BROADCAST #{}, got {}",
            seq,
            other.kind()
        ))),
    }
}

/// Slots filled by one gather on the root
struct GatherSlots {
    seq: u64,
    values: Vec<Option<u64>>,
    received: Vec<bool>,
}

impl GatherSlots {
    fn new(seq: u64, size: usize, own: Option<u64>) -> Self {
        let mut values = vec![None; size];
        let mut received = vec![false; size];
        values[ROOT_RANK] = own;
        received[ROOT_RANK] = true;

        Self {
            seq,
            values,
            received,
        }
    }

    /// Record one contribution, rejecting stale, foreign or duplicate ones
    fn accept(&mut self, msg: Message) -> SieveResult<()> {
        let c = match msg {
            Message::Contribute(c) => c,
            other => {
                return Err(SieveError::protocol(format!(
                    "expected CONTRIBUTE #{}, got {}",
                    self.seq,
                    other.kind()
                )))
            }
        };

        if c.seq != self.seq {
            return Err(SieveError::protocol(format!(
                "expected CONTRIBUTE #{}, got CONTRIBUTE #{} from rank {}",
                self.seq, c.seq, c.rank
            )));
        }
        if c.rank >= self.values.len() {
            return Err(SieveError::protocol(format!(
                "contribution from unknown rank {} (group size {})",
                c.rank,
                self.values.len()
            )));
        }
        if self.received[c.rank] {
            return Err(SieveError::protocol(format!(
                "duplicate contribution from rank {} for #{}",
                c.rank, self.seq
            )));
        }

        self.values[c.rank] = c.value;
        self.received[c.rank] = true;
        Ok(())
    }

    fn finish(self) -> Vec<Option<u64>> {
        self.values
    }
}
