//! In-process transport
//!
//! Each worker runs on its own thread and owns one `LocalCommunicator`.
//! The group is a star around rank 0: the root holds one downlink per
//! worker and a single shared uplink all workers send on. Nothing but
//! protocol messages crosses between workers.

use super::protocol::{BroadcastMessage, ContributeMessage, Message};
use super::{expect_broadcast, Communicator, GatherSlots, ROOT_RANK};
use crate::error::{SieveError, SieveResult};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

enum Link {
    Root {
        downlinks: Vec<Sender<Message>>,
        uplink: Receiver<Message>,
    },
    Peer {
        uplink: Sender<Message>,
        downlink: Receiver<Message>,
    },
}

/// Channel-backed communicator for one worker thread
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    seq: u64,
    timeout: Duration,
    link: Link,
}

/// Build a fully connected group of `size` communicators, in rank order
pub fn local_group(size: usize, timeout: Duration) -> Vec<LocalCommunicator> {
    let (up_tx, up_rx) = unbounded();
    let mut downlinks = Vec::with_capacity(size.saturating_sub(1));
    let mut peers = Vec::with_capacity(size.saturating_sub(1));

    for rank in 1..size {
        let (down_tx, down_rx) = unbounded();
        downlinks.push(down_tx);
        peers.push(LocalCommunicator {
            rank,
            size,
            seq: 0,
            timeout,
            link: Link::Peer {
                uplink: up_tx.clone(),
                downlink: down_rx,
            },
        });
    }

    let root = LocalCommunicator {
        rank: ROOT_RANK,
        size,
        seq: 0,
        timeout,
        link: Link::Root {
            downlinks,
            uplink: up_rx,
        },
    };

    std::iter::once(root).chain(peers).collect()
}

impl LocalCommunicator {
    fn recv(
        &self,
        rx: &Receiver<Message>,
        operation: &'static str,
        peer: &str,
    ) -> SieveResult<Message> {
        rx.recv_timeout(self.timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => SieveError::Timeout {
                rank: Some(self.rank),
                operation,
                after_ms: self.timeout.as_millis() as u64,
            },
            RecvTimeoutError::Disconnected => SieveError::Disconnected {
                rank: self.rank,
                peer: peer.to_string(),
            },
        })
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast(&mut self, value: Option<u64>) -> SieveResult<Option<u64>> {
        self.seq += 1;
        let seq = self.seq;

        match &self.link {
            Link::Root { downlinks, .. } => {
                let msg = Message::Broadcast(BroadcastMessage { seq, value });
                for (i, tx) in downlinks.iter().enumerate() {
                    tx.send(msg.clone()).map_err(|_| SieveError::Disconnected {
                        rank: self.rank,
                        peer: format!("rank {}", i + 1),
                    })?;
                }
                Ok(value)
            }
            Link::Peer { downlink, .. } => {
                let msg = self.recv(downlink, "broadcast", "rank 0")?;
                expect_broadcast(msg, seq)
            }
        }
    }

    fn gather(&mut self, value: Option<u64>) -> SieveResult<Option<Vec<Option<u64>>>> {
        self.seq += 1;
        let seq = self.seq;

        match &self.link {
            Link::Root { uplink, .. } => {
                let mut slots = GatherSlots::new(seq, self.size, value);
                for _ in 1..self.size {
                    let msg = self.recv(uplink, "gather", "a worker")?;
                    slots.accept(msg)?;
                }
                Ok(Some(slots.finish()))
            }
            Link::Peer { uplink, .. } => {
                let msg = Message::Contribute(ContributeMessage {
                    seq,
                    rank: self.rank,
                    value,
                });
                uplink.send(msg).map_err(|_| SieveError::Disconnected {
                    rank: self.rank,
                    peer: "rank 0".to_string(),
                })?;
                Ok(None)
            }
        }
    }
}
