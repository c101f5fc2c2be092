//! TCP transport
//!
//! Star topology over TCP for workers running as separate processes. Rank 0
//! accepts one connection per worker, answers each `HELLO` with a `WELCOME`
//! carrying the assigned rank and the run configuration, then keeps the
//! stream for broadcasts and gathers. All calls block the caller; async IO
//! runs on a private current-thread tokio runtime.

use super::protocol::*;
use super::{expect_broadcast, Communicator, GatherSlots, ROOT_RANK};
use crate::config::Config;
use crate::error::{SieveError, SieveResult};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;

/// Delay between connection attempts while the coordinator is not up yet
const CONNECT_RETRY: Duration = Duration::from_millis(50);

/// Longest wait for the HELLO of a fresh connection
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

enum TcpLink {
    /// Streams to ranks 1..size, indexed by `rank - 1`
    Root { peers: Vec<TcpStream> },
    Peer { root: TcpStream },
}

/// Communicator for one worker process
pub struct TcpCommunicator {
    rank: usize,
    size: usize,
    seq: u64,
    timeout: Duration,
    runtime: Runtime,
    link: TcpLink,
}

fn build_runtime() -> SieveResult<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SieveError::transport("Failed to create tokio runtime", e))
}

/// Bound a receive by `timeout`, mapping a closed stream to `Disconnected`
async fn bounded<T>(
    fut: impl Future<Output = SieveResult<T>>,
    timeout: Duration,
    rank: usize,
    operation: &'static str,
    peer: String,
) -> SieveResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|e| peer_loss(e, rank, peer)),
        Err(_) => Err(SieveError::Timeout {
            rank: Some(rank),
            operation,
            after_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Write to a peer, mapping a closed stream to `Disconnected`
async fn send(
    stream: &mut TcpStream,
    msg: &Message,
    rank: usize,
    peer: String,
) -> SieveResult<()> {
    write_message(stream, msg).await.map_err(|e| peer_loss(e, rank, peer))
}

fn peer_loss(err: SieveError, rank: usize, peer: String) -> SieveError {
    match err {
        SieveError::Transport { ref source, .. } if is_disconnect(source) => {
            SieveError::Disconnected { rank, peer }
        }
        other => other,
    }
}

fn is_disconnect(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    matches!(
        err.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

impl TcpCommunicator {
    /// Accept every other worker on `listener` and hand out ranks
    ///
    /// The group size is `config.workers.count`. Connections with a
    /// mismatched protocol version or an unavailable rank are rejected, and
    /// connections that fail or stall before completing the handshake are
    /// dropped; either way the coordinator keeps waiting. Only a wait for a
    /// new connection longer than the timeout fails the call.
    pub fn accept(listener: std::net::TcpListener, config: &Config) -> SieveResult<Self> {
        let size = config.workers.count;
        let timeout = config.runtime.timeout();
        let hello_timeout = timeout.min(HELLO_TIMEOUT);
        let runtime = build_runtime()?;

        listener
            .set_nonblocking(true)
            .map_err(|e| SieveError::transport("Failed to configure listener", e))?;

        let peers = runtime.block_on(async {
            let listener = tokio::net::TcpListener::from_std(listener)
                .map_err(|e| SieveError::transport("Failed to register listener", e))?;
            let mut slots: Vec<Option<TcpStream>> = (1..size).map(|_| None).collect();

            while slots.iter().any(Option::is_none) {
                let accepted = tokio::time::timeout(timeout, listener.accept()).await;
                let (mut stream, addr) = match accepted {
                    Ok(accepted) => accepted
                        .map_err(|e| SieveError::transport("Failed to accept worker", e))?,
                    Err(_) => {
                        return Err(SieveError::Timeout {
                            rank: Some(ROOT_RANK),
                            operation: "worker connections",
                            after_ms: timeout.as_millis() as u64,
                        })
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::warn!(%addr, error = %e, "Dropping connection without TCP_NODELAY");
                    continue;
                }

                let peer = addr.to_string();
                let hello = read_message(&mut stream);
                let hello = match bounded(hello, hello_timeout, ROOT_RANK, "hello", peer).await {
                    Ok(Message::Hello(hello)) => hello,
                    Ok(other) => {
                        tracing::warn!(
                            %addr,
                            kind = other.kind(),
                            "Dropping connection that did not start with HELLO"
                        );
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(%addr, error = %e, "Dropping connection without HELLO");
                        continue;
                    }
                };

                match assign_rank(&hello, &slots) {
                    Ok(rank) => {
                        let welcome = Message::Welcome(WelcomeMessage {
                            protocol_version: PROTOCOL_VERSION,
                            rank,
                            world_size: size,
                            config: config.clone(),
                        });
                        if let Err(e) = write_message(&mut stream, &welcome).await {
                            tracing::warn!(%addr, rank, error = %e, "WELCOME not delivered");
                            continue;
                        }
                        tracing::info!(%addr, host = %hello.host, rank, "Worker joined");
                        slots[rank - 1] = Some(stream);
                    }
                    Err(reason) => {
                        tracing::warn!(%addr, host = %hello.host, %reason, "Rejecting worker");
                        let reject = Message::Reject(RejectMessage { reason });
                        if let Err(e) = write_message(&mut stream, &reject).await {
                            tracing::debug!(%addr, error = %e, "REJECT not delivered");
                        }
                    }
                }
            }

            Ok(slots.into_iter().flatten().collect::<Vec<_>>())
        })?;

        Ok(Self {
            rank: ROOT_RANK,
            size,
            seq: 0,
            timeout,
            runtime,
            link: TcpLink::Root { peers },
        })
    }

    /// Join the coordinator at `addr`
    ///
    /// Retries the connection until `timeout` elapses, then performs the
    /// handshake. Returns the communicator and the configuration the
    /// coordinator sent.
    pub fn connect(
        addr: &str,
        requested_rank: Option<usize>,
        timeout: Duration,
    ) -> SieveResult<(Self, Config)> {
        let runtime = build_runtime()?;
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        let (stream, welcome) = runtime.block_on(async {
            let deadline = Instant::now() + timeout;
            let mut stream = loop {
                match TcpStream::connect(addr).await {
                    Ok(stream) => break stream,
                    Err(e) if Instant::now() >= deadline => {
                        let context = format!("Failed to connect to {}", addr);
                        return Err(SieveError::transport(context, e));
                    }
                    Err(_) => tokio::time::sleep(CONNECT_RETRY).await,
                }
            };
            stream
                .set_nodelay(true)
                .map_err(|e| SieveError::transport("Failed to set TCP_NODELAY", e))?;

            let hello = Message::Hello(HelloMessage {
                protocol_version: PROTOCOL_VERSION,
                requested_rank,
                host,
            });
            write_message(&mut stream, &hello).await?;

            let reply = match tokio::time::timeout(timeout, read_message(&mut stream)).await {
                Ok(reply) => reply?,
                Err(_) => {
                    return Err(SieveError::Timeout {
                        rank: requested_rank,
                        operation: "handshake",
                        after_ms: timeout.as_millis() as u64,
                    })
                }
            };
            match reply {
                Message::Welcome(welcome) if welcome.protocol_version == PROTOCOL_VERSION => {
                    Ok((stream, welcome))
                }
                Message::Welcome(welcome) => Err(SieveError::protocol(format!(
                    "protocol version mismatch: coordinator={}, worker={}",
                    welcome.protocol_version, PROTOCOL_VERSION
                ))),
                Message::Reject(reject) => Err(SieveError::protocol(format!(
                    "coordinator rejected worker: {}",
                    reject.reason
                ))),
                other => Err(SieveError::protocol(format!(
                    "expected WELCOME, got {}",
                    other.kind()
                ))),
            }
        })?;

        let comm = Self {
            rank: welcome.rank,
            size: welcome.world_size,
            seq: 0,
            timeout,
            runtime,
            link: TcpLink::Peer { root: stream },
        };

        Ok((comm, welcome.config))
    }
}

/// Pick a rank for a joining worker, or the reason it cannot join
fn assign_rank(hello: &HelloMessage, slots: &[Option<TcpStream>]) -> Result<usize, String> {
    if hello.protocol_version != PROTOCOL_VERSION {
        return Err(format!(
            "protocol version mismatch: coordinator={}, worker={}",
            PROTOCOL_VERSION, hello.protocol_version
        ));
    }

    match hello.requested_rank {
        Some(rank) if rank == ROOT_RANK || rank > slots.len() => Err(format!(
            "rank {} is not available to workers (group size {})",
            rank,
            slots.len() + 1
        )),
        Some(rank) if slots[rank - 1].is_some() => Err(format!("rank {} is already taken", rank)),
        Some(rank) => Ok(rank),
        None => slots
            .iter()
            .position(Option::is_none)
            .map(|i| i + 1)
            .ok_or_else(|| "group is full".to_string()),
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast(&mut self, value: Option<u64>) -> SieveResult<Option<u64>> {
        self.seq += 1;
        let (seq, rank, timeout) = (self.seq, self.rank, self.timeout);
        let Self { runtime, link, .. } = self;

        runtime.block_on(async move {
            match link {
                TcpLink::Root { peers } => {
                    let msg = Message::Broadcast(BroadcastMessage { seq, value });
                    for (i, stream) in peers.iter_mut().enumerate() {
                        send(stream, &msg, rank, format!("rank {}", i + 1)).await?;
                    }
                    Ok(value)
                }
                TcpLink::Peer { root } => {
                    let msg = read_message(root);
                    let msg = bounded(msg, timeout, rank, "broadcast", "rank 0".to_string()).await?;
                    expect_broadcast(msg, seq)
                }
            }
        })
    }

    fn gather(&mut self, value: Option<u64>) -> SieveResult<Option<Vec<Option<u64>>>> {
        self.seq += 1;
        let (seq, rank, size, timeout) = (self.seq, self.rank, self.size, self.timeout);
        let Self { runtime, link, .. } = self;

        runtime.block_on(async move {
            match link {
                TcpLink::Root { peers } => {
                    let mut slots = GatherSlots::new(seq, size, value);
                    for (i, stream) in peers.iter_mut().enumerate() {
                        let peer = format!("rank {}", i + 1);
                        let msg = bounded(read_message(stream), timeout, rank, "gather", peer);
                        slots.accept(msg.await?)?;
                    }
                    Ok(Some(slots.finish()))
                }
                TcpLink::Peer { root } => {
                    let msg = Message::Contribute(ContributeMessage { seq, rank, value });
                    send(root, &msg, rank, "rank 0".to_string()).await?;
                    Ok(None)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn listener() -> (std::net::TcpListener, String) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[test]
    fn test_assign_rank() {
        let hello = |requested_rank| HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            requested_rank,
            host: "test".to_string(),
        };
        let slots: Vec<Option<TcpStream>> = vec![None, None, None];

        assert_eq!(assign_rank(&hello(None), &slots), Ok(1));
        assert_eq!(assign_rank(&hello(Some(3)), &slots), Ok(3));
        assert!(assign_rank(&hello(Some(0)), &slots).is_err());
        assert!(assign_rank(&hello(Some(4)), &slots).is_err());

        let mut old = hello(Some(1));
        old.protocol_version = PROTOCOL_VERSION + 1;
        assert!(assign_rank(&old, &slots).is_err());
    }

    #[test]
    fn test_handshake_and_collectives() {
        let (listener, addr) = listener();
        let config = Config::for_run(100, 3);
        let timeout = Duration::from_secs(5);

        let workers: Vec<_> = [Some(2), None]
            .into_iter()
            .map(|requested| {
                let addr = addr.clone();
                thread::spawn(move || {
                    let (mut comm, config) =
                        TcpCommunicator::connect(&addr, requested, timeout).unwrap();
                    assert_eq!(config.sieve.limit, 100);
                    assert_eq!(comm.size(), 3);
                    let k = comm.broadcast(None).unwrap();
                    assert!(comm.gather(Some(comm.rank() as u64)).unwrap().is_none());
                    (comm.rank(), k)
                })
            })
            .collect();

        let mut root = TcpCommunicator::accept(listener, &config).unwrap();
        assert_eq!(root.broadcast(Some(5)).unwrap(), Some(5));
        assert_eq!(root.gather(Some(0)).unwrap(), Some(vec![Some(0), Some(1), Some(2)]));

        let mut joined: Vec<_> = workers.into_iter().map(|h| h.join().unwrap()).collect();
        joined.sort();
        assert_eq!(joined, vec![(1, Some(5)), (2, Some(5))]);
    }

    #[test]
    fn test_worker_sees_coordinator_disconnect() {
        let (listener, addr) = listener();
        let config = Config::for_run(100, 2);

        let worker = thread::spawn(move || {
            let (mut comm, _) =
                TcpCommunicator::connect(&addr, None, Duration::from_secs(5)).unwrap();
            comm.broadcast(None)
        });

        let root = TcpCommunicator::accept(listener, &config).unwrap();
        drop(root);

        assert!(matches!(worker.join().unwrap(), Err(SieveError::Disconnected { .. })));
    }

    #[test]
    fn test_accept_skips_connection_closed_before_hello() {
        let (listener, addr) = listener();
        let config = Config::for_run(100, 2);

        // Connects and hangs up without saying HELLO
        drop(std::net::TcpStream::connect(&addr).unwrap());
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            let (comm, _) = TcpCommunicator::connect(&addr, None, Duration::from_secs(5))?;
            Ok::<_, SieveError>(comm.rank())
        });

        let root = TcpCommunicator::accept(listener, &config).unwrap();
        assert_eq!(root.size(), 2);
        assert_eq!(worker.join().unwrap().unwrap(), 1);
    }

    #[test]
    fn test_accept_skips_silent_connection() {
        let (listener, addr) = listener();
        let mut config = Config::for_run(100, 2);
        config.runtime.timeout_ms = 300;

        // Stays open but never sends HELLO
        let silent = std::net::TcpStream::connect(&addr).unwrap();
        let worker = thread::spawn(move || {
            let (comm, _) = TcpCommunicator::connect(&addr, Some(1), Duration::from_secs(5))?;
            Ok::<_, SieveError>(comm.rank())
        });

        let root = TcpCommunicator::accept(listener, &config).unwrap();
        assert_eq!(root.size(), 2);
        assert_eq!(worker.join().unwrap().unwrap(), 1);
        drop(silent);
    }

    #[test]
    fn test_worker_times_out_without_welcome() {
        let (listener, addr) = listener();

        // Connections complete in the backlog but nobody answers
        match TcpCommunicator::connect(&addr, Some(1), Duration::from_millis(100)) {
            Err(SieveError::Timeout { rank, operation, after_ms }) => {
                assert_eq!(rank, Some(1));
                assert_eq!(operation, "handshake");
                assert_eq!(after_ms, 100);
            }
            Err(other) => panic!("expected handshake timeout, got {:?}", other),
            Ok(_) => panic!("expected handshake timeout, got a communicator"),
        }
        drop(listener);
    }

    #[test]
    fn test_root_gather_times_out_on_silent_worker() {
        let (listener, addr) = listener();
        let mut config = Config::for_run(100, 2);
        config.runtime.timeout_ms = 200;
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        // Joins, then stays connected without contributing
        let worker = thread::spawn(move || {
            let (comm, _) = TcpCommunicator::connect(&addr, None, Duration::from_secs(5)).unwrap();
            let _ = done_rx.recv();
            drop(comm);
        });

        let mut root = TcpCommunicator::accept(listener, &config).unwrap();
        match root.gather(Some(7)) {
            Err(SieveError::Timeout { rank, operation, after_ms }) => {
                assert_eq!(rank, Some(ROOT_RANK));
                assert_eq!(operation, "gather");
                assert_eq!(after_ms, 200);
            }
            other => panic!("expected gather timeout, got {:?}", other),
        }

        done_tx.send(()).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_root_broadcast_sees_worker_disconnect() {
        let (listener, addr) = listener();
        let config = Config::for_run(100, 2);

        let worker = thread::spawn(move || {
            TcpCommunicator::connect(&addr, None, Duration::from_secs(5)).map(|_| ())
        });
        let mut root = TcpCommunicator::accept(listener, &config).unwrap();
        worker.join().unwrap().unwrap();

        // The first writes may still land in the socket buffer before the reset arrives
        let mut result = Ok(None);
        for candidate in 2..200 {
            result = root.broadcast(Some(candidate));
            if result.is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        match result {
            Err(SieveError::Disconnected { rank, peer }) => {
                assert_eq!(rank, ROOT_RANK);
                assert_eq!(peer, "rank 1");
            }
            other => panic!("expected disconnect, got {:?}", other),
        }
    }

    #[test]
    fn test_accept_times_out_without_workers() {
        let (listener, _) = listener();
        let mut config = Config::for_run(100, 2);
        config.runtime.timeout_ms = 50;

        match TcpCommunicator::accept(listener, &config) {
            Err(SieveError::Timeout { rank, .. }) => assert_eq!(rank, Some(ROOT_RANK)),
            Err(other) => panic!("expected timeout, got {:?}", other),
            Ok(_) => panic!("expected timeout, got a communicator"),
        }
    }
}
