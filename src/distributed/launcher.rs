//! Multi-process launcher
//!
//! Entry points for the modes where every worker is its own process and the
//! TCP transport connects them:
//!
//! - `run_cluster`: rank 0 spawns the other workers as copies of the
//!   current executable on this host
//! - `run_coordinator`: rank 0 waits for externally started workers
//! - `run_worker`: one non-root rank joining a coordinator

use super::driver::SieveOutcome;
use crate::comm::{Communicator, TcpCommunicator};
use crate::config::Config;
use crate::worker::{SieveWorker, WorkerOutcome};
use anyhow::{Context, Result};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause between polls while waiting for a child to exit
const CHILD_POLL: Duration = Duration::from_millis(20);

/// Run rank 0 here and ranks 1.. as child processes on this host
pub fn run_cluster(config: &Config) -> Result<SieveOutcome> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Failed to bind loopback listener")?;
    let addr = listener.local_addr().context("Failed to read listener address")?;
    info!(%addr, workers = config.workers.count, "Launching local cluster");

    let mut children = Vec::with_capacity(config.workers.count.saturating_sub(1));
    for rank in 1..config.workers.count {
        match launch_worker(&addr.to_string(), rank, config) {
            Ok(child) => children.push(child),
            Err(e) => {
                kill_children(children);
                return Err(e);
            }
        }
    }

    let result = run_root(listener, config);
    match &result {
        Ok(_) => wait_children(children, config.runtime.timeout()),
        Err(_) => kill_children(children),
    }
    result
}

/// Run rank 0 and wait on `listen` for the other workers
pub fn run_coordinator(config: &Config, listen: &str) -> Result<SieveOutcome> {
    let listener = TcpListener::bind(listen).with_context(|| format!("Failed to bind {}", listen))?;
    info!(
        addr = %listener.local_addr().context("Failed to read listener address")?,
        expected = config.workers.count.saturating_sub(1),
        "Waiting for workers"
    );
    run_root(listener, config)
}

/// Join the coordinator at `connect` as a non-root worker
///
/// The run configuration arrives from the coordinator; only the connection
/// timeout is local.
pub fn run_worker(connect: &str, rank: Option<usize>, timeout: Duration) -> Result<WorkerOutcome> {
    let (mut comm, config) = TcpCommunicator::connect(connect, rank, timeout)
        .with_context(|| format!("Failed to join coordinator at {}", connect))?;
    let rank = comm.rank();
    info!(rank, size = comm.size(), limit = config.sieve.limit, "Joined coordinator");

    let worker = SieveWorker::new(&config, rank).context("Failed to prepare worker")?;
    let outcome = worker
        .run(&mut comm)
        .with_context(|| format!("Worker {} failed", rank))?;
    Ok(outcome)
}

fn run_root(listener: TcpListener, config: &Config) -> Result<SieveOutcome> {
    let worker = SieveWorker::new(config, 0).context("Failed to prepare rank 0")?;
    let mut comm = TcpCommunicator::accept(listener, config).context("Failed to assemble workers")?;
    info!(workers = comm.size(), "All workers connected");

    let started = Instant::now();
    let root = worker.run(&mut comm).context("Rank 0 failed")?;
    let outcome = SieveOutcome::assemble(config.sieve.limit, vec![root], started.elapsed())?;
    info!(
        prime_count = outcome.prime_count,
        rounds = outcome.summary.rounds,
        "Sieve converged"
    );
    Ok(outcome)
}

/// Spawn a copy of this executable as worker `rank`
fn launch_worker(addr: &str, rank: usize, config: &Config) -> Result<Child> {
    let exe_path = std::env::current_exe().context("Failed to get current executable path")?;

    let mut cmd = Command::new(&exe_path);
    cmd.arg("--mode")
        .arg("worker")
        .arg("--connect")
        .arg(addr)
        .arg("--rank")
        .arg(rank.to_string())
        .arg("--timeout")
        .arg(format!("{}ms", config.runtime.timeout_ms));

    // Reports come from rank 0 only; logs still reach stderr
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::inherit());

    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn worker {}", rank))?;
    debug!(rank, pid = child.id(), "Worker launched");
    Ok(child)
}

/// Wait for every child to exit, killing any still running after `timeout`
fn wait_children(children: Vec<Child>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    for mut child in children {
        let pid = child.id();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => break,
                Ok(Some(status)) => {
                    warn!(pid, %status, "Worker exited with failure");
                    break;
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(CHILD_POLL),
                Ok(None) => {
                    warn!(pid, "Worker still running, killing");
                    reap(child);
                    break;
                }
                Err(e) => {
                    warn!(pid, error = %e, "Failed to poll worker");
                    reap(child);
                    break;
                }
            }
        }
    }
}

fn kill_children(children: Vec<Child>) {
    for child in children {
        reap(child);
    }
}

fn reap(mut child: Child) {
    let pid = child.id();
    if let Err(e) = child.kill() {
        debug!(pid, error = %e, "Kill failed, worker probably exited");
    }
    if let Err(e) = child.wait() {
        warn!(pid, error = %e, "Failed to reap worker");
    }
}
