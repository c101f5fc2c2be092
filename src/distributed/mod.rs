//! Distributed sieve driver
//!
//! Runs the sieve over a fixed group of workers that share nothing but
//! messages:
//!
//! - **In-process**: `run` / `run_with_config` start one thread per worker
//!   over the channel transport and return every worker's bitmap
//! - **Multi-process**: the launcher connects worker processes over TCP;
//!   bitmaps stay with their workers and rank 0 reports the reduction
//!
//! # Modules
//!
//! - `driver`: in-process driver and `SieveOutcome`
//! - `launcher`: cluster, coordinator and worker process modes

pub mod driver;
pub mod launcher;

pub use driver::{run, run_with_config, SieveOutcome};
pub use launcher::{run_cluster, run_coordinator, run_worker};
