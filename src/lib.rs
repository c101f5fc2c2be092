//! primesieve - hybrid parallel Sieve of Eratosthenes
//!
//! Counts the primes in `[0, N)` with two levels of parallelism: the range
//! is split across P workers that share nothing and coordinate only by
//! message passing, and each worker clears multiples inside its own range
//! with a pool of threads.
//!
//! # Architecture
//!
//! - **Sieve core**: range partitioning, mutex-guarded local bitmaps, the
//!   thread-parallel marker and a sequential reference
//! - **Message passing**: broadcast and gather collectives over in-process
//!   channels or TCP
//! - **Round coordinator**: per-worker state machine electing and
//!   distributing each sieving prime
//! - **Driver**: in-process runs plus cluster, coordinator and worker
//!   process modes
//!
//! # Example
//!
//! ```
//! let outcome = primesieve::distributed::run(100, 4)?;
//! assert_eq!(outcome.prime_count, 25);
//! # Ok::<(), primesieve::SieveError>(())
//! ```

pub mod comm;
pub mod config;
pub mod coordinator;
pub mod distributed;
pub mod error;
pub mod output;
pub mod sieve;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use distributed::SieveOutcome;
pub use error::{SieveError, SieveResult};

/// Result type used by the binary and the configuration layer
pub type Result<T> = anyhow::Result<T>;
