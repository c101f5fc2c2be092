//! Sieve building blocks
//!
//! - `partition`: splits `[0, limit)` into one contiguous range per worker
//! - `bitmap`: a worker's primality flags over its own range
//! - `marker`: thread-parallel clearing of a candidate's multiples
//! - `sequential`: the single-array reference sieve

pub mod bitmap;
pub mod marker;
pub mod partition;
pub mod sequential;

pub use bitmap::LocalBitmap;
pub use marker::{first_multiple, LocalMarker};
pub use partition::{partition, partition_all, Partition};
