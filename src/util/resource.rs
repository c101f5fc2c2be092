//! CPU discovery
//!
//! Sizes the per-worker marking pools so that all workers of one process
//! together use about one thread per logical CPU.

/// Logical CPUs visible to this process
pub fn available_cpus() -> usize {
    num_cpus::get().max(1)
}

/// Default marking threads for each of `workers` workers on this machine
pub fn default_threads_per_worker(workers: usize) -> usize {
    threads_for(available_cpus(), workers)
}

fn threads_for(cpus: usize, workers: usize) -> usize {
    (cpus / workers.max(1)).max(1)
}
