//! Configuration validation

use super::*;
use anyhow::Result;

/// Largest limit accepted; a `Vec<bool>` cannot hold more flags
pub const MAX_LIMIT: usize = isize::MAX as usize;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_sieve(&config.sieve)?;
    validate_workers(&config.workers)?;
    validate_runtime(&config.runtime)?;

    Ok(())
}

/// Validate sieve settings
pub fn validate_sieve(sieve: &SieveConfig) -> Result<()> {
    if sieve.limit > MAX_LIMIT {
        anyhow::bail!("limit {} exceeds the maximum of {}", sieve.limit, MAX_LIMIT);
    }

    Ok(())
}

/// Validate worker group settings
pub fn validate_workers(workers: &WorkerConfig) -> Result<()> {
    if workers.count == 0 {
        anyhow::bail!("worker count must be at least 1");
    }

    if let Some(threads) = workers.threads_per_worker {
        if threads == 0 {
            anyhow::bail!("threads_per_worker must be at least 1");
        }
    }

    Ok(())
}

/// Validate runtime settings
pub fn validate_runtime(runtime: &RuntimeConfig) -> Result<()> {
    if runtime.timeout_ms == 0 {
        anyhow::bail!("timeout_ms must be greater than 0");
    }

    Ok(())
}
