//! Sequential reference sieve
//!
//! Single-array Sieve of Eratosthenes over `[0, limit)` with the same loop
//! shape as the parallel rounds: sieve while `k² ≤ limit`, then move to the
//! next flag still set strictly after `k`. The parallel driver must agree
//! with this bit for bit.

/// Primality flags for every index in `[0, limit)`
pub fn sieve(limit: usize) -> Vec<bool> {
    let mut flags = vec![true; limit];
    for flag in flags.iter_mut().take(2) {
        *flag = false;
    }

    let mut candidate = 2usize;
    while continues(candidate, limit) {
        for multiple in (candidate * candidate..limit).step_by(candidate) {
            flags[multiple] = false;
        }

        match flags.iter().skip(candidate + 1).position(|&flag| flag) {
            Some(pos) => candidate += pos + 1,
            None => break,
        }
    }

    flags
}

/// Number of primes below `limit`
pub fn count_primes(limit: usize) -> u64 {
    sieve(limit).iter().filter(|&&flag| flag).count() as u64
}

/// Primes below `limit`, ascending
pub fn primes(limit: usize) -> Vec<usize> {
    sieve(limit)
        .iter()
        .enumerate()
        .filter(|(_, flag)| **flag)
        .map(|(index, _)| index)
        .collect()
}

/// Round continuation test, `k² ≤ limit`; overflow counts as past the limit
#[inline]
pub fn continues(candidate: usize, limit: usize) -> bool {
    candidate
        .checked_mul(candidate)
        .is_some_and(|square| square <= limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_limits() {
        assert_eq!(count_primes(0), 0);
        assert_eq!(count_primes(1), 0);
        assert_eq!(count_primes(2), 0);
        assert_eq!(count_primes(3), 1);
        assert_eq!(primes(3), vec![2]);
    }

    #[test]
    fn test_thirty() {
        assert_eq!(primes(30), vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn test_known_counts() {
        assert_eq!(count_primes(100), 25);
        assert_eq!(count_primes(1000), 168);
        assert_eq!(count_primes(10_000), 1229);
    }

    #[test]
    fn test_perfect_square_limit() {
        // k = 7 still runs a round at limit 49 although 49 itself lies outside [0, 49)
        assert_eq!(count_primes(49), 15);
        assert_eq!(count_primes(50), 15);
    }

    #[test]
    fn test_continues() {
        assert!(continues(2, 4));
        assert!(!continues(2, 3));
        assert!(continues(10, 100));
        assert!(!continues(11, 100));
        assert!(!continues(usize::MAX, usize::MAX));
    }
}
