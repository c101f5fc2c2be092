//! Human-readable text output

use super::RunReport;
use crate::util::time::{format_rate, sieve_rate};
use std::fmt::Write;
use std::time::Duration;

const RULE: &str = "═══════════════════════════════════════════════════════════";

/// Print run results to stdout
pub fn print_results(report: &RunReport) {
    print!("{}", render_results(report));
}

/// Render the text report
///
/// Shows the prime count, timing, group shape, the sieving primes that were
/// applied, each rank's share and, when requested, the verification result.
pub fn render_results(report: &RunReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_results(&mut out, report);
    out
}

fn write_results(out: &mut String, report: &RunReport) -> std::fmt::Result {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "                    SIEVE RESULTS")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;

    writeln!(
        out,
        "Primes below {}: {}",
        format_number(report.limit as u64),
        format_number(report.prime_count)
    )?;
    let elapsed = Duration::from_micros(report.elapsed.micros);
    writeln!(
        out,
        "Elapsed Time: {} ({} candidates/s)",
        report.elapsed.human,
        format_rate(sieve_rate(report.limit, elapsed))
    )?;
    writeln!(out)?;

    writeln!(out, "Configuration:")?;
    writeln!(out, "  Mode:     {}", report.mode)?;
    writeln!(out, "  Workers:  {}", report.workers)?;
    writeln!(out, "  Threads:  {} per worker", report.threads_per_worker)?;
    writeln!(out, "  Election: {}", report.election)?;
    writeln!(out)?;

    writeln!(out, "Rounds: {}", report.rounds)?;
    if !report.sieving_primes.is_empty() {
        writeln!(out, "  Sieving primes: {}", format_list(&report.sieving_primes))?;
    }
    match report.final_candidate {
        Some(k) => writeln!(out, "  Stopped at k = {} (k² > {})", k, report.limit)?,
        None if report.rounds > 0 => writeln!(out, "  Stopped: no candidate left")?,
        None => {}
    }
    writeln!(out)?;

    if report.per_rank.len() > 1 {
        writeln!(out, "Per Worker:")?;
        for rank in &report.per_rank {
            writeln!(
                out,
                "  Rank {:>3}: [{}, {})  {} primes",
                rank.rank,
                rank.start,
                rank.stop,
                format_number(rank.prime_count)
            )?;
        }
        writeln!(out)?;
    }

    if let Some(v) = &report.verification {
        writeln!(out, "Verification:")?;
        writeln!(out, "  Expected: {}", format_number(v.expected_count))?;
        writeln!(out, "  Actual:   {}", format_number(v.actual_count))?;
        if !v.mismatches.is_empty() {
            writeln!(out, "  Mismatched indices: {}", format_list(&v.mismatches))?;
        }
        writeln!(out, "  Result:   {}", if v.passed() { "PASS" } else { "FAIL" })?;
        writeln!(out)?;
    }

    writeln!(out, "{}", RULE)
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

/// Comma-separated list, shortened in the middle when long
fn format_list(values: &[usize]) -> String {
    const EDGE: usize = 8;

    let join = |vs: &[usize]| vs.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
    if values.len() <= 2 * EDGE {
        join(values)
    } else {
        format!(
            "{}, ... ({} more), {}",
            join(&values[..EDGE]),
            values.len() - 2 * EDGE,
            join(&values[values.len() - EDGE..])
        )
    }
}
