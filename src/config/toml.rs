//! TOML configuration file parsing

use super::*;
use crate::config::cli::{Cli, ElectionArg, ExecutionMode};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Build the run configuration: TOML file if given, then CLI overrides
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    merge_cli_with_config(cli, base)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Sieve settings
    if let Some(ref limit_str) = cli.limit {
        config.sieve.limit = parse_count(limit_str).context("Invalid limit")?;
    }
    if let Some(election) = cli.election {
        config.sieve.election = match election {
            ElectionArg::GlobalMin => ElectionStrategy::GlobalMin,
            ElectionArg::Coordinator => ElectionStrategy::Coordinator,
        };
    }
    if cli.verify {
        config.sieve.verify = true;
    }

    // Worker settings
    if let Some(workers) = cli.workers {
        config.workers.count = workers;
    }
    if cli.mode == ExecutionMode::Sequential {
        config.workers.count = 1;
    }
    if let Some(threads) = cli.threads {
        config.workers.threads_per_worker = Some(threads);
    }

    // Runtime settings
    if let Some(ref timeout_str) = cli.timeout {
        config.runtime.timeout_ms = parse_duration_ms(timeout_str).context("Invalid timeout")?;
    }

    // Output settings
    if cli.json {
        config.output.format = OutputFormat::Json;
    }
    if let Some(ref path) = cli.json_output {
        config.output.json_output = Some(path.clone());
    }

    Ok(config)
}

/// Parse a count with an optional decimal suffix (e.g., "10k", "5M", "1G")
pub fn parse_count(s: &str) -> Result<usize> {
    let s = s.trim().replace('_', "");
    if s.is_empty() {
        anyhow::bail!("Empty count string");
    }

    let (num_str, multiplier) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1_000usize),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1_000_000),
        Some('g') | Some('G') => (&s[..s.len() - 1], 1_000_000_000),
        _ => (s.as_str(), 1),
    };

    let num: usize = num_str.parse()
        .with_context(|| format!("Invalid number in count: {}", num_str))?;

    num.checked_mul(multiplier)
        .with_context(|| format!("Count too large: {}", s))
}

/// Parse duration string to milliseconds (e.g., "500ms", "30s", "2m")
pub fn parse_duration_ms(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = s.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = s.strip_suffix('m') {
        (num, "m")
    } else {
        anyhow::bail!("Duration must end with ms, s, or m");
    };

    let num: u64 = num_str.parse()
        .with_context(|| format!("Invalid number in duration: {}", num_str))?;

    let milliseconds = match unit {
        "ms" => Some(num),
        "s" => num.checked_mul(1000),
        "m" => num.checked_mul(60_000),
        _ => anyhow::bail!("Invalid duration unit: {}", unit),
    };

    milliseconds.with_context(|| format!("Duration too large: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("primesieve").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("100").unwrap(), 100);
        assert_eq!(parse_count("10k").unwrap(), 10_000);
        assert_eq!(parse_count("5M").unwrap(), 5_000_000);
        assert_eq!(parse_count("1G").unwrap(), 1_000_000_000);
        assert_eq!(parse_count("1_000").unwrap(), 1000);
        assert!(parse_count("").is_err());
        assert!(parse_count("ten").is_err());
    }

    #[test]
    fn test_parse_duration_ms() {
        assert_eq!(parse_duration_ms("250ms").unwrap(), 250);
        assert_eq!(parse_duration_ms("30s").unwrap(), 30_000);
        assert_eq!(parse_duration_ms("2m").unwrap(), 120_000);
        assert!(parse_duration_ms("10").is_err());
        assert!(parse_duration_ms("1h").is_err());
    }

    #[test]
    fn test_parse_toml_basic() {
        let toml = r#"
[sieve]
limit = 1000000
election = "coordinator"
verify = true

[workers]
count = 4
threads_per_worker = 2

[runtime]
timeout_ms = 5000
"#;

        let config = parse_toml_string(toml).unwrap();
        assert_eq!(config.sieve.limit, 1_000_000);
        assert_eq!(config.sieve.election, ElectionStrategy::Coordinator);
        assert!(config.sieve.verify);
        assert_eq!(config.workers.count, 4);
        assert_eq!(config.workers.threads_per_worker, Some(2));
        assert_eq!(config.runtime.timeout_ms, 5000);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_parse_toml_empty_uses_defaults() {
        let config = parse_toml_string("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_toml_rejects_unknown_election() {
        assert!(parse_toml_string("[sieve]\nelection = \"random\"\n").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sieve]\nlimit = 500\n\n[workers]\ncount = 2").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = cli(&["--config", &path, "--workers", "5", "--timeout", "2s", "--json"]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.sieve.limit, 500);
        assert_eq!(config.workers.count, 5);
        assert_eq!(config.runtime.timeout_ms, 2000);
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_sequential_mode_forces_single_worker() {
        let mut config = Config::default();
        config.workers.count = 8;
        let merged = merge_cli_with_config(&cli(&["--mode", "sequential"]), config).unwrap();
        assert_eq!(merged.workers.count, 1);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = parse_toml_file(Path::new("/nonexistent/primesieve.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
