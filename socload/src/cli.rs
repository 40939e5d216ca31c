use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 30s, 500ms, 5m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 30s, 500ms, 5m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 30s, 500ms, 5m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" | "min" | "mins" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large")),
        "h" | "hr" | "hrs" => value
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large")),
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 30s, 500ms, 5m)"
        )),
    }
}

fn parse_spawn_rate(input: &str) -> Result<f64, String> {
    let rate: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("invalid spawn rate '{input}' (expected e.g. 2 or 0.5)"))?;
    if !(rate.is_finite() && rate > 0.0) {
        return Err(format!(
            "invalid spawn rate '{input}' (must be a positive number)"
        ));
    }
    Ok(rate)
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "socload",
    author,
    version,
    about = "Synthetic traffic generator for threat-analysis backends",
    long_about = "socload drives a threat-analysis backend with a population of simulated users.\n\nEach user belongs to a weighted traffic class that fixes its pacing and its mix of threat types; every request is a POST to /api/threats/trigger on the target host.\n\nThe built-in profile mixes steady, bursty and realistic clients; use --scenario to load a custom class mix from a YAML file.",
    after_help = "Examples:\n  socload run http://localhost:8000\n  socload run http://localhost:8000 --users 50 --spawn-rate 5 --duration 5m\n  socload run http://localhost:8000 --workers 4 --output json\n  socload run http://localhost:8000 --scenario mix.yaml --headless"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load generation session against a backend
    #[command(
        long_about = "Ramp a population of simulated users against the target host and print a summary when the duration elapses or on Ctrl-C.\n\nCLI flags override values from the --scenario file."
    )]
    Run(RunArgs),

    /// Internal: run as a coordinator-driven worker process
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Base URL of the backend under test (e.g. http://localhost:8000)
    pub host: Option<String>,

    /// Target number of concurrent simulated users
    #[arg(long)]
    pub users: Option<u64>,

    /// Users spawned per second while ramping (fractional rates allowed)
    #[arg(long, value_parser = parse_spawn_rate)]
    pub spawn_rate: Option<f64>,

    /// Run length (e.g. 30s, 5m); omit to run until Ctrl-C
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Number of worker processes to split the population across
    #[arg(long, default_value_t = 1)]
    pub workers: u32,

    /// YAML scenario file describing the traffic class mix
    #[arg(long, value_name = "FILE")]
    pub scenario: Option<PathBuf>,

    /// Per-request timeout (e.g. 30s)
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Suppress live progress output (summary is still printed)
    #[arg(long)]
    pub headless: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct WorkerArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10"), Ok(Duration::from_secs(10)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("5x").is_err());
    }

    #[test]
    fn parse_spawn_rate_accepts_fractions() {
        assert_eq!(parse_spawn_rate("2"), Ok(2.0));
        assert_eq!(parse_spawn_rate("0.5"), Ok(0.5));
        assert!(parse_spawn_rate("0").is_err());
        assert!(parse_spawn_rate("-1").is_err());
        assert!(parse_spawn_rate("fast").is_err());
    }

    #[test]
    fn cli_parses_run_flags() {
        let parsed = Cli::try_parse_from([
            "socload",
            "run",
            "http://localhost:8000",
            "--users",
            "10",
            "--spawn-rate",
            "2",
            "--duration",
            "5m",
            "--workers",
            "3",
            "--headless",
            "--output",
            "json",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.host.as_deref(), Some("http://localhost:8000"));
                assert_eq!(args.users, Some(10));
                assert_eq!(args.spawn_rate, Some(2.0));
                assert_eq!(args.duration, Some(Duration::from_secs(300)));
                assert_eq!(args.workers, 3);
                assert!(args.headless);
                assert!(matches!(args.output, OutputFormat::Json));
            }
            Command::Worker(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_run_defaults() {
        let parsed = Cli::try_parse_from(["socload", "run", "http://localhost:8000"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.users, None);
                assert_eq!(args.workers, 1);
                assert!(!args.headless);
                assert!(matches!(args.output, OutputFormat::HumanReadable));
            }
            Command::Worker(_) => panic!("expected run command"),
        }
    }
}
