use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_interval(input: &str) -> Result<Duration, String> {
    let d = humantime::parse_duration(input.trim())
        .map_err(|e| format!("invalid duration '{input}' (expected e.g. 15s, 500ms, 1m): {e}"))?;
    if d.is_zero() {
        return Err(format!("duration '{input}' must be greater than zero"));
    }
    Ok(d)
}

fn parse_header(input: &str) -> Result<(String, String), String> {
    let (k, v) = input
        .split_once(':')
        .ok_or_else(|| format!("invalid header '{input}' (expected NAME: VALUE)"))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(format!("invalid header '{input}' (empty NAME)"));
    }
    Ok((k.to_string(), v.trim().to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit the final summary as one JSON line on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "cyklop",
    author,
    version,
    about = "Rate-profile driven HTTP load generator",
    long_about = "cyklop launches virtual users against an HTTP service following a piecewise-linear arrival-rate profile.\n\nA scenario file (YAML) names the user behaviors (request scripts) and the load steps (rampUp, jumpTo, holdFor). Every request outcome is appended to a per-run results file; progress is logged periodically.",
    after_help = "Examples:\n  cyklop run scenarios/smoke.yaml\n  cyklop run scenarios/smoke.yaml --base-url http://127.0.0.1:8080 --log-interval 5s\n  cyklop run scenarios/smoke.yaml --output json -q\n  cyklop check scenarios/smoke.yaml"
)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, Default, Args)]
pub struct Verbosity {
    /// Log debug details (step changes, rate ticks, transport errors)
    #[arg(short = 'd', long, global = true, conflicts_with = "quiet")]
    pub debug: bool,

    /// Only log warnings and errors
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario file
    Run(RunArgs),

    /// Validate a scenario file and print its load profile without running it
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario (.yaml)
    pub scenario: PathBuf,

    /// Directory receiving one sub-directory per run
    #[arg(long, value_name = "DIR", default_value = "results", env = "CYKLOP_RESULTS_DIR")]
    pub results_dir: PathBuf,

    /// Interval between progress reports (e.g. 15s, 1m)
    #[arg(long, value_name = "DURATION", default_value = "15s", value_parser = parse_interval)]
    pub log_interval: Duration,

    /// Base URL for relative request paths (overrides the scenario's `baseUrl`)
    #[arg(long, value_name = "URL", env = "CYKLOP_BASE_URL")]
    pub base_url: Option<String>,

    /// Extra header sent with every request (repeatable, NAME: VALUE)
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Path to the scenario (.yaml)
    pub scenario: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        match Cli::try_parse_from(args) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn parse_interval_accepts_humantime_values() {
        assert_eq!(parse_interval("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_interval("15s"), Ok(Duration::from_secs(15)));
        assert_eq!(parse_interval("1m"), Ok(Duration::from_secs(60)));
    }

    #[test]
    fn parse_interval_rejects_invalid_values() {
        assert!(parse_interval("").is_err());
        assert!(parse_interval("abc").is_err());
        assert!(parse_interval("10x").is_err());
        assert!(parse_interval("0s").is_err());
    }

    #[test]
    fn parse_header_splits_on_first_colon() {
        assert_eq!(
            parse_header("x-trace: a:b"),
            Ok(("x-trace".to_string(), "a:b".to_string()))
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn cli_parses_run_with_all_flags() {
        let cli = parse(&[
            "cyklop",
            "run",
            "smoke.yaml",
            "--results-dir",
            "out",
            "--log-interval",
            "5s",
            "--base-url",
            "http://127.0.0.1:8080",
            "-H",
            "user-agent: cyklop",
            "--output",
            "json",
            "-q",
        ]);

        assert!(cli.verbosity.quiet);
        assert!(!cli.verbosity.debug);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.scenario, PathBuf::from("smoke.yaml"));
                assert_eq!(args.results_dir, PathBuf::from("out"));
                assert_eq!(args.log_interval, Duration::from_secs(5));
                assert_eq!(args.base_url.as_deref(), Some("http://127.0.0.1:8080"));
                assert_eq!(
                    args.headers,
                    vec![("user-agent".to_string(), "cyklop".to_string())]
                );
                assert_eq!(args.output, OutputFormat::Json);
            }
            Command::Check(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_run_defaults() {
        let cli = parse(&["cyklop", "run", "smoke.yaml"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.log_interval, Duration::from_secs(15));
                assert_eq!(args.output, OutputFormat::HumanReadable);
                assert!(args.headers.is_empty());
            }
            Command::Check(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn debug_and_quiet_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["cyklop", "-d", "-q", "check", "s.yaml"]).is_err());
        let cli = parse(&["cyklop", "check", "s.yaml", "-d"]);
        assert!(cli.verbosity.debug);
    }
}
