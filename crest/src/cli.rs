use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crest_core::StairStep;

pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    let unit = unit_str.trim();
    match unit {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60)
                .and_then(|v| v.checked_mul(60))
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

/// `USERSxDURATION`, e.g. `20x30s`.
fn parse_step(input: &str) -> Result<StairStep, String> {
    let s = input.trim();
    let Some((users, duration)) = s.split_once(['x', 'X']) else {
        return Err(format!("invalid step '{s}' (expected USERSxDURATION, e.g. 20x30s)"));
    };
    let users: u64 = users
        .trim()
        .parse()
        .map_err(|_| format!("invalid user count in step '{s}'"))?;
    let duration = parse_duration(duration)?;
    Ok(StairStep::new(users, duration))
}

fn parse_ratio(input: &str) -> Result<f64, String> {
    let value: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("invalid ratio '{input}' (expected a number in 0..=1)"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("ratio '{input}' must be within 0..=1"));
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "crest",
    author,
    version,
    about = "Load-shape driver with rendezvous barriers",
    long_about = "crest drives a pool of virtual-user tasks through a load shape.\n\nA shape decides, once per tick, how many tasks should be running and how fast to get there. Tasks can meet at a rendezvous barrier so they fire together.\n\nThe built-in runner simulates request latency and errors, which makes it possible to exercise shapes (including the metric-driven adaptive shape) without a target system.",
    after_help = "Examples:\n  crest run --shape wave --min-users 10 --max-users 50 --period 2m --time-limit 10m\n  crest run --shape stairs --steps 10x30s,20x30s,40x1m\n  crest run --config shapes/peak.yaml --rendezvous 20 --rendezvous-timeout 5s\n  crest plan --shape spike --spike-interval 1m --time-limit 5m --every 10s"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a shape against the simulated task runner
    Run(RunArgs),

    /// Print the targets a shape would produce, without running anything
    Plan(PlanArgs),
}

#[derive(Debug, Args)]
pub struct ShapeArgs {
    /// Shape name: wave, spike, stairs, ramp-up-down, adaptive, composite, random
    #[arg(long, value_name = "NAME", required_unless_present = "config")]
    pub shape: Option<String>,

    /// YAML shape file; flags given next to it override its values
    #[arg(long, value_name = "FILE", conflicts_with = "shape")]
    pub config: Option<PathBuf>,

    #[arg(long, help_heading = "Shape parameters")]
    pub min_users: Option<u64>,

    #[arg(long, help_heading = "Shape parameters")]
    pub max_users: Option<u64>,

    /// Wave period
    #[arg(long, value_parser = parse_duration, help_heading = "Shape parameters")]
    pub period: Option<Duration>,

    /// Tasks started/stopped per second while converging to a target
    #[arg(long, help_heading = "Shape parameters")]
    pub spawn_rate: Option<f64>,

    #[arg(long, value_parser = parse_duration, help_heading = "Shape parameters")]
    pub time_limit: Option<Duration>,

    #[arg(long, help_heading = "Shape parameters")]
    pub base_users: Option<u64>,

    #[arg(long, help_heading = "Shape parameters")]
    pub spike_users: Option<u64>,

    #[arg(long, value_parser = parse_duration, help_heading = "Shape parameters")]
    pub spike_duration: Option<Duration>,

    #[arg(long, value_parser = parse_duration, help_heading = "Shape parameters")]
    pub spike_interval: Option<Duration>,

    #[arg(long, help_heading = "Shape parameters")]
    pub target_users: Option<u64>,

    #[arg(long, value_parser = parse_duration, help_heading = "Shape parameters")]
    pub ramp_up: Option<Duration>,

    #[arg(long, value_parser = parse_duration, help_heading = "Shape parameters")]
    pub hold: Option<Duration>,

    #[arg(long, value_parser = parse_duration, help_heading = "Shape parameters")]
    pub ramp_down: Option<Duration>,

    /// Users added per stair (stairs ladder) or per increase (adaptive)
    #[arg(long, help_heading = "Shape parameters")]
    pub step: Option<u64>,

    /// Length of each stair when building a ladder from --min-users/--step/--max-users
    #[arg(long, value_parser = parse_duration, help_heading = "Shape parameters")]
    pub step_duration: Option<Duration>,

    /// Explicit stairs, comma separated (e.g. 10x30s,20x30s)
    #[arg(long, value_parser = parse_step, value_delimiter = ',', help_heading = "Shape parameters")]
    pub steps: Vec<StairStep>,

    /// Adaptive: average latency ceiling in milliseconds
    #[arg(long, value_name = "MS", help_heading = "Shape parameters")]
    pub latency_threshold: Option<f64>,

    /// Adaptive: error-rate ceiling (0..=1)
    #[arg(long, value_parser = parse_ratio, help_heading = "Shape parameters")]
    pub error_threshold: Option<f64>,

    /// Adaptive: consecutive good samples before an increase
    #[arg(long, help_heading = "Shape parameters")]
    pub samples: Option<usize>,

    /// Adaptive: rolling sample window length
    #[arg(long, help_heading = "Shape parameters")]
    pub window_size: Option<usize>,

    /// Adaptive: decrease is ceil(step * backoff-factor)
    #[arg(long, help_heading = "Shape parameters")]
    pub backoff_factor: Option<f64>,

    /// Random: how often a new user count is drawn
    #[arg(long, value_parser = parse_duration, help_heading = "Shape parameters")]
    pub change_interval: Option<Duration>,

    /// Random: fixed seed for a reproducible sequence
    #[arg(long, help_heading = "Shape parameters")]
    pub seed: Option<u64>,
}

#[derive(Debug, Args)]
pub struct SimArgs {
    /// Pause between two iterations of a task
    #[arg(long, value_parser = parse_duration, default_value = "1s", help_heading = "Simulated runner")]
    pub think_time: Duration,

    /// Latency of one simulated request with no load
    #[arg(long, value_parser = parse_duration, default_value = "50ms", help_heading = "Simulated runner")]
    pub base_latency: Duration,

    /// Extra latency per running task
    #[arg(long, value_parser = parse_duration, default_value = "1ms", help_heading = "Simulated runner")]
    pub latency_per_user: Duration,

    /// Probability that a simulated request fails (0..=1)
    #[arg(long, value_parser = parse_ratio, default_value_t = 0.0, help_heading = "Simulated runner")]
    pub error_rate: f64,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub shape: ShapeArgs,

    #[command(flatten)]
    pub sim: SimArgs,

    /// Interval between two shape ticks
    #[arg(long, value_parser = parse_duration, default_value = "1s")]
    pub cadence: Duration,

    /// Hard ceiling on running tasks, whatever the shape asks for
    #[arg(long, env = "CREST_MAX_USERS_CAP")]
    pub max_users_cap: Option<u64>,

    /// Tasks gather in groups of N before each request
    #[arg(long, value_name = "N")]
    pub rendezvous: Option<u64>,

    /// Release a rendezvous round that has waited this long
    #[arg(long, value_parser = parse_duration, requires = "rendezvous")]
    pub rendezvous_timeout: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, env = "CREST_OUTPUT", default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub shape: ShapeArgs,

    /// Distance between two printed samples
    #[arg(long, value_parser = parse_duration, default_value = "1s")]
    pub every: Duration,

    /// Stop sampling here even if the shape has not stopped (defaults to the shape's time limit)
    #[arg(long, value_parser = parse_duration)]
    pub until: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, env = "CREST_OUTPUT", default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn parse_step_reads_users_and_duration() {
        assert_eq!(
            parse_step("20x30s"),
            Ok(StairStep::new(20, Duration::from_secs(30)))
        );
        assert_eq!(
            parse_step(" 5X2m "),
            Ok(StairStep::new(5, Duration::from_secs(120)))
        );
        assert!(parse_step("20").is_err());
        assert!(parse_step("ax30s").is_err());
        assert!(parse_step("20x").is_err());
    }

    #[test]
    fn parse_ratio_bounds() {
        assert_eq!(parse_ratio("0.25"), Ok(0.25));
        assert!(parse_ratio("1.5").is_err());
        assert!(parse_ratio("-0.1").is_err());
    }

    #[test]
    fn cli_parses_run_with_stairs() {
        let parsed = Cli::try_parse_from([
            "crest",
            "-vv",
            "run",
            "--shape",
            "stairs",
            "--steps",
            "10x30s,20x1m",
            "--cadence",
            "500ms",
            "--rendezvous",
            "4",
            "--rendezvous-timeout",
            "2s",
            "--error-rate",
            "0.1",
            "--output",
            "json",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };
        assert_eq!(cli.verbose, 2);

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.shape.shape.as_deref(), Some("stairs"));
                assert_eq!(
                    args.shape.steps,
                    vec![
                        StairStep::new(10, Duration::from_secs(30)),
                        StairStep::new(20, Duration::from_secs(60)),
                    ]
                );
                assert_eq!(args.cadence, Duration::from_millis(500));
                assert_eq!(args.rendezvous, Some(4));
                assert_eq!(args.rendezvous_timeout, Some(Duration::from_secs(2)));
                assert_eq!(args.sim.error_rate, 0.1);
                assert_eq!(args.sim.think_time, Duration::from_secs(1));
                assert!(matches!(args.output, OutputFormat::Json));
            }
            Command::Plan(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_requires_shape_or_config() {
        assert!(Cli::try_parse_from(["crest", "run"]).is_err());
        assert!(
            Cli::try_parse_from(["crest", "run", "--shape", "wave", "--config", "x.yaml"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["crest", "plan", "--config", "x.yaml"]).is_ok());
    }

    #[test]
    fn rendezvous_timeout_requires_rendezvous() {
        assert!(
            Cli::try_parse_from([
                "crest",
                "run",
                "--shape",
                "wave",
                "--rendezvous-timeout",
                "1s"
            ])
            .is_err()
        );
    }
}
