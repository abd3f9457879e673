//! histo - Command-line driver for the activity histogram
//!
//! Commands:
//! - bin: Aggregate records into buckets
//! - replay: Play an interaction script against a histogram on a simulated clock
//! - validate: Report records that cannot be binned

use chrono::TimeZone;
use chrono_tz::Tz;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{info, Level};

use activity_histogram::binning::{aggregate_with_report, parse_array, parse_ndjson, validate_records};
use activity_histogram::{
    FilterUpdate, Frame, Histogram, HistogramConfig, HistogramError, InputEvent, Mode, Record,
    HISTOGRAM_VERSION,
};

/// histo - Binning and interaction replay for the activity histogram
#[derive(Parser)]
#[command(name = "histo")]
#[command(version = HISTOGRAM_VERSION)]
#[command(about = "Bin edit records and replay histogram interactions", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate records into buckets
    Bin {
        #[command(flatten)]
        records: RecordArgs,

        /// Binning mode
        #[arg(long, default_value = "recency")]
        mode: CliMode,

        /// Zone used for calendar-day boundaries (IANA format)
        #[arg(long, default_value = "UTC")]
        timezone: String,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Replay an interaction script and print frames and filter updates
    Replay {
        #[command(flatten)]
        records: RecordArgs,

        /// Interaction script: one {"at_ms": .., "event": {..}} per line
        #[arg(short, long)]
        script: PathBuf,

        /// Histogram mode
        #[arg(long, default_value = "recency")]
        mode: CliMode,

        /// Histogram configuration (JSON file)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Mount time in epoch milliseconds (defaults to now)
        #[arg(long)]
        now_ms: Option<f64>,

        /// Print filter updates only, without frames
        #[arg(long)]
        filters_only: bool,
    },

    /// Report records that cannot be binned
    Validate {
        #[command(flatten)]
        records: RecordArgs,

        /// Mode whose fields are checked
        #[arg(long, default_value = "recency")]
        mode: CliMode,

        /// Zone used for calendar-day boundaries (IANA format)
        #[arg(long, default_value = "UTC")]
        timezone: String,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct RecordArgs {
    /// Records file path (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Input format
    #[arg(long, default_value = "ndjson")]
    input_format: InputFormat,

    /// Records are map feature properties (`_timestamp` seconds, `_userExperience`)
    #[arg(long)]
    properties: bool,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMode {
    /// Calendar-day buckets over record timestamps
    Recency,
    /// Power-of-two buckets over user experience
    Experience,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Recency => Mode::Recency,
            CliMode::Experience => Mode::Experience,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), HistoCliError> {
    match cli.command {
        Commands::Bin {
            records,
            mode,
            timezone,
            pretty,
        } => cmd_bin(&records, mode.into(), &timezone, pretty),

        Commands::Replay {
            records,
            script,
            mode,
            config,
            now_ms,
            filters_only,
        } => cmd_replay(
            &records,
            &script,
            mode.into(),
            config.as_deref(),
            now_ms,
            filters_only,
        ),

        Commands::Validate {
            records,
            mode,
            timezone,
            json,
        } => cmd_validate(&records, mode.into(), &timezone, json),
    }
}

fn read_input(path: &Path) -> Result<String, HistoCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn load_records(args: &RecordArgs) -> Result<Vec<Record>, HistoCliError> {
    let input_data = read_input(&args.input)?;

    let records = if args.properties {
        let values: Vec<serde_json::Value> = match args.input_format {
            InputFormat::Json => serde_json::from_str(&input_data)?,
            InputFormat::Ndjson => input_data
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<Result<_, _>>()?,
        };
        values.iter().map(Record::from_feature_properties).collect()
    } else {
        match args.input_format {
            InputFormat::Ndjson => parse_ndjson(&input_data)?,
            InputFormat::Json => parse_array(&input_data)?,
        }
    };

    info!(count = records.len(), "loaded records");
    Ok(records)
}

fn timezone_config(timezone: &str) -> HistogramConfig {
    HistogramConfig {
        timezone: timezone.to_string(),
        ..Default::default()
    }
}

fn cmd_bin(args: &RecordArgs, mode: Mode, timezone: &str, pretty: bool) -> Result<(), HistoCliError> {
    let tz = timezone_config(timezone).tz()?;
    let records = load_records(args)?;
    let report = aggregate_with_report(&records, mode, &tz);

    let output = BinOutput {
        mode,
        total_records: records.len(),
        dropped_records: report.dropped,
        buckets: report
            .buckets
            .iter()
            .map(|b| BucketOutput {
                key: b.key,
                count: b.count,
                label: bucket_label(mode, b.key, &tz),
            })
            .collect(),
    };

    if pretty {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", serde_json::to_string(&output)?);
    }
    Ok(())
}

/// Human-readable bucket label: the local day, or the experience range
fn bucket_label(mode: Mode, key: i64, tz: &Tz) -> String {
    match mode {
        Mode::Recency => tz
            .timestamp_millis_opt(key)
            .earliest()
            .map(|dt| dt.date_naive().to_string())
            .unwrap_or_default(),
        Mode::Experience if (0..62).contains(&key) => {
            format!("{}..{}", 1u64 << key, (1u64 << (key + 1)) - 1)
        }
        Mode::Experience => format!("2^{}", key),
    }
}

fn cmd_replay(
    args: &RecordArgs,
    script_path: &Path,
    mode: Mode,
    config_path: Option<&Path>,
    now_ms: Option<f64>,
    filters_only: bool,
) -> Result<(), HistoCliError> {
    let config = match config_path {
        Some(path) => HistogramConfig::from_json(&fs::read_to_string(path)?)?,
        None => HistogramConfig::default(),
    };
    let records = load_records(args)?;
    let script = parse_script(&read_input(script_path)?)?;

    let mut histogram = match now_ms {
        Some(now_ms) => Histogram::new(mode, config, now_ms)?,
        None => Histogram::with_current_time(mode, config)?,
    };
    histogram.set_records(records);
    info!(steps = script.len(), instance = %histogram.instance_id(), "replaying script");

    // Simulated clock: script offsets are measured from t0
    let t0 = Instant::now();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for step in &script {
        let now = t0 + Duration::from_millis(step.at_ms);
        drain_filters(&mut histogram, t0, Some(now), &mut out)?;

        histogram.handle(&step.event, now);
        if !filters_only {
            let line = ReplayLine::Frame {
                at_ms: step.at_ms,
                frame: histogram.frame(),
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        }
    }
    drain_filters(&mut histogram, t0, None, &mut out)?;

    out.flush()?;
    Ok(())
}

/// Fire debounced updates in deadline order, up to `until` (or all of them)
fn drain_filters<W: Write>(
    histogram: &mut Histogram,
    t0: Instant,
    until: Option<Instant>,
    out: &mut W,
) -> Result<(), HistoCliError> {
    while let Some(deadline) = histogram.next_deadline() {
        if until.is_some_and(|until| deadline > until) {
            break;
        }
        let mut updates: Vec<FilterUpdate> = Vec::new();
        histogram.poll(deadline, &mut updates);
        for update in updates {
            let line = ReplayLine::Filter {
                at_ms: deadline.duration_since(t0).as_millis() as u64,
                update,
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        }
    }
    Ok(())
}

fn parse_script(ndjson: &str) -> Result<Vec<ScriptStep>, HistoCliError> {
    let mut steps: Vec<ScriptStep> = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let step: ScriptStep = serde_json::from_str(trimmed).map_err(|e| {
            HistogramError::InvalidScript(format!("line {}: {}", line_num + 1, e))
        })?;
        if let Some(prev) = steps.last() {
            if step.at_ms < prev.at_ms {
                return Err(HistogramError::InvalidScript(format!(
                    "line {}: at_ms {} goes back in time (previous {})",
                    line_num + 1,
                    step.at_ms,
                    prev.at_ms
                ))
                .into());
            }
        }
        steps.push(step);
    }
    Ok(steps)
}

fn cmd_validate(args: &RecordArgs, mode: Mode, timezone: &str, json: bool) -> Result<(), HistoCliError> {
    let tz = timezone_config(timezone).tz()?;
    let records = load_records(args)?;
    let failures = validate_records(&records, mode, &tz);

    let report = ValidationReport {
        mode,
        total_records: records.len(),
        valid_records: records.len() - failures.len(),
        invalid_records: failures.len(),
        errors: failures
            .iter()
            .map(|f| ValidationErrorDetail {
                index: f.index,
                error: f.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report ({})", report.mode);
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Record {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(HistoCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

// Script and output types

#[derive(Deserialize)]
struct ScriptStep {
    at_ms: u64,
    event: InputEvent,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ReplayLine<'a> {
    Frame { at_ms: u64, frame: Frame<'a> },
    Filter { at_ms: u64, update: FilterUpdate },
}

#[derive(Serialize)]
struct BinOutput {
    mode: Mode,
    total_records: usize,
    dropped_records: usize,
    buckets: Vec<BucketOutput>,
}

#[derive(Serialize)]
struct BucketOutput {
    key: i64,
    count: u32,
    label: String,
}

// Error types

#[derive(Debug)]
enum HistoCliError {
    Io(io::Error),
    Histogram(HistogramError),
    Json(serde_json::Error),
    ValidationFailed(usize),
}

impl From<io::Error> for HistoCliError {
    fn from(e: io::Error) -> Self {
        HistoCliError::Io(e)
    }
}

impl From<HistogramError> for HistoCliError {
    fn from(e: HistogramError) -> Self {
        HistoCliError::Histogram(e)
    }
}

impl From<serde_json::Error> for HistoCliError {
    fn from(e: serde_json::Error) -> Self {
        HistoCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HistoCliError> for CliError {
    fn from(e: HistoCliError) -> Self {
        match e {
            HistoCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HistoCliError::Histogram(e) => {
                let (code, hint) = match &e {
                    HistogramError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    HistogramError::InvalidRecord { .. } => {
                        ("PARSE_ERROR", "Records need numeric timestamp (ms) and experience fields")
                    }
                    HistogramError::InvalidConfig(_) => ("CONFIG_ERROR", "Check the configuration values"),
                    HistogramError::InvalidTimezone(_) => {
                        ("TIMEZONE_ERROR", "Use an IANA zone name such as \"Europe/Berlin\"")
                    }
                    HistogramError::UnknownMode(_) => ("MODE_ERROR", "Use 'recency' or 'experience'"),
                    HistogramError::InvalidScript(_) => {
                        ("SCRIPT_ERROR", "Each line needs at_ms and an event, in time order")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            HistoCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HistoCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Run 'histo validate' for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    mode: Mode,
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}
