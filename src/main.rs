//! stream-harness command line.
//!
//! `measure` connects to the configured stream, records for a fixed duration
//! and writes `latency.csv`, `times.csv` and `summary.json`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stream_harness::driver;
use stream_harness::OverflowPolicy;
use stream_harness::report;
use stream_harness::settings::{MeasureSettings, SettingsOverrides};
use stream_harness::stream::SyntheticSource;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Timing-quality harness for sample streams
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect samples and compute timing statistics
    Measure(MeasureArgs),
}

#[derive(clap::Args, Debug)]
struct MeasureArgs {
    /// Stream property to resolve on (e.g. 'name' or 'type')
    #[arg(long)]
    stream_key: Option<String>,

    /// Value the property must have
    #[arg(long)]
    stream_value: Option<String>,

    /// Seconds to collect samples for
    #[arg(long)]
    duration_seconds: Option<f64>,

    /// Maximum samples pulled per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Nominal sample rate of the stream in Hz
    #[arg(long)]
    nominal_sample_rate: Option<f64>,

    /// Directory where result files are written
    #[arg(long)]
    output_directory: Option<PathBuf>,

    /// Chunks buffered between acquisition and the driver
    #[arg(long)]
    ring_capacity: Option<usize>,

    /// What a full buffer does: drop-oldest or reject-newest
    #[arg(long)]
    overflow_policy: Option<OverflowPolicy>,

    /// Seconds between CPU/RSS samples
    #[arg(long)]
    resource_interval_seconds: Option<f64>,

    /// Print a brief metrics table
    #[arg(long = "summary", overrides_with = "no_summary")]
    summary: bool,
    #[arg(long = "no-summary", overrides_with = "summary")]
    no_summary: bool,

    /// Include extended metrics in the table
    #[arg(long = "verbose-summary", overrides_with = "no_verbose_summary")]
    verbose_summary: bool,
    #[arg(long = "no-verbose-summary", overrides_with = "verbose_summary")]
    no_verbose_summary: bool,

    /// Print metrics as one compact JSON line on stdout
    #[arg(long = "json-summary", overrides_with = "no_json_summary")]
    json_summary: bool,
    #[arg(long = "no-json-summary", overrides_with = "json_summary")]
    no_json_summary: bool,

    /// TOML or JSON settings file. CLI flags override environment
    /// variables, which override file values.
    #[arg(long)]
    settings_file: Option<PathBuf>,
}

fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl MeasureArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            stream_key: self.stream_key.clone(),
            stream_value: self.stream_value.clone(),
            duration_seconds: self.duration_seconds,
            chunk_size: self.chunk_size,
            nominal_sample_rate: self.nominal_sample_rate,
            output_directory: self.output_directory.clone(),
            ring_capacity: self.ring_capacity,
            overflow_policy: self.overflow_policy,
            resource_sample_interval_seconds: self.resource_interval_seconds,
            print_summary: flag(self.summary, self.no_summary),
            verbose_summary: flag(self.verbose_summary, self.no_verbose_summary),
            json_summary: flag(self.json_summary, self.no_json_summary),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match cli.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Measure(args) => measure(args).await,
    }
}

async fn measure(args: MeasureArgs) -> anyhow::Result<()> {
    let settings = MeasureSettings::from_sources(args.overrides(), args.settings_file.clone())
        .context("Failed to load settings")?;
    info!("stream-harness v{}", env!("CARGO_PKG_VERSION"));

    let source = Arc::new(SyntheticSource::new(settings.synthetic.clone())?);
    let measurement = driver::run_measurement(&settings, source)
        .await
        .context("Measurement failed")?;
    let summary = &measurement.summary;

    if settings.print_summary {
        print!("{}", report::render_summary_table(summary, settings.verbose_summary));
    }
    println!("Done -> {}", settings.output_directory.display());

    if settings.json_summary {
        println!("{}", summary.to_json()?);
    }
    Ok(())
}
