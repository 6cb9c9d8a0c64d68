//! Run artifacts: per-sample CSVs, `summary.json` and console output.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::buffer::OverflowPolicy;
use crate::error::Result;
use crate::metrics::Summary;
use crate::settings::MeasureSettings;
use crate::stream::Chunk;

pub const LATENCY_CSV_FILE: &str = "latency.csv";
pub const TIMES_CSV_FILE: &str = "times.csv";
pub const SUMMARY_JSON_FILE: &str = "summary.json";

#[derive(Debug, Clone, Serialize)]
pub struct Environment {
    pub harness_version: String,
    pub os: String,
    pub arch: String,
}

impl Environment {
    pub fn current() -> Self {
        Self {
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectorParameters {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Parameters {
    pub selector: SelectorParameters,
    pub duration_seconds: f64,
    pub chunk_size: usize,
    pub nominal_sample_rate: f64,
    pub ring_capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl From<&MeasureSettings> for Parameters {
    fn from(settings: &MeasureSettings) -> Self {
        Self {
            selector: SelectorParameters {
                key: settings.stream_key.clone(),
                value: settings.stream_value.clone(),
            },
            duration_seconds: settings.duration_seconds,
            chunk_size: settings.chunk_size,
            nominal_sample_rate: settings.nominal_sample_rate,
            ring_capacity: settings.ring_capacity,
            overflow_policy: settings.overflow_policy,
        }
    }
}

/// Flat summary fields followed by run metadata.
#[derive(Serialize)]
struct SummaryDocument<'a> {
    #[serde(flatten)]
    summary: &'a Summary,
    environment: Environment,
    parameters: Parameters,
}

/// Write `latency.csv` and `times.csv`, one row per sample in chunk order.
///
/// Receive times are the per-sample reconstruction, so each row's latency
/// matches what the summary is computed from.
pub fn write_sample_csvs(dir: &Path, chunks: &[Chunk]) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut latency = csv::Writer::from_path(dir.join(LATENCY_CSV_FILE))?;
    let mut times = csv::Writer::from_path(dir.join(TIMES_CSV_FILE))?;

    latency.write_record(["latency_ms"])?;
    times.write_record(["src_time", "recv_time"])?;

    let mut rows = 0usize;
    for chunk in chunks {
        let receive_times = chunk.reconstructed_receive_times();
        for (src, recv) in chunk.source_timestamps().iter().zip(&receive_times) {
            latency.write_record([((recv - src) * 1000.0).to_string()])?;
            times.write_record([src.to_string(), recv.to_string()])?;
            rows += 1;
        }
    }

    latency.flush()?;
    times.flush()?;
    debug!("Wrote {} sample rows to {}", rows, dir.display());
    Ok(())
}

/// Write `summary.json` and return its path.
pub fn write_summary_json(dir: &Path, summary: &Summary, settings: &MeasureSettings) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let document = SummaryDocument {
        summary,
        environment: Environment::current(),
        parameters: Parameters::from(settings),
    };
    let path = dir.join(SUMMARY_JSON_FILE);
    fs::write(&path, serde_json::to_string_pretty(&document)?)?;
    Ok(path)
}

/// Two-column metric table for the terminal.
pub fn render_summary_table(summary: &Summary, verbose: bool) -> String {
    let mut rows: Vec<(String, String)> = vec![
        ("p50 latency".into(), format!("{:.2} ms", summary.p50_ms)),
        ("p95 latency".into(), format!("{:.2} ms", summary.p95_ms)),
        ("p99 latency".into(), format!("{:.2} ms", summary.p99_ms)),
        ("jitter (p95-p50)".into(), format!("{:.2} ms", summary.jitter_ms)),
        (
            "eff. sample rate".into(),
            format!("{:.2} Hz", summary.effective_sample_rate_hz),
        ),
        ("drift".into(), format!("{:.2} ms/min", summary.drift_ms_per_min)),
        ("drops".into(), format!("{:.2} %", summary.drops_percentage)),
        ("samples".into(), summary.total_sample_count.to_string()),
        ("ring drops".into(), summary.ring_drops.to_string()),
    ];
    if let Some(cpu) = summary.process_cpu_percent_avg {
        rows.push(("proc CPU (avg)".into(), format!("{:.1} %", cpu)));
    }
    if let Some(cpu) = summary.system_cpu_percent_avg {
        rows.push(("system CPU (avg)".into(), format!("{:.1} %", cpu)));
    }
    if let Some(rss) = summary.process_rss_avg_bytes {
        rows.push((
            "proc RSS (avg)".into(),
            format!("{:.1} MiB", rss / (1024.0 * 1024.0)),
        ));
    }

    if verbose {
        rows.push(("max latency".into(), format!("{:.2} ms", summary.max_latency_ms)));
        rows.push(("jitter std".into(), format!("{:.2} ms", summary.jitter_std_ms)));
        rows.push(("ISI p95".into(), format!("{:.2} ms", summary.isi_p95_ms)));
        rows.push(("ISI p99".into(), format!("{:.2} ms", summary.isi_p99_ms)));
        rows.push(("R-R std".into(), format!("{:.2} ms", summary.rr_std_ms)));
        rows.push((
            "seq discontinuities".into(),
            summary.sequence_discontinuities.to_string(),
        ));
        if !summary.system_cpu_percent_per_core_avg.is_empty() {
            let per_core = summary
                .system_cpu_percent_per_core_avg
                .iter()
                .enumerate()
                .map(|(i, v)| format!("c{}:{:.1}%", i, v))
                .collect::<Vec<_>>()
                .join(", ");
            rows.push(("system CPU/core".into(), per_core));
        }
    }

    let title = if verbose {
        "Measurement Summary (verbose)"
    } else {
        "Measurement Summary"
    };
    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{:<width$}  {}", "Metric", "Value", width = width);
    let _ = writeln!(out, "{}", "-".repeat(width + 12));
    for (name, value) in rows {
        let _ = writeln!(out, "{:<width$}  {}", name, value, width = width);
    }
    out
}
