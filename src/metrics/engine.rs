//! Reduction of drained chunks into a [`Summary`].
//!
//! Pure: the same chunks and nominal rate always give the same summary. The
//! only side effect is a warning when receive-interval statistics cannot be
//! computed.

use tracing::warn;

use super::stats::{diff, least_squares_slope, mean, percentile_sorted, std_dev};
use super::summary::Summary;
use crate::error::{HarnessError, Result};
use crate::stream::Chunk;

/// Fewest samples a summary is computed from.
pub const MIN_SAMPLES: usize = 8;

/// Floor on the observed span so rates never divide by zero.
pub const MIN_DURATION_SECONDS: f64 = 1e-6;

struct Percentiles {
    p50: f64,
    p95: f64,
    p99: f64,
    max: f64,
}

impl Percentiles {
    fn of(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p95: percentile_sorted(&sorted, 95.0),
            p99: percentile_sorted(&sorted, 99.0),
            max: sorted.last().copied().unwrap_or(0.0),
        }
    }
}

/// Compute timing statistics over `chunks` (oldest first).
///
/// `ring_drops` is the channel's overflow counter and is passed through.
/// Resource fields are left empty; merge them with
/// [`Summary::with_resource_usage`].
pub fn compute_metrics(chunks: &[Chunk], nominal_rate: f64, ring_drops: u64) -> Result<Summary> {
    let mut source_times: Vec<f64> = Vec::new();
    let mut receive_times: Vec<f64> = Vec::new();
    let mut chunk_receive_times: Vec<f64> = Vec::with_capacity(chunks.len());
    let mut sequence_discontinuities = 0;
    let mut previous_last: Option<f64> = None;

    for chunk in chunks {
        chunk_receive_times.push(chunk.receive_timestamp());

        let timestamps = chunk.source_timestamps();
        let (Some(&first), Some(&last)) = (timestamps.first(), timestamps.last()) else {
            continue;
        };
        if let Some(previous) = previous_last {
            if first < previous {
                sequence_discontinuities += 1;
            }
        }
        previous_last = Some(last);

        source_times.extend_from_slice(timestamps);
        receive_times.extend(chunk.reconstructed_receive_times());
    }

    let total = source_times.len();
    if total < MIN_SAMPLES {
        return Err(HarnessError::InsufficientSamples {
            found: total,
            required: MIN_SAMPLES,
        });
    }

    let latencies: Vec<f64> = receive_times
        .iter()
        .zip(&source_times)
        .map(|(recv, src)| (recv - src) * 1000.0)
        .collect();
    let latency = Percentiles::of(&latencies);

    let first_source = source_times[0];
    let span = source_times[total - 1] - first_source;
    let duration = span.max(MIN_DURATION_SECONDS);
    let effective_sample_rate_hz = total as f64 / duration;

    let elapsed: Vec<f64> = source_times.iter().map(|ts| ts - first_source).collect();
    let drift_ms_per_min = least_squares_slope(&elapsed, &latencies) * 60.0;

    let expected = nominal_rate * duration;
    let drops_percentage = ((expected - total as f64) / expected.max(1.0)).max(0.0) * 100.0;

    let isi: Vec<f64> = diff(&source_times).into_iter().map(|d| d * 1000.0).collect();
    let isi_stats = Percentiles::of(&isi);

    let rr: Vec<f64> = diff(&chunk_receive_times)
        .into_iter()
        .map(|d| d * 1000.0)
        .collect();
    if chunk_receive_times.len() <= 1 {
        warn!("One or zero chunk receive times: R-R interval statistics will be zero.");
    }

    Ok(Summary {
        p50_ms: latency.p50,
        p95_ms: latency.p95,
        p99_ms: latency.p99,
        max_latency_ms: latency.max,
        jitter_ms: latency.p95 - latency.p50,
        jitter_std_ms: std_dev(&latencies),
        effective_sample_rate_hz,
        drift_ms_per_min,
        drops_percentage,
        total_sample_count: total,
        ring_drops,
        isi_mean_ms: mean(&isi),
        isi_std_ms: std_dev(&isi),
        isi_p50_ms: isi_stats.p50,
        isi_p95_ms: isi_stats.p95,
        isi_p99_ms: isi_stats.p99,
        sequence_discontinuities,
        rr_mean_ms: mean(&rr),
        rr_std_ms: std_dev(&rr),
        process_cpu_percent_avg: None,
        process_rss_avg_bytes: None,
        system_cpu_percent_avg: None,
        system_cpu_percent_per_core_avg: Vec::new(),
    })
}
