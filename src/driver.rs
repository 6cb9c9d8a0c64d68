//! Measurement driver: runs the worker for the configured duration, drains
//! the channel on a fixed cadence and produces the run artifacts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::acquisition::{AcquisitionWorker, ShutdownWarning, WorkerConfig};
use crate::error::{HarnessError, Result};
use crate::metrics::{compute_metrics, Summary};
use crate::report;
use crate::resources::ResourceSampler;
use crate::settings::MeasureSettings;
use crate::stream::{Chunk, StreamSource};

const DRAIN_CADENCE: Duration = Duration::from_millis(10);
const DRAIN_PER_TICK: usize = 16;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub summary: Summary,
    pub chunk_count: usize,
    pub shutdown_warnings: Vec<ShutdownWarning>,
}

/// Run one measurement against `source`, sampling resources via `sysinfo`.
///
/// Resource monitoring that cannot be set up is skipped with a warning.
pub async fn run_measurement(
    settings: &MeasureSettings,
    source: Arc<dyn StreamSource>,
) -> Result<Measurement> {
    settings.validate()?;
    let sampler = optional_sampler(ResourceSampler::new(settings.resource_sample_interval()?));
    run_measurement_with(settings, source, sampler).await
}

/// Keep a sampler that could be built. A failed one is logged and the run
/// goes on without resource figures.
pub fn optional_sampler(sampler: Result<ResourceSampler>) -> Option<ResourceSampler> {
    match sampler {
        Ok(sampler) => Some(sampler),
        Err(e) => {
            warn!("Resource monitoring is disabled ({})", e);
            None
        }
    }
}

/// Same as [`run_measurement`] with a caller-supplied sampler.
pub async fn run_measurement_with(
    settings: &MeasureSettings,
    source: Arc<dyn StreamSource>,
    mut sampler: Option<ResourceSampler>,
) -> Result<Measurement> {
    settings.validate()?;
    let output_directory = settings.output_directory.clone();
    std::fs::create_dir_all(&output_directory)?;

    let mut config = WorkerConfig::new(settings.selector()?);
    config.chunk_size = settings.chunk_size;
    config.ring_capacity = settings.ring_capacity;
    config.overflow_policy = settings.overflow_policy;

    let mut worker = AcquisitionWorker::new(config, source)?;
    worker = blocking(move || worker.start().map(|()| worker)).await??;
    let channel = worker.channel();

    let deadline = Instant::now() + settings.duration()?;
    let mut cadence = tokio::time::interval(DRAIN_CADENCE);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut chunks: Vec<Chunk> = Vec::new();
    info!("Measuring for {:.1}s", settings.duration_seconds);

    while Instant::now() < deadline {
        cadence.tick().await;
        if let Some(sampler) = sampler.as_mut() {
            sampler.maybe_sample(Instant::now());
        }
        chunks.extend(channel.drain_upto(DRAIN_PER_TICK));
    }

    let shutdown_warnings = blocking(move || worker.stop()).await?;
    if let Some(sampler) = sampler.as_mut() {
        sampler.finalize();
    }
    chunks.extend(channel.drain_upto(usize::MAX));
    info!(
        "Collected {} chunk(s), {} lost to ring overflow",
        chunks.len(),
        channel.drops()
    );

    report::write_sample_csvs(&output_directory, &chunks)?;

    let summary = compute_metrics(&chunks, settings.nominal_sample_rate, channel.drops())?
        .with_resource_usage(sampler.as_ref().and_then(ResourceSampler::snapshot));
    let path = report::write_summary_json(&output_directory, &summary, settings)?;
    info!("Summary written to {}", path.display());

    Ok(Measurement {
        summary,
        chunk_count: chunks.len(),
        shutdown_warnings,
    })
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HarnessError::Stream(format!("blocking task failed: {}", e)))
}
