//! In-process synthetic stream.
//!
//! Emits a 10 Hz sine on every channel in fixed-size chunks released on a
//! real-time schedule. Send jitter, whole-chunk burst loss and source clock
//! drift can be injected to exercise the metrics.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clock;
use super::source::{PulledChunk, Selector, StreamInfo, StreamInlet, StreamSource};
use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub name: String,
    pub stream_type: String,
    pub channel_count: usize,
    pub sample_rate: f64,
    pub chunk_size: usize,
    pub signal_frequency: f64,
    /// Uniform send jitter, +/- this many ms around each release time
    pub jitter_ms: f64,
    /// Percentage (0-100) of chunks dropped before they reach the inlet
    pub burst_loss_percent: f64,
    pub drift_ms_per_minute: f64,
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "EEG_Sim".to_string(),
            stream_type: "EEG".to_string(),
            channel_count: 8,
            sample_rate: 1000.0,
            chunk_size: 32,
            signal_frequency: 10.0,
            jitter_ms: 0.0,
            burst_loss_percent: 0.0,
            drift_ms_per_minute: 0.0,
            seed: None,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 || self.chunk_size == 0 {
            return Err(HarnessError::InvalidConfig(
                "synthetic channel_count and chunk_size must be at least 1".to_string(),
            ));
        }
        if !(self.sample_rate > 0.0) {
            return Err(HarnessError::InvalidConfig(
                "synthetic sample_rate must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.burst_loss_percent) {
            return Err(HarnessError::InvalidConfig(
                "synthetic burst_loss_percent must be within 0-100".to_string(),
            ));
        }
        Ok(())
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            name: self.name.clone(),
            stream_type: self.stream_type.clone(),
            source_id: format!("sim-{}", self.name),
            channel_count: self.channel_count,
            nominal_srate: self.sample_rate,
        }
    }
}

/// Stream source backed by a generator running in the caller's process.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    config: SyntheticConfig,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }
}

impl StreamSource for SyntheticSource {
    fn resolve(&self, selector: &Selector, _timeout: Duration) -> Result<Vec<StreamInfo>> {
        let info = self.config.info();
        if info.matches(selector) {
            Ok(vec![info])
        } else {
            Ok(Vec::new())
        }
    }

    fn open(&self, info: &StreamInfo) -> Result<Arc<dyn StreamInlet>> {
        debug!("Opening synthetic inlet for '{}'", info.name);
        Ok(Arc::new(SyntheticInlet::new(self.config.clone())))
    }
}

struct Generator {
    config: SyntheticConfig,
    rng: StdRng,
    started_at: Instant,
    src_start: f64,
    dt: f64,
    dt_src: f64,
    phase: f64,
    next_chunk: u64,
    next_due: Instant,
    pending_samples: VecDeque<f32>,
    pending_timestamps: VecDeque<f64>,
}

impl Generator {
    fn new(config: SyntheticConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let dt = 1.0 / config.sample_rate;
        let drift_per_second = (config.drift_ms_per_minute / 1000.0) / 60.0;
        let started_at = Instant::now();
        let mut generator = Self {
            rng,
            started_at,
            src_start: clock::local_clock(),
            dt,
            dt_src: dt * (1.0 + drift_per_second),
            phase: 0.0,
            next_chunk: 0,
            next_due: started_at,
            pending_samples: VecDeque::new(),
            pending_timestamps: VecDeque::new(),
            config,
        };
        generator.next_due = generator.due_time(0);
        generator
    }

    fn chunk_duration(&self) -> f64 {
        self.config.chunk_size as f64 * self.dt
    }

    /// A chunk is released once its last sample has been acquired.
    fn due_time(&mut self, chunk: u64) -> Instant {
        let mut offset = (chunk + 1) as f64 * self.chunk_duration();
        if self.config.jitter_ms > 0.0 && chunk > 0 {
            let jitter = self.config.jitter_ms / 1000.0;
            offset += self.rng.gen_range(-jitter..=jitter);
        }
        self.started_at + Duration::from_secs_f64(offset.max(0.0))
    }

    /// Release every chunk whose due time has passed.
    fn release_due(&mut self, now: Instant) {
        while self.next_due <= now {
            let chunk = self.next_chunk;
            let lost = chunk > 0
                && self.config.burst_loss_percent > 0.0
                && self.rng.gen::<f64>() < self.config.burst_loss_percent * 0.01;
            self.emit(chunk, lost);
            self.next_chunk += 1;
            self.next_due = self.due_time(self.next_chunk);
        }
    }

    fn emit(&mut self, chunk: u64, lost: bool) {
        let chunk_size = self.config.chunk_size;
        let first_index = chunk * chunk_size as u64;
        let delta_phase = 2.0 * PI * self.config.signal_frequency * self.dt;

        for i in 0..chunk_size {
            let value = self.phase.sin() as f32;
            self.phase = (self.phase + delta_phase) % (2.0 * PI);
            if lost {
                continue;
            }
            let ts = self.src_start + (first_index + i as u64) as f64 * self.dt_src;
            self.pending_timestamps.push_back(ts);
            for _ in 0..self.config.channel_count {
                self.pending_samples.push_back(value);
            }
        }
    }

    fn take(&mut self, max_samples: usize) -> PulledChunk {
        let count = max_samples.min(self.pending_timestamps.len());
        let channels = self.config.channel_count;
        PulledChunk {
            samples: self.pending_samples.drain(..count * channels).collect(),
            channel_count: channels,
            timestamps: self.pending_timestamps.drain(..count).collect(),
        }
    }
}

pub struct SyntheticInlet {
    generator: Mutex<Generator>,
    closed: AtomicBool,
}

impl SyntheticInlet {
    fn new(config: SyntheticConfig) -> Self {
        Self {
            generator: Mutex::new(Generator::new(config)),
            closed: AtomicBool::new(false),
        }
    }
}

impl StreamInlet for SyntheticInlet {
    fn pull_chunk(&self, max_samples: usize, timeout: Duration) -> Result<PulledChunk> {
        let deadline = Instant::now() + timeout;
        let mut generator = self
            .generator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        loop {
            if self.closed.load(Ordering::Acquire) || max_samples == 0 {
                return Ok(PulledChunk::default());
            }

            let now = Instant::now();
            generator.release_due(now);
            if !generator.pending_timestamps.is_empty() {
                return Ok(generator.take(max_samples));
            }
            if now >= deadline {
                return Ok(PulledChunk::default());
            }

            let wake = generator.next_due.min(deadline);
            std::thread::sleep(wake.saturating_duration_since(now));
        }
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SyntheticConfig {
        SyntheticConfig {
            channel_count: 2,
            sample_rate: 1000.0,
            chunk_size: 4,
            seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_by_type_and_name() {
        let source = SyntheticSource::new(fast_config()).unwrap();
        let by_type = source.resolve(&Selector::new("type", "EEG").unwrap(), Duration::ZERO).unwrap();
        assert_eq!(by_type.len(), 1);
        let missing = source.resolve(&Selector::new("name", "Nope").unwrap(), Duration::ZERO).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SyntheticConfig {
            burst_loss_percent: 150.0,
            ..Default::default()
        };
        assert!(SyntheticSource::new(config).is_err());
    }

    #[test]
    fn test_pull_returns_spaced_timestamps() {
        let source = SyntheticSource::new(fast_config()).unwrap();
        let info = source.config().info();
        let inlet = source.open(&info).unwrap();

        let mut pulled = PulledChunk::default();
        for _ in 0..20 {
            pulled = inlet.pull_chunk(4, Duration::from_millis(50)).unwrap();
            if !pulled.is_empty() {
                break;
            }
        }
        assert_eq!(pulled.timestamps.len(), 4);
        assert_eq!(pulled.samples.len(), 8);
        for pair in pulled.timestamps.windows(2) {
            assert!((pair[1] - pair[0] - 0.001).abs() < 1e-9);
        }
    }

    #[test]
    fn test_closed_inlet_returns_empty() {
        let source = SyntheticSource::new(fast_config()).unwrap();
        let inlet = source.open(&source.config().info()).unwrap();
        inlet.close().unwrap();
        let pulled = inlet.pull_chunk(4, Duration::from_millis(20)).unwrap();
        assert!(pulled.is_empty());
    }
}
