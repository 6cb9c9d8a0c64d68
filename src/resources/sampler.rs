use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::metrics::stats::mean;

/// Reads the raw counters the sampler averages.
///
/// Percentage counters report usage since their previous read.
pub trait ResourceProbe: Send {
    fn process_cpu_percent(&mut self) -> f64;

    fn process_rss_bytes(&mut self) -> f64;

    /// Per-core system CPU, or `None` when the platform cannot report it.
    fn per_core_cpu_percent(&mut self) -> Option<Vec<f64>>;
}

/// Probe over `sysinfo` for the current process.
pub struct SysinfoProbe {
    sys: System,
    pid: Pid,
}

impl SysinfoProbe {
    pub fn new() -> Result<Self> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(HarnessError::MonitoringUnavailable(
                "platform is not supported by sysinfo".to_string(),
            ));
        }
        let pid = Pid::from_u32(std::process::id());
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        if sys.process(pid).is_none() {
            return Err(HarnessError::MonitoringUnavailable(format!(
                "process {} is not visible",
                pid
            )));
        }
        Ok(Self { sys, pid })
    }
}

impl ResourceProbe for SysinfoProbe {
    fn process_cpu_percent(&mut self) -> f64 {
        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.sys
            .process(self.pid)
            .map(|p| p.cpu_usage() as f64)
            .unwrap_or(0.0)
    }

    // Memory comes from the refresh done by the cpu read.
    fn process_rss_bytes(&mut self) -> f64 {
        self.sys
            .process(self.pid)
            .map(|p| p.memory() as f64)
            .unwrap_or(0.0)
    }

    fn per_core_cpu_percent(&mut self) -> Option<Vec<f64>> {
        self.sys.refresh_cpu_usage();
        let cores: Vec<f64> = self.sys.cpus().iter().map(|c| c.cpu_usage() as f64).collect();
        if cores.is_empty() {
            None
        } else {
            Some(cores)
        }
    }
}

/// Averaged resource figures over a measurement window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub process_cpu_percent_avg: f64,
    pub process_rss_avg_bytes: f64,
    /// Mean of the per-core averages
    pub system_cpu_percent_avg: Option<f64>,
    pub system_cpu_percent_per_core_avg: Vec<f64>,
}

/// Samples process and system CPU plus RSS at a fixed minimum interval.
pub struct ResourceSampler {
    probe: Box<dyn ResourceProbe>,
    interval: Duration,
    last_sample: Instant,
    per_core_supported: bool,
    cpu: Vec<f64>,
    rss: Vec<f64>,
    per_core: Vec<Vec<f64>>,
}

impl ResourceSampler {
    /// Sampler over the current process via `sysinfo`.
    pub fn new(interval: Duration) -> Result<Self> {
        let probe = SysinfoProbe::new()?;
        Self::with_probe(Box::new(probe), interval, Instant::now())
    }

    /// The first sample is due one `interval` after `started_at`.
    pub fn with_probe(
        mut probe: Box<dyn ResourceProbe>,
        interval: Duration,
        started_at: Instant,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(HarnessError::InvalidConfig(
                "resource sample interval must be positive".to_string(),
            ));
        }

        // Throwaway reads so the first real sample covers a known window.
        probe.process_cpu_percent();
        let per_core_supported = probe.per_core_cpu_percent().is_some();
        if !per_core_supported {
            debug!("Per-core CPU usage not available");
        }

        Ok(Self {
            probe,
            interval,
            last_sample: started_at,
            per_core_supported,
            cpu: Vec::new(),
            rss: Vec::new(),
            per_core: Vec::new(),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn sample_count(&self) -> usize {
        self.cpu.len()
    }

    /// Sample if at least one interval has passed since the last sample.
    pub fn maybe_sample(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_sample) < self.interval {
            return false;
        }
        self.sample(now);
        true
    }

    /// Take a last sample regardless of the interval.
    pub fn finalize(&mut self) {
        self.sample(Instant::now());
    }

    fn sample(&mut self, now: Instant) {
        self.cpu.push(self.probe.process_cpu_percent());
        self.rss.push(self.probe.process_rss_bytes());
        if self.per_core_supported {
            if let Some(cores) = self.probe.per_core_cpu_percent() {
                self.per_core.push(cores);
            }
        }
        self.last_sample = now;
    }

    /// Averages over every recorded sample, `None` before the first one.
    pub fn snapshot(&self) -> Option<ResourceUsage> {
        if self.cpu.is_empty() {
            return None;
        }

        let core_count = self.per_core.iter().map(Vec::len).max().unwrap_or(0);
        let per_core_avg: Vec<f64> = (0..core_count)
            .map(|core| {
                let readings: Vec<f64> = self
                    .per_core
                    .iter()
                    .filter_map(|sample| sample.get(core).copied())
                    .collect();
                mean(&readings)
            })
            .collect();
        let system_avg = if per_core_avg.is_empty() {
            None
        } else {
            Some(mean(&per_core_avg))
        };

        Some(ResourceUsage {
            process_cpu_percent_avg: mean(&self.cpu),
            process_rss_avg_bytes: mean(&self.rss),
            system_cpu_percent_avg: system_avg,
            system_cpu_percent_per_core_avg: per_core_avg,
        })
    }
}
