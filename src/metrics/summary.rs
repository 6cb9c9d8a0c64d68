use serde::{Deserialize, Serialize};

use crate::resources::ResourceUsage;

/// Timing-quality figures for one measurement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    // Latency
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_latency_ms: f64,
    pub jitter_ms: f64,
    pub jitter_std_ms: f64,

    // Rate and clock
    pub effective_sample_rate_hz: f64,
    pub drift_ms_per_min: f64,
    pub drops_percentage: f64,
    pub total_sample_count: usize,
    pub ring_drops: u64,

    // Inter-sample intervals
    pub isi_mean_ms: f64,
    pub isi_std_ms: f64,
    pub isi_p50_ms: f64,
    pub isi_p95_ms: f64,
    pub isi_p99_ms: f64,
    pub sequence_discontinuities: usize,

    // Chunk receive intervals
    pub rr_mean_ms: f64,
    pub rr_std_ms: f64,

    // Resource usage, null when sampling was unavailable
    pub process_cpu_percent_avg: Option<f64>,
    pub process_rss_avg_bytes: Option<f64>,
    pub system_cpu_percent_avg: Option<f64>,
    #[serde(default)]
    pub system_cpu_percent_per_core_avg: Vec<f64>,
}

impl Summary {
    /// Merge averaged resource figures into the flat record.
    /// `None` leaves the resource fields empty.
    pub fn with_resource_usage(mut self, usage: Option<ResourceUsage>) -> Self {
        match usage {
            Some(usage) => {
                self.process_cpu_percent_avg = Some(usage.process_cpu_percent_avg);
                self.process_rss_avg_bytes = Some(usage.process_rss_avg_bytes);
                self.system_cpu_percent_avg = usage.system_cpu_percent_avg;
                self.system_cpu_percent_per_core_avg = usage.system_cpu_percent_per_core_avg;
            }
            None => {
                self.process_cpu_percent_avg = None;
                self.process_rss_avg_bytes = None;
                self.system_cpu_percent_avg = None;
                self.system_cpu_percent_per_core_avg.clear();
            }
        }
        self
    }

    pub fn has_resource_usage(&self) -> bool {
        self.process_cpu_percent_avg.is_some()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Flat key/value view, the shape persisted in `summary.json`.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
