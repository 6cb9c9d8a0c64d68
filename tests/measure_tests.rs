use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use stream_harness::driver::{optional_sampler, run_measurement, run_measurement_with};
use stream_harness::report::{self, LATENCY_CSV_FILE, SUMMARY_JSON_FILE, TIMES_CSV_FILE};
use stream_harness::resources::{ResourceProbe, ResourceSampler};
use stream_harness::settings::MeasureSettings;
use stream_harness::stream::{SyntheticConfig, SyntheticSource};
use stream_harness::HarnessError;
use tempfile::tempdir;

fn settings_in(dir: &std::path::Path) -> MeasureSettings {
    MeasureSettings {
        duration_seconds: 0.6,
        chunk_size: 32,
        nominal_sample_rate: 1000.0,
        output_directory: dir.join("run"),
        resource_sample_interval_seconds: 0.1,
        synthetic: SyntheticConfig {
            channel_count: 2,
            seed: Some(1),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    (out, logs)
}

struct FlatProbe;

impl ResourceProbe for FlatProbe {
    fn process_cpu_percent(&mut self) -> f64 {
        5.0
    }

    fn process_rss_bytes(&mut self) -> f64 {
        1024.0
    }

    fn per_core_cpu_percent(&mut self) -> Option<Vec<f64>> {
        Some(vec![10.0, 30.0])
    }
}

#[tokio::test]
async fn test_measure_writes_artifacts() {
    let dir = tempdir().unwrap();
    let settings = settings_in(dir.path());
    let source = Arc::new(SyntheticSource::new(settings.synthetic.clone()).unwrap());

    let measurement = run_measurement(&settings, source).await.unwrap();
    let summary = &measurement.summary;
    let out = &settings.output_directory;

    assert!(measurement.chunk_count > 0);
    assert!(measurement.shutdown_warnings.is_empty());
    assert!(summary.total_sample_count >= 8);
    assert_eq!(summary.sequence_discontinuities, 0);
    assert!((summary.isi_mean_ms - 1.0).abs() < 1e-6);

    let latency = std::fs::read_to_string(out.join(LATENCY_CSV_FILE)).unwrap();
    let mut lines = latency.lines();
    assert_eq!(lines.next(), Some("latency_ms"));
    assert_eq!(lines.count(), summary.total_sample_count);

    let times = std::fs::read_to_string(out.join(TIMES_CSV_FILE)).unwrap();
    assert_eq!(times.lines().next(), Some("src_time,recv_time"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(SUMMARY_JSON_FILE)).unwrap()).unwrap();
    assert_eq!(json["total_sample_count"], summary.total_sample_count);
    assert_eq!(json["parameters"]["selector"]["key"], "type");
    assert_eq!(json["parameters"]["selector"]["value"], "EEG");
    assert_eq!(json["parameters"]["overflow_policy"], "drop-oldest");
    assert_eq!(json["environment"]["harness_version"], env!("CARGO_PKG_VERSION"));
    assert!(json.get("rr_mean_ms").is_some());
}

#[tokio::test]
async fn test_resource_usage_is_merged() {
    let dir = tempdir().unwrap();
    let settings = settings_in(dir.path());
    let source = Arc::new(SyntheticSource::new(settings.synthetic.clone()).unwrap());
    let sampler = ResourceSampler::with_probe(
        Box::new(FlatProbe),
        settings.resource_sample_interval().unwrap(),
        Instant::now(),
    )
    .unwrap();

    let measurement = run_measurement_with(&settings, source, Some(sampler)).await.unwrap();
    let summary = &measurement.summary;
    assert_eq!(summary.process_cpu_percent_avg, Some(5.0));
    assert_eq!(summary.process_rss_avg_bytes, Some(1024.0));
    assert_eq!(summary.system_cpu_percent_avg, Some(20.0));
    assert_eq!(summary.system_cpu_percent_per_core_avg, vec![10.0, 30.0]);

    let table = report::render_summary_table(summary, true);
    assert!(table.contains("Measurement Summary (verbose)"));
    assert!(table.contains("c1:30.0%"));
}

#[tokio::test]
async fn test_unknown_stream_aborts() {
    let dir = tempdir().unwrap();
    let mut settings = settings_in(dir.path());
    settings.stream_key = "name".into();
    settings.stream_value = "Missing".into();
    let source = Arc::new(SyntheticSource::new(settings.synthetic.clone()).unwrap());

    let started = Instant::now();
    let err = run_measurement_with(&settings, source, None).await.unwrap_err();
    assert!(matches!(err, HarnessError::StreamNotFound { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_too_short_run_still_writes_csvs() {
    let dir = tempdir().unwrap();
    let mut settings = settings_in(dir.path());
    settings.duration_seconds = 0.02;
    // One 5-sample chunk every 5 s: nothing arrives inside the window
    settings.synthetic.sample_rate = 1.0;
    settings.synthetic.chunk_size = 5;
    let source = Arc::new(SyntheticSource::new(settings.synthetic.clone()).unwrap());

    let err = run_measurement_with(&settings, source, None).await.unwrap_err();
    assert!(matches!(err, HarnessError::InsufficientSamples { .. }));
    assert!(settings.output_directory.join(LATENCY_CSV_FILE).exists());
    assert!(settings.output_directory.join(TIMES_CSV_FILE).exists());
    assert!(!settings.output_directory.join(SUMMARY_JSON_FILE).exists());
}

#[tokio::test]
async fn test_unavailable_monitoring_degrades_to_no_resource_fields() {
    let dir = tempdir().unwrap();
    let settings = settings_in(dir.path());
    let source = Arc::new(SyntheticSource::new(settings.synthetic.clone()).unwrap());

    let (sampler, logs) = capture_logs(|| {
        optional_sampler(Err(HarnessError::MonitoringUnavailable("no procfs".into())))
    });
    assert!(sampler.is_none());
    assert!(logs.contains("Resource monitoring is disabled"), "logs: {logs}");

    let measurement = run_measurement_with(&settings, source, sampler).await.unwrap();
    let summary = &measurement.summary;
    assert!(!summary.has_resource_usage());
    assert_eq!(summary.process_cpu_percent_avg, None);
    assert!(summary.system_cpu_percent_per_core_avg.is_empty());

    let json: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(settings.output_directory.join(SUMMARY_JSON_FILE)).unwrap(),
    )
    .unwrap();
    assert!(json["process_cpu_percent_avg"].is_null());
}

#[test]
fn test_optional_sampler_keeps_a_working_sampler() {
    let sampler = ResourceSampler::with_probe(Box::new(FlatProbe), Duration::from_millis(10), Instant::now());
    assert!(optional_sampler(sampler).is_some());
}

#[tokio::test]
async fn test_out_of_range_timing_settings_are_config_errors() {
    let dir = tempdir().unwrap();

    let mut negative_interval = settings_in(dir.path());
    negative_interval.resource_sample_interval_seconds = -1.0;
    let source = Arc::new(SyntheticSource::new(negative_interval.synthetic.clone()).unwrap());
    let err = run_measurement(&negative_interval, source).await.unwrap_err();
    assert!(matches!(err, HarnessError::InvalidConfig(_)));

    let mut nan_interval = settings_in(dir.path());
    nan_interval.resource_sample_interval_seconds = f64::NAN;
    assert!(matches!(nan_interval.resource_sample_interval(), Err(HarnessError::InvalidConfig(_))));

    let mut huge_duration = settings_in(dir.path());
    huge_duration.duration_seconds = 1e20;
    assert!(matches!(huge_duration.duration(), Err(HarnessError::InvalidConfig(_))));
    let source = Arc::new(SyntheticSource::new(huge_duration.synthetic.clone()).unwrap());
    let err = run_measurement(&huge_duration, source).await.unwrap_err();
    assert!(matches!(err, HarnessError::InvalidConfig(_)));
}

#[test]
fn test_summary_table_basic_rows() {
    let chunks = vec![stream_harness::Chunk::from_timestamps(
        (0..16).map(|i| i as f64 * 0.001).collect(),
        0.02,
    )];
    let summary = stream_harness::compute_metrics(&chunks, 1000.0, 0).unwrap();
    let table = report::render_summary_table(&summary, false);
    assert!(table.starts_with("Measurement Summary\n"));
    assert!(table.contains("p50 latency"));
    assert!(table.contains("ring drops"));
    assert!(!table.contains("max latency"));
    assert!(!table.contains("proc CPU"));
}
