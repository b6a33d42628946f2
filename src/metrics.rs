//! Prometheus metrics for ct-monitor
//!
//! Counts calls made to Logs, problems found in their responses and
//! changes to their accepted roots.

use lazy_static::lazy_static;
use prometheus::{HistogramVec, IntCounterVec, Opts, Registry};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total calls made to Log endpoints
    /// Labels: endpoint, outcome="success|<client error kind>"
    pub static ref API_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "ctmonitor_api_calls_total",
            "Total number of calls made to CT Log endpoints"
        ),
        &["endpoint", "outcome"]
    ).expect("metric cannot be created");

    /// Log endpoint latency in seconds
    /// Labels: endpoint
    pub static ref API_CALL_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "ctmonitor_api_call_duration_seconds",
            "Duration of calls to CT Log endpoints in seconds"
        )
        .buckets(vec![
            0.010, 0.025, 0.050, 0.100, 0.250,  // 10ms to 250ms
            0.500, 1.0, 2.5, 5.0, 10.0, 30.0    // 500ms to 30s
        ]),
        &["endpoint"]
    ).expect("metric cannot be created");

    /// Problems found in Log responses
    /// Labels: log, kind, classification="misbehaviour|unexpected"
    pub static ref VERIFICATION_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "ctmonitor_verification_errors_total",
            "Total number of problems found verifying CT Log responses"
        ),
        &["log", "kind", "classification"]
    ).expect("metric cannot be created");

    /// Changes to a Log's accepted root certificates
    /// Labels: log
    pub static ref ROOT_SET_CHANGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "ctmonitor_root_set_changes_total",
            "Total number of changes seen in CT Log root certificate sets"
        ),
        &["log"]
    ).expect("metric cannot be created");
}

/// Initialize metrics registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(API_CALLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(API_CALL_DURATION.clone()))?;
    REGISTRY.register(Box::new(VERIFICATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ROOT_SET_CHANGES_TOTAL.clone()))?;

    Ok(())
}

pub fn record_api_call(endpoint: &str, outcome: &str, elapsed: Duration) {
    API_CALLS_TOTAL.with_label_values(&[endpoint, outcome]).inc();
    API_CALL_DURATION
        .with_label_values(&[endpoint])
        .observe(elapsed.as_secs_f64());
}

pub fn record_verification_error(log: &str, kind: &str, classification: &str) {
    VERIFICATION_ERRORS_TOTAL
        .with_label_values(&[log, kind, classification])
        .inc();
}

pub fn record_root_set_change(log: &str) {
    ROOT_SET_CHANGES_TOTAL.with_label_values(&[log]).inc();
}

/// Export metrics in Prometheus text format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// None = stdout, Some = file path
    pub export_path: Option<String>,
    #[serde(default = "default_export_interval_secs")]
    pub export_interval_secs: u64,
}

fn default_export_interval_secs() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            export_path: None,
            export_interval_secs: default_export_interval_secs(),
        }
    }
}

/// Background task for periodic metrics export
pub async fn metrics_exporter_task(config: MetricsConfig, mut shutdown_rx: watch::Receiver<bool>) {
    let period = Duration::from_secs(config.export_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = ticker.tick() => {}
        }

        let metrics_text = export_metrics();

        match &config.export_path {
            None => {
                println!("\n# Prometheus Metrics");
                println!("{}", metrics_text);
            }
            Some(path) => {
                if let Err(e) = tokio::fs::write(path, metrics_text.as_bytes()).await {
                    warn!("Failed to write metrics to file {}: {}", path, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_api_call() {
        record_api_call("get-sth", "success", Duration::from_millis(20));
        assert!(API_CALLS_TOTAL.with_label_values(&["get-sth", "success"]).get() > 0);
        assert!(
            API_CALL_DURATION
                .with_label_values(&["get-sth"])
                .get_sample_count()
                > 0
        );
    }

    #[test]
    fn test_export_metrics() {
        // Registration is process-wide; another test may have done it.
        let _ = init_metrics();
        record_root_set_change("metrics-test-log");
        let output = export_metrics();
        assert!(output.contains("ctmonitor_root_set_changes_total"));
    }

    #[tokio::test]
    async fn test_exporter_writes_file() {
        let _ = init_metrics();
        record_verification_error("metrics-test-log", "old_timestamp", "misbehaviour");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        let config = MetricsConfig {
            enabled: true,
            export_path: Some(path.to_string_lossy().into_owned()),
            export_interval_secs: 1,
        };
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(metrics_exporter_task(config, rx));

        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ctmonitor_verification_errors_total"));
    }
}
