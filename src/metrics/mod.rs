/*!
 * # Metrics Module
 *
 * In-process counters, gauges and histograms for the field operations service.
 * Exposed as Prometheus text at `/metrics` and as JSON at `/metrics/json`.
 *
 * Database timings are reported separately through the `metrics` crate macros in `db`.
 */

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    Export(String),
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Stores the f64 bit pattern so fractional values survive.
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    bits: Arc<AtomicU64>,
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_millis: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    /// Records a duration-like observation in milliseconds.
    pub fn observe(&self, millis: f64) {
        self.sum_millis
            .fetch_add(millis.max(0.0).round() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        self.sum_millis.load(Ordering::Relaxed) as f64
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges.entry(name.to_string()).or_default().clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        use std::fmt::Write;

        let mut output = String::new();
        let mut write = |line: String| {
            output
                .write_str(&line)
                .map_err(|e| MetricsError::Export(e.to_string()))
        };

        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            write(format!("# TYPE {} counter\n{} {}\n", name, name, counter.get()))?;
        }

        for entry in self.gauges.iter() {
            let (name, gauge) = entry.pair();
            write(format!("# TYPE {} gauge\n{} {}\n", name, name, gauge.get()))?;
        }

        for entry in self.histograms.iter() {
            let (name, histogram) = entry.pair();
            write(format!(
                "# TYPE {} histogram\n{}_count {}\n{}_sum {}\n",
                name,
                name,
                histogram.get_count(),
                name,
                histogram.get_sum()
            ))?;
        }

        Ok(output)
    }

    pub fn export_metrics_json(&self) -> serde_json::Value {
        let counters: serde_json::Map<_, _> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), json!(entry.value().get())))
            .collect();

        let gauges: serde_json::Map<_, _> = self
            .gauges
            .iter()
            .map(|entry| (entry.key().clone(), json!(entry.value().get())))
            .collect();

        let histograms: serde_json::Map<_, _> = self
            .histograms
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    json!({
                        "count": entry.value().get_count(),
                        "sum": entry.value().get_sum(),
                    }),
                )
            })
            .collect();

        json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

// Global metrics registry
pub static METRICS: Lazy<MetricsRegistry> = Lazy::new(MetricsRegistry::new);

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn set_gauge(name: &str, value: f64) {
    METRICS.get_or_create_gauge(name).set(value);
}

pub fn observe_histogram(name: &str, value: f64) {
    METRICS.get_or_create_histogram(name).observe(value);
}

/// Metric names shared by services, the dispatch client and jobs.
pub mod names {
    pub const IMPORT_IMPORTED: &str = "fieldops_import_imported_total";
    pub const IMPORT_DUPLICATES: &str = "fieldops_import_duplicates_total";
    pub const IMPORT_ERRORS: &str = "fieldops_import_errors_total";
    pub const STATUS_CHANGES: &str = "fieldops_work_order_status_changes_total";
    pub const DISPATCH_CALLS: &str = "fieldops_dispatch_calls_total";
    pub const DISPATCH_FAILURES: &str = "fieldops_dispatch_failures_total";
    pub const DISPATCH_LATENCY: &str = "fieldops_dispatch_latency_ms";
    pub const BATCHES_FAILED: &str = "fieldops_dispatch_batches_failed_total";
    pub const REPORTS_UPSERTED: &str = "fieldops_reports_upserted_total";
    pub const JOB_RUNS: &str = "fieldops_job_runs_total";
    pub const JOB_FAILURES: &str = "fieldops_job_failures_total";
    pub const JOBS_RUNNING: &str = "fieldops_jobs_running";
    pub const EVENTS_PROCESSED: &str = "fieldops_events_processed_total";
}

pub async fn metrics_handler() -> Result<String, MetricsError> {
    METRICS.export_metrics()
}

pub async fn metrics_json_handler() -> serde_json::Value {
    METRICS.export_metrics_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exports_prometheus_text() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("jobs_total").inc_by(3);
        registry.get_or_create_gauge("queue_depth").set(2.5);
        let hist = registry.get_or_create_histogram("latency_ms");
        hist.observe(10.0);
        hist.observe(30.0);

        let text = registry.export_metrics().unwrap();
        assert!(text.contains("jobs_total 3"));
        assert!(text.contains("queue_depth 2.5"));
        assert!(text.contains("latency_ms_count 2"));
        assert!(text.contains("latency_ms_sum 40"));
    }

    #[test]
    fn counters_are_shared_by_name() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("a").inc();
        registry.get_or_create_counter("a").inc();

        let json = registry.export_metrics_json();
        assert_eq!(json["counters"]["a"], 2);
    }
}
