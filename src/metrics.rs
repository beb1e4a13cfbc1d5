//! Serving metrics for the price prediction service.

use crate::error::ErrorKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept for percentile calculation
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for request handling
pub struct PipelineMetrics {
    /// Total requests received
    pub requests_received: AtomicU64,
    /// Requests answered with a label
    pub predictions_succeeded: AtomicU64,
    /// Requests answered with a failure
    pub predictions_failed: AtomicU64,
    failures_by_kind: RwLock<HashMap<ErrorKind, u64>>,
    /// Predicted labels and how often each was returned
    label_counts: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            predictions_succeeded: AtomicU64::new(0),
            predictions_failed: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            label_counts: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful prediction
    pub fn record_success(&self, processing_time: Duration, label: &str) {
        self.predictions_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_latency(processing_time);

        if let Ok(mut counts) = self.label_counts.write() {
            *counts.entry(label.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a failed prediction
    pub fn record_failure(&self, processing_time: Duration, kind: ErrorKind) {
        self.predictions_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(processing_time);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    fn record_latency(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) => times.clone(),
            Err(_) => return ProcessingStats::default(),
        };
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_received.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_label_counts(&self) -> HashMap<String, u64> {
        self.label_counts
            .read()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }

    pub fn get_failures_by_kind(&self) -> HashMap<ErrorKind, u64> {
        self.failures_by_kind
            .read()
            .map(|by_kind| by_kind.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests_received.load(Ordering::Relaxed);
        let succeeded = self.predictions_succeeded.load(Ordering::Relaxed);
        let failed = self.predictions_failed.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();

        info!(
            requests = requests,
            succeeded = succeeded,
            failed = failed,
            throughput = format!("{:.1} req/s", self.get_throughput()),
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Price prediction metrics"
        );

        let mut labels: Vec<(String, u64)> = self.get_label_counts().into_iter().collect();
        labels.sort();
        for (label, count) in labels {
            let pct = if succeeded > 0 {
                (count as f64 / succeeded as f64) * 100.0
            } else {
                0.0
            };
            info!(label = %label, count = count, share = format!("{:.1}%", pct), "Label distribution");
        }

        for (kind, count) in self.get_failures_by_kind() {
            info!(kind = kind.as_str(), count = count, "Failures by kind");
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints periodic metrics summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
