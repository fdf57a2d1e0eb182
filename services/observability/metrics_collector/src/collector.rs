//! Metrics collector: bounded point buffer, running totals, periodic export

use crate::aggregation::Aggregation;
use crate::exporter::MetricsExporter;
use crate::point::{labels, Labels, MetricPoint, MetricType};
use parking_lot::{Mutex, RwLock};
use performer_config::MetricsSettings;
use performer_types::{current_timestamp_ms, duration_to_ms};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Collector tuning
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub enabled: bool,
    pub export_interval: Duration,
    pub retention: Duration,
    pub max_points: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::from(&MetricsSettings::default())
    }
}

impl From<&MetricsSettings> for CollectorConfig {
    fn from(settings: &MetricsSettings) -> Self {
        Self {
            enabled: settings.enabled,
            export_interval: settings.export_interval(),
            retention: settings.retention(),
            max_points: settings.max_points.max(1),
        }
    }
}

/// Current counter and gauge values plus histogram summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, f64>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, Aggregation>,
    pub points: usize,
}

#[derive(Debug, Default)]
struct MetricStore {
    points: VecDeque<MetricPoint>,
    counters: HashMap<String, f64>,
    gauges: HashMap<String, f64>,
    /// `(timestamp, value)` observations per histogram name
    histograms: HashMap<String, VecDeque<(u64, f64)>>,
}

pub struct MetricsCollector {
    config: CollectorConfig,
    store: Mutex<MetricStore>,
    exporters: RwLock<Vec<Arc<dyn MetricsExporter>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Running timer returned by [`MetricsCollector::timer`]
///
/// Nothing is recorded unless [`Timer::stop`] is called.
#[must_use = "a timer records nothing until stopped"]
pub struct Timer<'a> {
    collector: &'a MetricsCollector,
    name: String,
    labels: Labels,
    started: Instant,
}

impl Timer<'_> {
    /// Record the elapsed milliseconds as a histogram observation
    pub fn stop(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.collector
            .record(&self.name, MetricType::Histogram, elapsed.as_secs_f64() * 1_000.0, self.labels);
        elapsed
    }
}

impl MetricsCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            store: Mutex::new(MetricStore::default()),
            exporters: RwLock::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// A collector that records nothing
    pub fn disabled() -> Self {
        Self::new(CollectorConfig {
            enabled: false,
            ..CollectorConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn add_exporter(&self, exporter: Arc<dyn MetricsExporter>) {
        debug!("Registered metrics exporter '{}'", exporter.name());
        self.exporters.write().push(exporter);
    }

    /// Add `delta` to the running total and emit a point with the new total
    pub fn counter(&self, name: &str, delta: f64, label_pairs: &[(&str, &str)]) -> f64 {
        if !self.config.enabled {
            return 0.0;
        }
        let mut store = self.store.lock();
        let total = {
            let entry = store.counters.entry(name.to_string()).or_insert(0.0);
            *entry += delta;
            *entry
        };
        self.push_point(&mut store, name, MetricType::Counter, total, labels(label_pairs));
        total
    }

    /// Counter increment by one
    pub fn increment(&self, name: &str, label_pairs: &[(&str, &str)]) -> f64 {
        self.counter(name, 1.0, label_pairs)
    }

    pub fn gauge(&self, name: &str, value: f64, label_pairs: &[(&str, &str)]) {
        self.record(name, MetricType::Gauge, value, labels(label_pairs));
    }

    pub fn histogram(&self, name: &str, value: f64, label_pairs: &[(&str, &str)]) {
        self.record(name, MetricType::Histogram, value, labels(label_pairs));
    }

    /// Histogram observation of a duration in milliseconds
    pub fn record_duration(&self, name: &str, duration: Duration, label_pairs: &[(&str, &str)]) {
        self.histogram(name, duration_to_ms(duration) as f64, label_pairs);
    }

    pub fn timer(&self, name: &str, label_pairs: &[(&str, &str)]) -> Timer<'_> {
        Timer {
            collector: self,
            name: name.to_string(),
            labels: labels(label_pairs),
            started: Instant::now(),
        }
    }

    fn record(&self, name: &str, metric_type: MetricType, value: f64, labels: Labels) {
        if !self.config.enabled {
            return;
        }
        let mut store = self.store.lock();
        match metric_type {
            MetricType::Gauge => {
                store.gauges.insert(name.to_string(), value);
            }
            MetricType::Histogram => {
                let max_points = self.config.max_points;
                let observations = store.histograms.entry(name.to_string()).or_default();
                observations.push_back((current_timestamp_ms(), value));
                while observations.len() > max_points {
                    observations.pop_front();
                }
            }
            MetricType::Counter => {}
        }
        self.push_point(&mut store, name, metric_type, value, labels);
    }

    fn push_point(
        &self,
        store: &mut MetricStore,
        name: &str,
        metric_type: MetricType,
        value: f64,
        labels: Labels,
    ) {
        store.points.push_back(MetricPoint {
            name: name.to_string(),
            metric_type,
            value,
            timestamp: current_timestamp_ms(),
            labels,
        });
        while store.points.len() > self.config.max_points {
            store.points.pop_front();
        }
    }

    /// Number of retained points
    pub fn len(&self) -> usize {
        self.store.lock().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the retained points, oldest first
    pub fn points(&self) -> Vec<MetricPoint> {
        self.store.lock().points.iter().cloned().collect()
    }

    pub fn points_for(&self, name: &str) -> Vec<MetricPoint> {
        self.store
            .lock()
            .points
            .iter()
            .filter(|p| p.name == name)
            .cloned()
            .collect()
    }

    /// Distinct metric names in the buffer
    pub fn names(&self) -> Vec<String> {
        let store = self.store.lock();
        let names: BTreeSet<&str> = store.points.iter().map(|p| p.name.as_str()).collect();
        names.into_iter().map(str::to_string).collect()
    }

    pub fn counter_value(&self, name: &str) -> Option<f64> {
        self.store.lock().counters.get(name).copied()
    }

    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.store.lock().gauges.get(name).copied()
    }

    /// Statistics over every retained point with this name
    pub fn get_aggregation(&self, name: &str) -> Option<Aggregation> {
        let values: Vec<f64> = self
            .store
            .lock()
            .points
            .iter()
            .filter(|p| p.name == name)
            .map(|p| p.value)
            .collect();
        Aggregation::from_values(&values)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let store = self.store.lock();
        MetricsSnapshot {
            counters: store.counters.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            gauges: store.gauges.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            histograms: store
                .histograms
                .iter()
                .filter_map(|(name, values)| {
                    let values: Vec<f64> = values.iter().map(|(_, v)| *v).collect();
                    Aggregation::from_values(&values).map(|agg| (name.clone(), agg))
                })
                .collect(),
            points: store.points.len(),
        }
    }

    /// Drop points older than the retention window
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(current_timestamp_ms())
    }

    pub fn cleanup_expired_at(&self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(duration_to_ms(self.config.retention));
        let mut store = self.store.lock();
        let before = store.points.len();
        store.points.retain(|p| p.timestamp >= cutoff);
        let removed = before - store.points.len();
        store.histograms.retain(|_, observations| {
            observations.retain(|(timestamp, _)| *timestamp >= cutoff);
            !observations.is_empty()
        });
        if removed > 0 {
            debug!("Removed {} expired metric points", removed);
        }
        removed
    }

    /// Hand the current buffer to every exporter; returns how many succeeded
    pub async fn flush(&self) -> usize {
        if !self.config.enabled {
            return 0;
        }
        let points = self.points();
        let exporters: Vec<Arc<dyn MetricsExporter>> = self.exporters.read().clone();

        let mut succeeded = 0;
        for exporter in exporters {
            match exporter.export(&points).await {
                Ok(()) => succeeded += 1,
                Err(e) => warn!("Metrics exporter '{}' failed: {:#}", exporter.name(), e),
            }
        }
        succeeded
    }

    /// Spawn the export and retention loops
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!("Metrics collection disabled");
            return;
        }
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let collector = Arc::clone(self);
        let export_interval = self.config.export_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(export_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                collector.flush().await;
            }
        }));

        let collector = Arc::clone(self);
        let cleanup_interval = self.config.retention.min(export_interval);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                collector.cleanup_expired();
            }
        }));

        info!(
            "Metrics collector started (export every {:?}, retention {:?}, max {} points)",
            self.config.export_interval, self.config.retention, self.config.max_points
        );
    }

    pub fn stop(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    /// Prometheus-style text exposition
    pub fn render_text(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        for (name, value) in &snapshot.counters {
            let name = sanitize(name);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, value);
        }
        for (name, value) in &snapshot.gauges {
            let name = sanitize(name);
            let _ = writeln!(out, "# TYPE {} gauge", name);
            let _ = writeln!(out, "{} {}", name, value);
        }
        for (name, agg) in &snapshot.histograms {
            let name = sanitize(name);
            let _ = writeln!(out, "# TYPE {} summary", name);
            for (quantile, value) in [("0.5", agg.p50), ("0.9", agg.p90), ("0.95", agg.p95), ("0.99", agg.p99)] {
                let _ = writeln!(out, "{}{{quantile=\"{}\"}} {}", name, quantile, value);
            }
            let _ = writeln!(out, "{}_sum {}", name, agg.sum);
            let _ = writeln!(out, "{}_count {}", name, agg.count);
        }
        out
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        for handle in self.tasks.get_mut().drain(..) {
            handle.abort();
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect()
}
