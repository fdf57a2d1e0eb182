//! # Performer Metrics Collector
//!
//! Counters, gauges and histograms kept in a bounded in-memory buffer, exported
//! on a fixed interval to pluggable exporters and aged out by a retention
//! window.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use performer_metrics::{CollectorConfig, LogExporter, MetricsCollector};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let metrics = Arc::new(MetricsCollector::new(CollectorConfig::default()));
//! metrics.add_exporter(Arc::new(LogExporter));
//! metrics.start();
//!
//! metrics.increment("tasks_total", &[("worker", "echo")]);
//! let timer = metrics.timer("task_duration_ms", &[]);
//! timer.stop();
//! println!("{:?}", metrics.get_aggregation("task_duration_ms"));
//! # }
//! ```

pub mod aggregation;
pub mod collector;
pub mod exporter;
pub mod point;

pub use aggregation::Aggregation;
pub use collector::{CollectorConfig, MetricsCollector, MetricsSnapshot, Timer};
pub use exporter::{JsonLinesExporter, LogExporter, MetricsExporter};
pub use point::{labels, Labels, MetricPoint, MetricType};
