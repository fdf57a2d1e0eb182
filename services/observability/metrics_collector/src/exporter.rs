//! Metric exporters
//!
//! Each export receives the full current point buffer. A failing exporter is
//! logged by the collector and never blocks the others.

use crate::point::MetricPoint;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

#[async_trait]
pub trait MetricsExporter: Send + Sync {
    fn name(&self) -> &str;

    async fn export(&self, points: &[MetricPoint]) -> Result<()>;
}

/// Logs a per-name summary through `tracing`
#[derive(Debug, Default, Clone)]
pub struct LogExporter;

#[async_trait]
impl MetricsExporter for LogExporter {
    fn name(&self) -> &str {
        "log"
    }

    async fn export(&self, points: &[MetricPoint]) -> Result<()> {
        let mut latest: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
        for point in points {
            let entry = latest.entry(point.name.as_str()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 = point.value;
        }

        info!(points = points.len(), metrics = latest.len(), "Metrics export");
        for (name, (count, value)) in latest {
            info!(metric = name, samples = count, latest = value, "Metric summary");
        }
        Ok(())
    }
}

/// Appends every exported point as one JSON object per line
#[derive(Debug, Clone)]
pub struct JsonLinesExporter {
    path: PathBuf,
}

impl JsonLinesExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetricsExporter for JsonLinesExporter {
    fn name(&self) -> &str {
        "json-lines"
    }

    async fn export(&self, points: &[MetricPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::with_capacity(points.len() * 96);
        for point in points {
            serde_json::to_writer(&mut buffer, point)?;
            buffer.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open metrics export file {:?}", self.path))?;
        file.write_all(&buffer)
            .await
            .with_context(|| format!("Failed to write metrics to {:?}", self.path))?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{labels, MetricType};

    fn point(name: &str, value: f64) -> MetricPoint {
        MetricPoint {
            name: name.to_string(),
            metric_type: MetricType::Gauge,
            value,
            timestamp: 1,
            labels: labels(&[]),
        }
    }

    #[tokio::test]
    async fn test_json_lines_appends() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonLinesExporter::new(dir.path().join("metrics.jsonl"));

        exporter.export(&[point("a", 1.0), point("b", 2.0)]).await.unwrap();
        exporter.export(&[point("c", 3.0)]).await.unwrap();

        let content = std::fs::read_to_string(exporter.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: MetricPoint = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last.name, "c");
    }

    #[tokio::test]
    async fn test_json_lines_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonLinesExporter::new(dir.path().join("missing").join("metrics.jsonl"));
        assert!(exporter.export(&[point("a", 1.0)]).await.is_err());
    }

    #[tokio::test]
    async fn test_log_exporter_never_fails() {
        LogExporter.export(&[]).await.unwrap();
        LogExporter.export(&[point("a", 1.0)]).await.unwrap();
    }
}
