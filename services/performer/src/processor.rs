//! Task processor: pipeline, worker invocation and outcome bookkeeping

use crate::context::{TaskContext, TaskContextBuilder};
use crate::error::{PerformerError, Result};
use crate::pipeline::{PipelineStage, TaskPipeline, METRICS_KEY};
use crate::worker::Worker;
use parking_lot::Mutex;
use performer_config::PerformerConfig;
use performer_metrics::aggregation::nearest_rank;
use performer_metrics::MetricsCollector;
use performer_types::{current_timestamp_ms, TaskMetrics, TaskRequest, TaskResponse};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument};

/// Most recent task records kept in memory
pub const MAX_TASK_METRICS: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    pub task_timeout: Duration,
    pub metrics_enabled: bool,
    pub max_task_metrics: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from(&PerformerConfig::default())
    }
}

impl From<&PerformerConfig> for ProcessorConfig {
    fn from(config: &PerformerConfig) -> Self {
        Self {
            task_timeout: config.server.task_timeout(),
            metrics_enabled: config.metrics.enabled,
            max_task_metrics: MAX_TASK_METRICS,
        }
    }
}

/// Aggregate view over the retained task records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetricsSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub total_payload_bytes: u64,
    pub total_result_bytes: u64,
}

pub struct TaskProcessor {
    worker: Arc<dyn Worker>,
    pipeline: TaskPipeline,
    collector: Arc<MetricsCollector>,
    config: ProcessorConfig,
    task_metrics: Mutex<VecDeque<TaskMetrics>>,
}

impl TaskProcessor {
    pub fn new(
        worker: Arc<dyn Worker>,
        custom_stages: Vec<Arc<dyn PipelineStage>>,
        collector: Arc<MetricsCollector>,
        config: ProcessorConfig,
    ) -> Self {
        let pipeline = TaskPipeline::standard(custom_stages, config.metrics_enabled);
        Self {
            worker,
            pipeline,
            collector,
            config,
            task_metrics: Mutex::new(VecDeque::new()),
        }
    }

    pub fn worker(&self) -> &Arc<dyn Worker> {
        &self.worker
    }

    pub fn pipeline(&self) -> &TaskPipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run one task to completion; the response task id always matches the request
    pub async fn process_task(&self, request: TaskRequest) -> Result<TaskResponse> {
        let mut ctx = TaskContextBuilder::new(request)
            .timeout(self.config.task_timeout)
            .build();
        let span = ctx.span().clone();

        let outcome = self.execute(&mut ctx).instrument(span.clone()).await;
        let end_time = current_timestamp_ms();
        let started = ctx
            .get::<TaskMetrics>(METRICS_KEY)
            .unwrap_or_else(|| {
                TaskMetrics::start(
                    ctx.task_id(),
                    ctx.execution_id(),
                    ctx.start_time(),
                    ctx.request().payload_size(),
                )
            });

        match outcome {
            Ok(response) => {
                let metrics = started.complete(end_time, response.result_size());
                span.in_scope(|| {
                    info!(
                        duration_ms = metrics.duration_ms.unwrap_or_default(),
                        result_size = metrics.result_size,
                        "Task completed"
                    )
                });
                self.record(metrics);
                Ok(response)
            }
            Err(e) => {
                let e = e.normalize(ctx.task_id());
                span.in_scope(|| warn!(kind = ?e.kind(), "Task failed: {}", e));
                self.record(started.fail(end_time, e.to_string()));
                Err(e)
            }
        }
    }

    async fn execute(&self, ctx: &mut TaskContext) -> Result<TaskResponse> {
        self.pipeline.run(ctx).await?;

        ctx.check_cancelled()?;
        self.worker.validate_task(ctx.request()).await?;

        ctx.check_cancelled()?;
        let response = self.worker.handle_task(ctx.request()).await?;

        // The worker is never interrupted; a late result is still a timeout
        ctx.check_cancelled()?;

        if response.task_id != ctx.task_id() {
            return Err(PerformerError::execution(
                ctx.task_id(),
                format!(
                    "worker returned response for task '{}'",
                    response.task_id
                ),
            ));
        }
        if response.result.is_empty() {
            return Err(PerformerError::execution(ctx.task_id(), "worker returned an empty result"));
        }
        Ok(response)
    }

    fn record(&self, metrics: TaskMetrics) {
        let outcome = if metrics.success { "success" } else { "failure" };
        self.collector.increment("tasks_total", &[("outcome", outcome)]);
        if !metrics.success {
            self.collector.increment("tasks_failed_total", &[]);
        }
        if let Some(duration) = metrics.duration_ms {
            self.collector
                .histogram("task_duration_ms", duration as f64, &[("outcome", outcome)]);
        }
        self.collector
            .histogram("payload_bytes", metrics.payload_size as f64, &[]);

        let mut task_metrics = self.task_metrics.lock();
        task_metrics.push_back(metrics);
        while task_metrics.len() > self.config.max_task_metrics {
            task_metrics.pop_front();
        }
    }

    /// Retained task records, oldest first
    pub fn task_metrics(&self) -> Vec<TaskMetrics> {
        self.task_metrics.lock().iter().cloned().collect()
    }

    /// Up to `limit` most recent records, newest first
    pub fn recent_task_metrics(&self, limit: usize) -> Vec<TaskMetrics> {
        self.task_metrics
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn metrics_summary(&self) -> TaskMetricsSummary {
        let records = self.task_metrics.lock();
        let total = records.len();
        if total == 0 {
            return TaskMetricsSummary::default();
        }

        let succeeded = records.iter().filter(|m| m.success).count();
        let mut durations: Vec<f64> = records
            .iter()
            .filter_map(|m| m.duration_ms)
            .map(|d| d as f64)
            .collect();
        durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        TaskMetricsSummary {
            total,
            succeeded,
            failed: total - succeeded,
            success_rate: succeeded as f64 / total as f64,
            avg_duration_ms,
            p95_duration_ms: nearest_rank(&durations, 95.0),
            total_payload_bytes: records.iter().map(|m| m.payload_size as u64).sum(),
            total_result_bytes: records.iter().map(|m| m.result_size as u64).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::workers::EchoWorker;
    use async_trait::async_trait;

    struct Misbehaving {
        task_id: Option<&'static str>,
        result: &'static [u8],
    }

    #[async_trait]
    impl Worker for Misbehaving {
        fn name(&self) -> &str {
            "misbehaving"
        }

        async fn handle_task(&self, request: &TaskRequest) -> Result<TaskResponse> {
            let task_id = self
                .task_id
                .map(str::to_string)
                .unwrap_or_else(|| request.task_id.clone());
            Ok(TaskResponse::new(task_id, self.result.to_vec()))
        }
    }

    struct Untyped;

    #[async_trait]
    impl Worker for Untyped {
        fn name(&self) -> &str {
            "untyped"
        }

        async fn handle_task(&self, _request: &TaskRequest) -> Result<TaskResponse> {
            Err(anyhow::anyhow!("backend refused connection").into())
        }
    }

    fn processor(worker: Arc<dyn Worker>) -> TaskProcessor {
        TaskProcessor::new(
            worker,
            Vec::new(),
            Arc::new(MetricsCollector::new(Default::default())),
            ProcessorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_success_records_metrics() {
        let processor = processor(Arc::new(EchoWorker));
        let response = processor
            .process_task(TaskRequest::new("t1", b"hello".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.task_id, "t1");

        let records = processor.task_metrics();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].payload_size, 5);
        assert_eq!(records[0].result_size, 5);
        assert!(records[0].execution_id.starts_with("t1-"));
    }

    #[tokio::test]
    async fn test_mismatched_task_id_is_execution_error() {
        let processor = processor(Arc::new(Misbehaving {
            task_id: Some("other"),
            result: b"x",
        }));
        let err = processor
            .process_task(TaskRequest::new("t1", b"x".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(!processor.task_metrics()[0].success);
    }

    #[tokio::test]
    async fn test_empty_result_is_execution_error() {
        let processor = processor(Arc::new(Misbehaving {
            task_id: None,
            result: b"",
        }));
        let err = processor
            .process_task(TaskRequest::new("t1", b"x".to_vec()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty result"));
    }

    #[tokio::test]
    async fn test_untyped_errors_become_execution_errors() {
        let processor = processor(Arc::new(Untyped));
        let err = processor
            .process_task(TaskRequest::new("t7", b"x".to_vec()))
            .await
            .unwrap_err();
        match &err {
            PerformerError::Execution { task_id, message } => {
                assert_eq!(task_id, "t7");
                assert_eq!(message, "backend refused connection");
            }
            other => panic!("unexpected {:?}", other),
        }
        let record = &processor.task_metrics()[0];
        assert_eq!(record.error.as_deref(), Some(err.to_string().as_str()));
    }

    #[tokio::test]
    async fn test_validation_failure_still_recorded() {
        let processor = processor(Arc::new(EchoWorker));
        let err = processor
            .process_task(TaskRequest::new("", b"x".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(processor.task_metrics().len(), 1);
    }

    #[tokio::test]
    async fn test_task_metrics_are_bounded() {
        let mut config = ProcessorConfig::default();
        config.max_task_metrics = 3;
        let processor = TaskProcessor::new(
            Arc::new(EchoWorker),
            Vec::new(),
            Arc::new(MetricsCollector::disabled()),
            config,
        );
        for i in 0..5 {
            processor
                .process_task(TaskRequest::new(format!("t{}", i), b"x".to_vec()))
                .await
                .unwrap();
        }
        let ids: Vec<String> = processor.task_metrics().into_iter().map(|m| m.task_id).collect();
        assert_eq!(ids, vec!["t2", "t3", "t4"]);
        assert_eq!(processor.recent_task_metrics(1)[0].task_id, "t4");
    }

    #[tokio::test]
    async fn test_summary_and_collector_counters() {
        let collector = Arc::new(MetricsCollector::new(Default::default()));
        let processor = TaskProcessor::new(
            Arc::new(EchoWorker),
            Vec::new(),
            Arc::clone(&collector),
            ProcessorConfig::default(),
        );
        processor
            .process_task(TaskRequest::new("ok", b"abcd".to_vec()))
            .await
            .unwrap();
        let _ = processor.process_task(TaskRequest::new("bad", Vec::new())).await;

        let summary = processor.metrics_summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success_rate, 0.5);
        assert_eq!(summary.total_payload_bytes, 4);
        assert_eq!(summary.total_result_bytes, 4);

        assert_eq!(collector.counter_value("tasks_total"), Some(2.0));
        assert_eq!(collector.counter_value("tasks_failed_total"), Some(1.0));
        assert_eq!(collector.get_aggregation("payload_bytes").unwrap().count, 2);
    }
}
