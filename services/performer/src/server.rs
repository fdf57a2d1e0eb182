//! Server facade binding the processor, health manager and metrics collector
//! to the `ExecuteTask` / `HealthCheck` / `StartSync` contract

use crate::diagnostics::DiagnosticsReport;
use crate::error::{RpcCode, RpcStatus};
use crate::pipeline::{PayloadSizeLimitStage, PipelineStage};
use crate::processor::{ProcessorConfig, TaskProcessor};
use crate::worker::Worker;
use crate::workers::EchoWorker;
use performer_config::PerformerConfig;
use performer_health::{
    HealthCheckResult, HealthConfig, HealthManager, HealthProvider, MemoryProvider, UptimeProvider,
};
use performer_metrics::{CollectorConfig, JsonLinesExporter, LogExporter, MetricsCollector, MetricsExporter};
use performer_types::{PerformerStatus, TaskRequest, TaskResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: PerformerStatus,
    /// Absent when the check itself failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<HealthCheckResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartSyncRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartSyncResponse {}

/// Assembles a [`PerformerServer`]
pub struct PerformerServerBuilder {
    config: PerformerConfig,
    worker: Option<Arc<dyn Worker>>,
    stages: Vec<Arc<dyn PipelineStage>>,
    providers: Vec<Arc<dyn HealthProvider>>,
    exporters: Vec<Arc<dyn MetricsExporter>>,
}

impl PerformerServerBuilder {
    pub fn worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Custom validation stage, run after request validation
    pub fn stage(mut self, stage: Arc<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Extra provider; replaces a built-in one with the same name
    pub fn provider(mut self, provider: Arc<dyn HealthProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn exporter(mut self, exporter: Arc<dyn MetricsExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    pub fn build(self) -> PerformerServer {
        let config = self.config;

        let health = Arc::new(HealthManager::new(HealthConfig::from(&config.health)));
        health.add_provider(Arc::new(MemoryProvider::new(config.health.memory_threshold_mb)));
        health.add_provider(Arc::new(UptimeProvider::new()));
        for provider in self.providers {
            health.add_provider(provider);
        }

        let metrics = Arc::new(MetricsCollector::new(CollectorConfig::from(&config.metrics)));
        metrics.add_exporter(Arc::new(LogExporter));
        if let Some(path) = &config.metrics.export_path {
            metrics.add_exporter(Arc::new(JsonLinesExporter::new(path.clone())));
        }
        for exporter in self.exporters {
            metrics.add_exporter(exporter);
        }

        let mut stages: Vec<Arc<dyn PipelineStage>> = Vec::with_capacity(self.stages.len() + 1);
        if let Some(max_bytes) = config.server.max_payload_bytes {
            stages.push(Arc::new(PayloadSizeLimitStage::new(max_bytes)));
        }
        stages.extend(self.stages);

        let worker = self.worker.unwrap_or_else(|| Arc::new(EchoWorker));
        let processor = Arc::new(TaskProcessor::new(
            worker,
            stages,
            Arc::clone(&metrics),
            ProcessorConfig::from(&config),
        ));

        PerformerServer {
            config,
            processor,
            health,
            metrics,
        }
    }
}

/// Decrements the in-flight count even if the call future is dropped
struct InFlight<'a>(&'a HealthManager);

impl<'a> InFlight<'a> {
    fn begin(health: &'a HealthManager) -> Self {
        health.begin_task();
        Self(health)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.end_task();
    }
}

pub struct PerformerServer {
    config: PerformerConfig,
    processor: Arc<TaskProcessor>,
    health: Arc<HealthManager>,
    metrics: Arc<MetricsCollector>,
}

impl PerformerServer {
    pub fn builder(config: PerformerConfig) -> PerformerServerBuilder {
        PerformerServerBuilder {
            config,
            worker: None,
            stages: Vec::new(),
            providers: Vec::new(),
            exporters: Vec::new(),
        }
    }

    pub fn config(&self) -> &PerformerConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<TaskProcessor> {
        &self.processor
    }

    pub fn health(&self) -> &Arc<HealthManager> {
        &self.health
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn status(&self) -> PerformerStatus {
        self.health.status()
    }

    /// Start the health and metrics loops; must run inside a Tokio runtime
    pub fn start(&self) {
        self.health.start();
        self.metrics.start();
        info!(
            "Performer ready: worker '{}', stages {:?}, timeout {}ms, max_concurrent_tasks {} (not enforced)",
            self.processor.worker().name(),
            self.processor.pipeline().stage_names(),
            self.config.server.task_timeout_ms,
            self.config.server.max_concurrent_tasks
        );
    }

    pub async fn execute_task(&self, request: TaskRequest) -> Result<TaskResponse, RpcStatus> {
        if self.health.status() == PerformerStatus::Stopping {
            return Err(RpcStatus::new(RpcCode::Unavailable, "Performer is shutting down"));
        }

        let task_id = request.task_id.clone();
        let outcome = {
            let _in_flight = InFlight::begin(&self.health);
            self.processor.process_task(request).await
        };

        outcome.map_err(|e| {
            self.health.record_error(format!("task {}: {}", task_id, e.root_message()));
            RpcStatus::from_error(&e, self.config.server.debug)
        })
    }

    /// Always answers; a failed check reports `ERROR`
    pub async fn health_check(&self, _request: HealthCheckRequest) -> HealthCheckResponse {
        let health = Arc::clone(&self.health);
        match tokio::spawn(async move { health.perform_health_check().await }).await {
            Ok(result) => HealthCheckResponse {
                status: result.status,
                result: Some(result),
            },
            Err(e) => {
                error!("Health check failed: {}", e);
                self.health.record_error(format!("health check failed: {}", e));
                HealthCheckResponse {
                    status: PerformerStatus::Error,
                    result: None,
                }
            }
        }
    }

    /// Acknowledged without action
    pub async fn start_sync(&self, _request: StartSyncRequest) -> StartSyncResponse {
        debug!("StartSync acknowledged");
        StartSyncResponse {}
    }

    pub fn diagnostics(&self) -> DiagnosticsReport {
        DiagnosticsReport::collect(self)
    }

    /// Enter `STOPPING`, flush metrics and stop the background loops
    pub async fn shutdown(&self) {
        info!("Performer shutting down");
        self.health.stop();
        let exported = self.metrics.flush().await;
        if exported == 0 && self.metrics.is_enabled() {
            warn!("Final metrics flush reached no exporter");
        }
        self.metrics.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::JsonSquareHandler;
    use crate::worker::CodecWorker;
    use performer_config::PayloadMode;

    fn server() -> PerformerServer {
        let worker = CodecWorker::new(Arc::new(JsonSquareHandler), PayloadMode::Auto);
        PerformerServer::builder(PerformerConfig::default())
            .worker(Arc::new(worker))
            .build()
    }

    #[tokio::test]
    async fn test_execute_task_restores_ready() {
        let server = server();
        server.start();

        let response = server
            .execute_task(TaskRequest::new("t1", br#"{"n":3}"#.to_vec()))
            .await
            .unwrap();
        assert_eq!(response.result, br#"{"result":9}"#);
        assert_eq!(server.status(), PerformerStatus::ReadyForTask);
        assert_eq!(server.health().task_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_maps_status_and_records_error() {
        let server = server();
        server.start();

        let status = server
            .execute_task(TaskRequest::new("t1", Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(status.code, RpcCode::InvalidArgument);
        assert!(status.details.is_none());
        assert_eq!(server.status(), PerformerStatus::ReadyForTask);
        assert!(server.health().errors()[0].starts_with("task t1:"));
    }

    #[tokio::test]
    async fn test_debug_mode_adds_details() {
        let mut config = PerformerConfig::default();
        config.server.debug = true;
        let server = PerformerServer::builder(config).build();
        server.start();

        let status = server
            .execute_task(TaskRequest::new("", b"x".to_vec()))
            .await
            .unwrap_err();
        assert!(status.details.unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn test_configured_payload_limit_installs_stage() {
        let mut config = PerformerConfig::default();
        config.server.max_payload_bytes = Some(4);
        let server = PerformerServer::builder(config).build();
        server.start();

        assert_eq!(
            server.processor().pipeline().stage_names(),
            vec!["request-validation", "payload-size-limit", "metrics-start"]
        );
        server
            .execute_task(TaskRequest::new("small", b"abcd".to_vec()))
            .await
            .unwrap();
        let status = server
            .execute_task(TaskRequest::new("big", b"abcde".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(status.code, RpcCode::InvalidArgument);
        assert!(status.message.contains("5 bytes exceeds the 4 byte limit"));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_tasks() {
        let server = server();
        server.start();
        server.shutdown().await;

        assert_eq!(server.status(), PerformerStatus::Stopping);
        let status = server
            .execute_task(TaskRequest::new("late", br#"{"n":1}"#.to_vec()))
            .await
            .unwrap_err();
        assert_eq!(status.code, RpcCode::Unavailable);
        assert_eq!(status.http_status(), 503);
    }

    #[tokio::test]
    async fn test_start_sync_and_health_check_answer() {
        let server = server();
        server.start();
        assert_eq!(server.start_sync(StartSyncRequest {}).await, StartSyncResponse {});

        let response = server.health_check(HealthCheckRequest {}).await;
        let result = response.result.unwrap();
        assert!(result.custom.contains_key("memory"));
        assert!(result.custom.contains_key("uptime"));
    }
}
