//! Ordered task-processing stages
//!
//! Stages run strictly in sequence. Cancellation is checked before each one,
//! and a failing stage aborts the rest with its name and elapsed time attached.

use crate::context::TaskContext;
use crate::error::{PerformerError, Result};
use async_trait::async_trait;
use performer_types::{duration_to_ms, TaskMetrics};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, Instrument};

/// Metadata key holding the in-progress [`TaskMetrics`]
pub const METRICS_KEY: &str = "metrics";

#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, ctx: &mut TaskContext) -> Result<()>;
}

/// Rejects requests with an empty task id or payload
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestValidationStage;

#[async_trait]
impl PipelineStage for RequestValidationStage {
    fn name(&self) -> &str {
        "request-validation"
    }

    async fn process(&self, ctx: &mut TaskContext) -> Result<()> {
        let request = ctx.request();
        if request.task_id.trim().is_empty() {
            return Err(PerformerError::validation("task_id must not be empty"));
        }
        if request.payload.is_empty() {
            return Err(PerformerError::validation(format!(
                "task {} has an empty payload",
                request.task_id
            )));
        }
        Ok(())
    }
}

/// Rejects payloads above a byte ceiling
#[derive(Debug, Clone, Copy)]
pub struct PayloadSizeLimitStage {
    max_bytes: usize,
}

impl PayloadSizeLimitStage {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl PipelineStage for PayloadSizeLimitStage {
    fn name(&self) -> &str {
        "payload-size-limit"
    }

    async fn process(&self, ctx: &mut TaskContext) -> Result<()> {
        let size = ctx.request().payload_size();
        if size > self.max_bytes {
            return Err(PerformerError::validation(format!(
                "payload of {} bytes exceeds the {} byte limit",
                size, self.max_bytes
            )));
        }
        Ok(())
    }
}

/// Snapshots start time and payload size into the context metadata
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsStartStage;

#[async_trait]
impl PipelineStage for MetricsStartStage {
    fn name(&self) -> &str {
        "metrics-start"
    }

    async fn process(&self, ctx: &mut TaskContext) -> Result<()> {
        let metrics = TaskMetrics::start(
            ctx.task_id(),
            ctx.execution_id(),
            ctx.start_time(),
            ctx.request().payload_size(),
        );
        ctx.put(METRICS_KEY, &metrics)
    }
}

#[derive(Clone, Default)]
pub struct TaskPipeline {
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl TaskPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request validation, then `custom` in order, then metrics-start if enabled
    pub fn standard(custom: Vec<Arc<dyn PipelineStage>>, metrics_enabled: bool) -> Self {
        let mut pipeline = Self::new().with_stage(Arc::new(RequestValidationStage));
        for stage in custom {
            pipeline.add_stage(stage);
        }
        if metrics_enabled {
            pipeline.add_stage(Arc::new(MetricsStartStage));
        }
        pipeline
    }

    pub fn with_stage(mut self, stage: Arc<dyn PipelineStage>) -> Self {
        self.add_stage(stage);
        self
    }

    pub fn add_stage(&mut self, stage: Arc<dyn PipelineStage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub async fn run(&self, ctx: &mut TaskContext) -> Result<()> {
        for stage in &self.stages {
            ctx.check_cancelled()?;

            let started = Instant::now();
            let span = ctx.span().clone();
            let outcome = stage.process(ctx).instrument(span).await;
            let elapsed_ms = duration_to_ms(started.elapsed());

            match outcome {
                Ok(()) => debug!(
                    task_id = %ctx.task_id(),
                    stage = stage.name(),
                    elapsed_ms,
                    "Stage complete"
                ),
                Err(e) => return Err(PerformerError::stage(stage.name(), elapsed_ms, e)),
            }
        }
        Ok(())
    }
}
