//! Built-in workers selectable from configuration

use crate::error::{PerformerError, Result};
use crate::worker::{CodecWorker, PayloadHandler, TaskInput, TaskOutput, Worker};
use anyhow::Context;
use async_trait::async_trait;
use performer_codec::AbiCodec;
use performer_config::WorkerSettings;
use performer_types::{TaskRequest, TaskResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Returns the payload unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoWorker;

#[async_trait]
impl Worker for EchoWorker {
    fn name(&self) -> &str {
        "echo"
    }

    async fn handle_task(&self, request: &TaskRequest) -> Result<TaskResponse> {
        Ok(TaskResponse::new(request.task_id.clone(), request.payload.clone()))
    }
}

/// `{"n": k}` -> `{"result": k*k}`; 8-byte numbers are squared in place
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSquareHandler;

impl JsonSquareHandler {
    fn operand(input: &TaskInput) -> Option<i64> {
        match input {
            TaskInput::Json(value) => value.get("n").and_then(|n| n.as_i64()),
            TaskInput::Number(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }
}

#[async_trait]
impl PayloadHandler for JsonSquareHandler {
    fn name(&self) -> &str {
        "json-square"
    }

    async fn validate(&self, task_id: &str, input: &TaskInput) -> Result<()> {
        if Self::operand(input).is_none() {
            return Err(PerformerError::validation(format!(
                "task {} expects {{\"n\": <integer>}}, got {} payload",
                task_id,
                input.kind()
            )));
        }
        Ok(())
    }

    async fn handle(&self, task_id: &str, input: TaskInput) -> Result<TaskOutput> {
        let n = Self::operand(&input)
            .ok_or_else(|| PerformerError::validation("missing integer field n"))?;
        let squared = n
            .checked_mul(n)
            .ok_or_else(|| PerformerError::execution(task_id, format!("{} squared overflows", n)))?;

        Ok(match input {
            TaskInput::Number(_) => TaskOutput::Number(squared as u64),
            _ => TaskOutput::Json(json!({ "result": squared })),
        })
    }
}

/// Worker names accepted by [`build_worker`]
pub const WORKER_KINDS: &[&str] = &["echo", "json-square"];

/// Instantiate the configured worker, attaching the ABI when one is configured
pub fn build_worker(settings: &WorkerSettings) -> anyhow::Result<Arc<dyn Worker>> {
    let abi = match &settings.abi_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read ABI file {:?}", path))?;
            let codec = AbiCodec::from_json(&raw)
                .with_context(|| format!("Failed to parse ABI file {:?}", path))?;
            info!("Loaded ABI with {} functions from {:?}", codec.functions().len(), path);
            Some(Arc::new(codec))
        }
        None => None,
    };

    let worker: Arc<dyn Worker> = match settings.kind.as_str() {
        "echo" => Arc::new(EchoWorker),
        "json-square" => {
            let mut worker = CodecWorker::new(Arc::new(JsonSquareHandler), settings.payload_mode);
            if let Some(abi) = abi {
                worker = worker.with_abi(abi);
            }
            Arc::new(worker)
        }
        other => anyhow::bail!(
            "Unknown worker '{}', expected one of: {}",
            other,
            WORKER_KINDS.join(", ")
        ),
    };

    info!("Using worker '{}' ({:?} payloads)", worker.name(), settings.payload_mode);
    Ok(worker)
}
