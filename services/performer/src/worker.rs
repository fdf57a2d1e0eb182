//! Worker contract and the codec-backed worker adapter

use crate::error::{PerformerError, Result};
use async_trait::async_trait;
use performer_codec::{
    AbiCodec, DecodedValue, JsonStrategy, NumberStrategy, PayloadAutoDecoder, PayloadValue,
    SerializationStrategy,
};
use performer_config::PayloadMode;
use performer_types::{TaskRequest, TaskResponse};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Byte-level task logic invoked by the processor
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Reject a request before any work starts
    async fn validate_task(&self, _request: &TaskRequest) -> Result<()> {
        Ok(())
    }

    async fn handle_task(&self, request: &TaskRequest) -> Result<TaskResponse>;
}

/// Decoded task payload
#[derive(Debug, Clone, PartialEq)]
pub enum TaskInput {
    Raw(Vec<u8>),
    Text(String),
    Json(Value),
    Number(u64),
    /// ABI call data whose selector matched a known function
    AbiCall {
        function: String,
        args: Map<String, Value>,
    },
}

impl TaskInput {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskInput::Raw(_) => "raw",
            TaskInput::Text(_) => "text",
            TaskInput::Json(_) => "json",
            TaskInput::Number(_) => "number",
            TaskInput::AbiCall { .. } => "abi",
        }
    }
}

/// Typed handler result; the variant picks the output encoding
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Raw(Vec<u8>),
    Text(String),
    Json(Value),
    /// 8-byte big-endian
    Number(u64),
    /// ABI-encoded return value of the called function
    Abi(Value),
}

/// Typed task logic, adapted to [`Worker`] by [`CodecWorker`]
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, _task_id: &str, _input: &TaskInput) -> Result<()> {
        Ok(())
    }

    async fn handle(&self, task_id: &str, input: TaskInput) -> Result<TaskOutput>;
}

/// Decodes payloads for a [`PayloadHandler`] and encodes its output
pub struct CodecWorker {
    handler: Arc<dyn PayloadHandler>,
    mode: PayloadMode,
    decoder: PayloadAutoDecoder,
}

impl CodecWorker {
    pub fn new(handler: Arc<dyn PayloadHandler>, mode: PayloadMode) -> Self {
        Self {
            handler,
            mode,
            decoder: PayloadAutoDecoder::new(),
        }
    }

    /// Attach a contract ABI so matching call data decodes to named arguments
    pub fn with_abi(mut self, abi: Arc<AbiCodec>) -> Self {
        self.decoder = PayloadAutoDecoder::with_abi(abi);
        self
    }

    pub fn mode(&self) -> PayloadMode {
        self.mode
    }

    pub fn abi(&self) -> Option<&Arc<AbiCodec>> {
        self.decoder.abi()
    }

    pub fn decode_input(&self, payload: &[u8]) -> Result<TaskInput> {
        let input = match self.mode {
            PayloadMode::Raw => TaskInput::Raw(payload.to_vec()),
            PayloadMode::Json => from_payload_value(JsonStrategy.deserialize(payload)?),
            PayloadMode::Number => from_payload_value(NumberStrategy.deserialize(payload)?),
            PayloadMode::Auto => self.auto_decode(payload)?,
        };
        debug!(handler = self.handler.name(), kind = input.kind(), "Decoded task payload");
        Ok(input)
    }

    fn auto_decode(&self, payload: &[u8]) -> Result<TaskInput> {
        let decoded = self.decoder.decode(payload);
        let value = match decoded.value {
            DecodedValue::Abi {
                function: Some(function),
                ..
            } => {
                let abi = self.decoder.abi().ok_or_else(|| {
                    PerformerError::validation("ABI payload detected without an attached codec")
                })?;
                let args = abi.decode_function_call(&function, payload)?;
                return Ok(TaskInput::AbiCall { function, args });
            }
            // Width heuristic only; reclassify without it
            DecodedValue::Abi { function: None, .. } => self.decoder.decode_non_abi(payload).value,
            other => other,
        };

        Ok(match value {
            DecodedValue::Json(json) => TaskInput::Json(json),
            DecodedValue::Text(text) => TaskInput::Text(text),
            DecodedValue::Raw(bytes) | DecodedValue::Abi { data: bytes, .. } => TaskInput::Raw(bytes),
        })
    }

    /// `function` is the called ABI function when the input was an ABI call
    pub fn encode_output(&self, function: Option<&str>, output: TaskOutput) -> Result<Vec<u8>> {
        match output {
            TaskOutput::Raw(bytes) => Ok(bytes),
            TaskOutput::Text(text) => Ok(text.into_bytes()),
            TaskOutput::Json(json) => Ok(JsonStrategy.serialize(&PayloadValue::Json(json))?),
            TaskOutput::Number(n) => Ok(NumberStrategy.serialize(&PayloadValue::Number(n))?),
            TaskOutput::Abi(value) => {
                let function = function.ok_or_else(|| {
                    PerformerError::validation("ABI output requires an ABI call input")
                })?;
                let abi = self.decoder.abi().ok_or_else(|| {
                    PerformerError::validation("ABI output requires an attached codec")
                })?;
                Ok(abi.encode_function_result(function, &value)?)
            }
        }
    }
}

fn from_payload_value(value: PayloadValue) -> TaskInput {
    match value {
        PayloadValue::Bytes(bytes) => TaskInput::Raw(bytes),
        PayloadValue::Text(text) => TaskInput::Text(text),
        PayloadValue::Json(json) => TaskInput::Json(json),
        PayloadValue::Number(n) => TaskInput::Number(n),
    }
}

#[async_trait]
impl Worker for CodecWorker {
    fn name(&self) -> &str {
        self.handler.name()
    }

    async fn validate_task(&self, request: &TaskRequest) -> Result<()> {
        let input = self.decode_input(&request.payload)?;
        self.handler.validate(&request.task_id, &input).await
    }

    async fn handle_task(&self, request: &TaskRequest) -> Result<TaskResponse> {
        let input = self.decode_input(&request.payload)?;
        let function = match &input {
            TaskInput::AbiCall { function, .. } => Some(function.clone()),
            _ => None,
        };
        let output = self.handler.handle(&request.task_id, input).await?;
        let result = self.encode_output(function.as_deref(), output)?;
        Ok(TaskResponse::new(request.task_id.clone(), result))
    }
}
