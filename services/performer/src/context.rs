//! Per-task execution context

use crate::error::{PerformerError, Result};
use performer_types::{current_timestamp_ms, TaskRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, Span};

#[derive(Debug, Default)]
struct SignalState {
    fired: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared between a context and its timer
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    state: Arc<SignalState>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.state.fired.swap(true, Ordering::SeqCst) {
            self.state.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.fired.load(Ordering::SeqCst)
    }

    /// Resolves once the signal fires
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Builds a [`TaskContext`] and arms its timeout
pub struct TaskContextBuilder {
    request: TaskRequest,
    timeout: Duration,
    parent: Option<Span>,
    metadata: HashMap<String, Value>,
}

impl TaskContextBuilder {
    pub fn new(request: TaskRequest) -> Self {
        Self {
            request,
            timeout: Duration::from_millis(performer_config::defaults::server::TASK_TIMEOUT_MS),
            parent: None,
            metadata: HashMap::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Nest the task span under `parent`
    pub fn parent_span(mut self, parent: Span) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Must be called inside a Tokio runtime; the timeout timer is a spawned task
    pub fn build(self) -> TaskContext {
        let start_time = current_timestamp_ms();
        let execution_id = generate_execution_id(&self.request.task_id, start_time);

        let span = match &self.parent {
            Some(parent) => info_span!(
                parent: parent,
                "task",
                task_id = %self.request.task_id,
                execution_id = %execution_id
            ),
            None => info_span!(
                "task",
                task_id = %self.request.task_id,
                execution_id = %execution_id
            ),
        };

        let cancellation = CancellationSignal::new();
        let timer = {
            let signal = cancellation.clone();
            let timeout = self.timeout;
            let task_id = self.request.task_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                debug!(task_id = %task_id, "Task timeout of {:?} reached, cancelling", timeout);
                signal.cancel();
            })
        };

        TaskContext {
            request: self.request,
            execution_id,
            start_time,
            started: Instant::now(),
            timeout: self.timeout,
            cancellation,
            span,
            metadata: self.metadata,
            timer: Some(timer),
        }
    }
}

/// Execution scope for one task attempt
///
/// Owned by the processor for the duration of a single RPC call. Dropping the
/// context disarms its timeout.
pub struct TaskContext {
    request: TaskRequest,
    execution_id: String,
    start_time: u64,
    started: Instant,
    timeout: Duration,
    cancellation: CancellationSignal,
    span: Span,
    metadata: HashMap<String, Value>,
    timer: Option<JoinHandle<()>>,
}

impl TaskContext {
    pub fn request(&self) -> &TaskRequest {
        &self.request
    }

    pub fn task_id(&self) -> &str {
        &self.request.task_id
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Unix milliseconds at construction
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Abort the task ahead of its timeout
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// `Cancelled` once the signal has fired
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PerformerError::cancelled(
                self.task_id(),
                format!(
                    "exceeded {}ms timeout after {}ms",
                    self.timeout.as_millis(),
                    self.elapsed().as_millis()
                ),
            ));
        }
        Ok(())
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn remove_metadata(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// Store a serializable value under `key`
    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| PerformerError::execution(self.task_id(), format!("metadata encode: {}", e)))?;
        self.metadata.insert(key.into(), value);
        Ok(())
    }

    /// Typed view of a metadata entry; `None` if absent or of another shape
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.metadata
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

fn generate_execution_id(task_id: &str, timestamp_ms: u64) -> String {
    format!("{}-{}-{:08x}", task_id, timestamp_ms, rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use performer_types::TaskMetrics;

    fn request(id: &str) -> TaskRequest {
        TaskRequest::new(id, b"payload".to_vec())
    }

    #[tokio::test]
    async fn test_execution_ids_are_unique() {
        let a = TaskContextBuilder::new(request("t1")).build();
        let b = TaskContextBuilder::new(request("t1")).build();
        assert!(a.execution_id().starts_with("t1-"));
        assert_ne!(a.execution_id(), b.execution_id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_cancellation() {
        let ctx = TaskContextBuilder::new(request("slow"))
            .timeout(Duration::from_millis(1_000))
            .build();
        assert!(ctx.check_cancelled().is_ok());

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert!(ctx.is_cancelled());
        let err = ctx.check_cancelled().unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("exceeded 1000ms timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_future_resolves() {
        let ctx = TaskContextBuilder::new(request("wait"))
            .timeout(Duration::from_millis(500))
            .build();
        let signal = ctx.cancellation().clone();
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("signal should fire before the outer timeout");
    }

    #[tokio::test]
    async fn test_manual_cancel() {
        let ctx = TaskContextBuilder::new(request("t2")).build();
        ctx.cancel();
        assert!(ctx.check_cancelled().is_err());
    }

    #[tokio::test]
    async fn test_typed_metadata() {
        let mut ctx = TaskContextBuilder::new(request("t3"))
            .metadata("source", Value::from("test"))
            .build();
        let metrics = TaskMetrics::start("t3", ctx.execution_id().to_string(), ctx.start_time(), 7);
        ctx.put("metrics", &metrics).unwrap();

        assert_eq!(ctx.get::<TaskMetrics>("metrics"), Some(metrics));
        assert_eq!(ctx.get_metadata("source"), Some(&Value::from("test")));
        assert!(ctx.get::<TaskMetrics>("source").is_none());
        assert!(ctx.remove_metadata("source").is_some());
    }
}
