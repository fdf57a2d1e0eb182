//! # Performer Types
//!
//! Shared data model for the performer task-execution runtime.
//!
//! ## Contents
//!
//! - [`TaskRequest`] / [`TaskResponse`]: the request/response pair carried by the
//!   `ExecuteTask` RPC. Payloads are opaque bytes; their meaning is decided by the
//!   codec layer and the worker.
//! - [`PerformerStatus`]: the single process-wide status value driven by the
//!   health manager.
//! - [`TaskMetrics`]: the per-execution record appended by the task processor.
//! - [`time`]: wall-clock helpers that never panic on a skewed clock.
//!
//! These types are intentionally free of runtime dependencies so every crate in
//! the workspace (codec, health, metrics, performer) can share them.

pub mod metrics;
pub mod status;
pub mod task;
pub mod time;

pub use metrics::TaskMetrics;
pub use status::PerformerStatus;
pub use task::{payload_base64, TaskRequest, TaskResponse};
pub use time::{current_timestamp_ms, duration_to_ms, safe_system_timestamp_ms};
