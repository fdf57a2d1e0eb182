//! # Performer
//!
//! Task-execution runtime behind the `ExecuteTask` / `HealthCheck` /
//! `StartSync` RPC contract.
//!
//! ## Request flow
//!
//! ```text
//! http -> PerformerServer -> TaskProcessor -> TaskPipeline (validation, custom, metrics-start)
//!                                          -> Worker::validate_task -> Worker::handle_task
//!                                          -> response shape check -> TaskMetrics
//! ```
//!
//! Workers either implement [`Worker`] directly over bytes or implement
//! [`PayloadHandler`] and let [`CodecWorker`] decode payloads (auto-detected
//! JSON / text / raw, fixed strategies, or ABI call data when a contract ABI is
//! attached).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use performer::{http, PerformerServer};
//! use performer::workers::build_worker;
//! use performer_config::load_config;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = load_config(None)?;
//! let worker = build_worker(&config.worker)?;
//! let addr = config.server.bind_address().parse()?;
//!
//! let server = Arc::new(PerformerServer::builder(config).worker(worker).build());
//! server.start();
//! http::serve(Arc::clone(&server), addr, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod server;
pub mod worker;
pub mod workers;

pub use context::{CancellationSignal, TaskContext, TaskContextBuilder};
pub use diagnostics::DiagnosticsReport;
pub use error::{ErrorKind, PerformerError, Result, RpcCode, RpcStatus};
pub use pipeline::{
    MetricsStartStage, PayloadSizeLimitStage, PipelineStage, RequestValidationStage, TaskPipeline,
};
pub use processor::{ProcessorConfig, TaskMetricsSummary, TaskProcessor};
pub use server::{
    HealthCheckRequest, HealthCheckResponse, PerformerServer, PerformerServerBuilder,
    StartSyncRequest, StartSyncResponse,
};
pub use worker::{CodecWorker, PayloadHandler, TaskInput, TaskOutput, Worker};
