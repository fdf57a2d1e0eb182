//! # Performer Health Manager
//!
//! Aggregates pluggable health providers into the single process-wide
//! [`PerformerStatus`](performer_types::PerformerStatus) and exposes the latest
//! snapshot.
//!
//! ## State machine
//!
//! - `STARTING -> READY_FOR_TASK` on [`HealthManager::start`]
//! - `READY_FOR_TASK <-> BUSY` while tasks are in flight
//! - any state `-> ERROR` after `max_failures` consecutive failed checks
//! - `ERROR -> READY_FOR_TASK` on the next passing check when auto-recovery is on
//! - any state `-> STOPPING` on [`HealthManager::stop`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use performer_health::{HealthConfig, HealthManager, MemoryProvider, UptimeProvider};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = Arc::new(HealthManager::new(HealthConfig::default()));
//! manager.add_provider(Arc::new(MemoryProvider::new(1024)));
//! manager.add_provider(Arc::new(UptimeProvider::new()));
//! manager.start();
//!
//! let snapshot = manager.perform_health_check().await;
//! println!("{} ({} errors)", snapshot.status, snapshot.errors.len());
//! # }
//! ```

pub mod manager;
pub mod memory;
pub mod provider;

pub use manager::{HealthCheckResult, HealthConfig, HealthManager};
pub use memory::{process_memory_bytes, process_memory_mb};
pub use provider::{HealthProvider, MemoryProvider, ProviderReport, UptimeProvider};
