//! # Performer Configuration
//!
//! Centralized configuration for the performer runtime: bind address, per-task
//! timeout, debug flag, health-check cadence and thresholds, metrics export and
//! retention, worker selection and logging.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use performer_config::load_config;
//!
//! // Optional file, then PERFORMER__SECTION__KEY overrides, then validation
//! let config = load_config(None).expect("invalid configuration");
//! println!("binding {}", config.server.bind_address());
//! ```

pub mod defaults;
pub mod error;
pub mod performer_config;

pub use error::{ConfigError, Result};
pub use performer_config::{
    load_config, HealthSettings, LoggingSettings, MetricsSettings, PayloadMode, PerformerConfig,
    ServerConfig, WorkerSettings,
};
