//! Default values and validation limits
//!
//! Shared by the config structs and by components that need a sensible
//! fallback when constructed without a loaded configuration (tests, embedding).

/// RPC server defaults
pub mod server {
    pub const HOST: &str = "0.0.0.0";

    pub const PORT: u16 = 8080;

    /// Per-task timeout (milliseconds)
    pub const TASK_TIMEOUT_MS: u64 = 30_000;

    /// Read and reported, not enforced by the runtime
    pub const MAX_CONCURRENT_TASKS: usize = 10;
}

/// Health manager defaults
pub mod health {
    pub const CHECK_INTERVAL_MS: u64 = 30_000;

    /// Bound on each provider call
    pub const CHECK_TIMEOUT_MS: u64 = 5_000;

    /// Consecutive failed checks before the status flips to ERROR
    pub const MAX_FAILURES: u32 = 3;

    pub const AUTO_RECOVERY: bool = true;

    /// Memory provider ceiling (MB)
    pub const MEMORY_THRESHOLD_MB: u64 = 1_024;

    /// Rolling error log capacity
    pub const ERROR_LOG_CAPACITY: usize = 10;
}

/// Metrics collector defaults
pub mod metrics {
    pub const ENABLED: bool = true;

    pub const EXPORT_INTERVAL_MS: u64 = 60_000;

    /// Points older than this are dropped by the cleanup pass (1 hour)
    pub const RETENTION_MS: u64 = 3_600_000;

    pub const MAX_POINTS: usize = 10_000;
}

/// Lower bound for every timeout and interval setting (milliseconds)
pub const MIN_INTERVAL_MS: u64 = 1_000;

/// Environment variable prefix, e.g. `PERFORMER__SERVER__PORT`
pub const ENV_PREFIX: &str = "PERFORMER";
