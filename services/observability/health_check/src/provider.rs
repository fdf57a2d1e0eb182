//! Pluggable health providers

use crate::memory;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

/// Outcome of a single provider check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReport {
    pub healthy: bool,
    pub message: Option<String>,
    /// Provider-specific fields surfaced under `custom.<name>` in the snapshot
    pub details: Value,
}

impl ProviderReport {
    pub fn healthy(details: Value) -> Self {
        Self {
            healthy: true,
            message: None,
            details,
        }
    }

    pub fn unhealthy(message: impl Into<String>, details: Value) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
            details,
        }
    }
}

/// A named check contributing to overall process health
///
/// Returning `Err` counts as a failure of this provider only.
#[async_trait]
pub trait HealthProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> Result<ProviderReport>;
}

/// Unhealthy when resident memory exceeds a ceiling
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    threshold_mb: u64,
}

impl MemoryProvider {
    pub const NAME: &'static str = "memory";

    pub fn new(threshold_mb: u64) -> Self {
        Self { threshold_mb }
    }

    pub fn threshold_mb(&self) -> u64 {
        self.threshold_mb
    }

    /// Strictly above the ceiling
    pub fn exceeds(&self, used_bytes: u64) -> bool {
        used_bytes > self.threshold_mb.saturating_mul(1024 * 1024)
    }
}

#[async_trait]
impl HealthProvider for MemoryProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn check(&self) -> Result<ProviderReport> {
        let used_bytes = memory::process_memory_bytes().context("memory probe failed")?;
        let used_mb = used_bytes / (1024 * 1024);
        let details = json!({
            "used_bytes": used_bytes,
            "used_mb": used_mb,
            "threshold_mb": self.threshold_mb,
        });

        if self.exceeds(used_bytes) {
            Ok(ProviderReport::unhealthy(
                format!(
                    "memory usage {}MB exceeds {}MB threshold",
                    used_mb, self.threshold_mb
                ),
                details,
            ))
        } else {
            Ok(ProviderReport::healthy(details))
        }
    }
}

/// Always healthy; reports process uptime
#[derive(Debug, Clone)]
pub struct UptimeProvider {
    started_at: Instant,
}

impl UptimeProvider {
    pub const NAME: &'static str = "uptime";

    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn since(started_at: Instant) -> Self {
        Self { started_at }
    }
}

impl Default for UptimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProvider for UptimeProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn check(&self) -> Result<ProviderReport> {
        let uptime = self.started_at.elapsed();
        Ok(ProviderReport::healthy(json!({
            "uptime_seconds": uptime.as_secs(),
            "uptime_ms": uptime.as_millis() as u64,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_provider_zero_threshold_is_unhealthy() {
        let report = MemoryProvider::new(0).check().await.unwrap();
        assert!(!report.healthy);
        assert!(report.message.unwrap().contains("exceeds 0MB"));
        assert_eq!(report.details["threshold_mb"], 0);
    }

    #[test]
    fn test_memory_threshold_is_exclusive() {
        let provider = MemoryProvider::new(2);
        assert!(!provider.exceeds(2 * 1024 * 1024));
        assert!(provider.exceeds(2 * 1024 * 1024 + 1));
        assert!(!MemoryProvider::new(0).exceeds(0));
        assert!(MemoryProvider::new(0).exceeds(1));
    }

    #[tokio::test]
    async fn test_memory_provider_generous_threshold_is_healthy() {
        let report = MemoryProvider::new(1_000_000).check().await.unwrap();
        assert!(report.healthy);
        assert!(report.details["used_bytes"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_uptime_provider_always_healthy() {
        let provider = UptimeProvider::new();
        let report = provider.check().await.unwrap();
        assert!(report.healthy);
        assert!(report.details.get("uptime_seconds").is_some());
        assert_eq!(provider.name(), "uptime");
    }
}
