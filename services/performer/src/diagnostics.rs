//! Operator-facing diagnostics report

use crate::processor::TaskMetricsSummary;
use crate::server::PerformerServer;
use performer_health::{process_memory_bytes, HealthCheckResult};
use performer_types::{current_timestamp_ms, PerformerStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use sysinfo::System;

/// Errors included in a report
pub const RECENT_ERROR_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub host_name: String,
    pub cpu_count: usize,
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    pub process_memory_bytes: u64,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut system = System::new_all();
        system.refresh_all();

        Self {
            os_name: System::name().unwrap_or_default(),
            os_version: System::os_version().unwrap_or_default(),
            kernel_version: System::kernel_version().unwrap_or_default(),
            host_name: System::host_name().unwrap_or_default(),
            cpu_count: system.cpus().len(),
            total_memory_bytes: system.total_memory(),
            used_memory_bytes: system.used_memory(),
            process_memory_bytes: process_memory_bytes().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub generated_at: u64,
    pub version: String,
    pub status: PerformerStatus,
    pub uptime_seconds: u64,
    pub worker: String,
    pub system: SystemInfo,
    pub performance: TaskMetricsSummary,
    pub counters: BTreeMap<String, f64>,
    pub last_health_check: Option<HealthCheckResult>,
    /// Oldest first
    pub recent_errors: Vec<String>,
}

impl DiagnosticsReport {
    pub fn collect(server: &PerformerServer) -> Self {
        let health = server.health();
        let errors = health.errors();
        let skip = errors.len().saturating_sub(RECENT_ERROR_LIMIT);

        Self {
            generated_at: current_timestamp_ms(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: health.status(),
            uptime_seconds: health.uptime().as_secs(),
            worker: server.processor().worker().name().to_string(),
            system: SystemInfo::collect(),
            performance: server.processor().metrics_summary(),
            counters: server.metrics().snapshot().counters,
            last_health_check: health.last_result(),
            recent_errors: errors.into_iter().skip(skip).collect(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Performer Diagnostics ===");
        let _ = writeln!(out, "Generated:  {} (unix ms)", self.generated_at);
        let _ = writeln!(out, "Version:    {}", self.version);
        let _ = writeln!(out, "Status:     {}", self.status);
        let _ = writeln!(out, "Uptime:     {}s", self.uptime_seconds);
        let _ = writeln!(out, "Worker:     {}", self.worker);

        let sys = &self.system;
        let _ = writeln!(out, "\n--- System ---");
        let _ = writeln!(out, "OS:         {} {}", sys.os_name, sys.os_version);
        let _ = writeln!(out, "Kernel:     {}", sys.kernel_version);
        let _ = writeln!(out, "Host:       {}", sys.host_name);
        let _ = writeln!(out, "CPUs:       {}", sys.cpu_count);
        let _ = writeln!(
            out,
            "Memory:     {} / {} MB used",
            sys.used_memory_bytes / MB,
            sys.total_memory_bytes / MB
        );
        let _ = writeln!(out, "Process:    {} MB resident", sys.process_memory_bytes / MB);

        let perf = &self.performance;
        let _ = writeln!(out, "\n--- Performance ---");
        let _ = writeln!(
            out,
            "Tasks:      {} total, {} ok, {} failed ({:.1}% success)",
            perf.total,
            perf.succeeded,
            perf.failed,
            perf.success_rate * 100.0
        );
        let _ = writeln!(
            out,
            "Duration:   avg {:.1}ms, p95 {:.1}ms",
            perf.avg_duration_ms, perf.p95_duration_ms
        );
        let _ = writeln!(
            out,
            "Bytes:      {} in, {} out",
            perf.total_payload_bytes, perf.total_result_bytes
        );
        for (name, value) in &self.counters {
            let _ = writeln!(out, "  {} = {}", name, value);
        }

        let _ = writeln!(out, "\n--- Health ---");
        match &self.last_health_check {
            Some(check) => {
                let _ = writeln!(
                    out,
                    "Last check: {} at {} ({})",
                    check.status,
                    check.timestamp,
                    if check.healthy { "healthy" } else { "unhealthy" }
                );
                for (provider, report) in &check.custom {
                    let healthy = report.get("healthy").and_then(|v| v.as_bool()).unwrap_or(false);
                    let _ = writeln!(
                        out,
                        "  {:<10} {}",
                        provider,
                        if healthy { "ok" } else { "FAILING" }
                    );
                }
            }
            None => {
                let _ = writeln!(out, "Last check: none yet");
            }
        }

        let _ = writeln!(out, "\n--- Recent errors ({}) ---", self.recent_errors.len());
        if self.recent_errors.is_empty() {
            let _ = writeln!(out, "none");
        }
        for error in &self.recent_errors {
            let _ = writeln!(out, "- {}", error);
        }
        out
    }
}

const MB: u64 = 1024 * 1024;
