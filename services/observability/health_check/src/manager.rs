//! Health manager: provider aggregation and the process status state machine

use crate::memory;
use crate::provider::{HealthProvider, ProviderReport};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use performer_config::defaults::health::ERROR_LOG_CAPACITY;
use performer_config::HealthSettings;
use performer_types::{current_timestamp_ms, PerformerStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Health manager tuning
#[derive(Debug, Clone, PartialEq)]
pub struct HealthConfig {
    pub check_interval: Duration,
    pub check_timeout: Duration,
    pub max_failures: u32,
    pub auto_recovery: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self::from(&HealthSettings::default())
    }
}

impl From<&HealthSettings> for HealthConfig {
    fn from(settings: &HealthSettings) -> Self {
        Self {
            check_interval: settings.check_interval(),
            check_timeout: settings.check_timeout(),
            max_failures: settings.max_failures.max(1),
            auto_recovery: settings.auto_recovery,
        }
    }
}

/// Snapshot produced by each health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: PerformerStatus,
    pub healthy: bool,
    /// Unix milliseconds
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub memory_usage_bytes: u64,
    pub task_count: u64,
    pub last_task_time: Option<u64>,
    /// Failures observed by this check
    pub errors: Vec<String>,
    /// Per-provider reports keyed by provider name
    pub custom: Map<String, Value>,
}

#[derive(Debug)]
struct HealthState {
    status: PerformerStatus,
    consecutive_failures: u32,
    error_log: VecDeque<String>,
    last_result: Option<HealthCheckResult>,
    in_flight: usize,
    task_count: u64,
    last_task_time: Option<u64>,
}

impl HealthState {
    fn push_error(&mut self, message: String) {
        self.error_log.push_back(message);
        while self.error_log.len() > ERROR_LOG_CAPACITY {
            self.error_log.pop_front();
        }
    }
}

/// Owns the process-wide [`PerformerStatus`]
///
/// Other components read the status and report task boundaries through this
/// type; nothing else mutates the status cell.
pub struct HealthManager {
    config: HealthConfig,
    state: Mutex<HealthState>,
    providers: RwLock<Vec<Arc<dyn HealthProvider>>>,
    started_at: Instant,
    check_loop: Mutex<Option<JoinHandle<()>>>,
}

impl HealthManager {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HealthState {
                status: PerformerStatus::Starting,
                consecutive_failures: 0,
                error_log: VecDeque::with_capacity(ERROR_LOG_CAPACITY),
                last_result: None,
                in_flight: 0,
                task_count: 0,
                last_task_time: None,
            }),
            providers: RwLock::new(Vec::new()),
            started_at: Instant::now(),
            check_loop: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Register a provider, replacing any existing one with the same name
    pub fn add_provider(&self, provider: Arc<dyn HealthProvider>) {
        let mut providers = self.providers.write();
        if let Some(existing) = providers.iter_mut().find(|p| p.name() == provider.name()) {
            debug!("Replacing health provider '{}'", provider.name());
            *existing = provider;
        } else {
            debug!("Registered health provider '{}'", provider.name());
            providers.push(provider);
        }
    }

    /// Returns true if a provider with this name was registered
    pub fn remove_provider(&self, name: &str) -> bool {
        let mut providers = self.providers.write();
        let before = providers.len();
        providers.retain(|p| p.name() != name);
        providers.len() != before
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn status(&self) -> PerformerStatus {
        self.state.lock().status
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Rolling error log, oldest first
    pub fn errors(&self) -> Vec<String> {
        self.state.lock().error_log.iter().cloned().collect()
    }

    pub fn last_result(&self) -> Option<HealthCheckResult> {
        self.state.lock().last_result.clone()
    }

    pub fn task_count(&self) -> u64 {
        self.state.lock().task_count
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Append to the rolling error log without affecting the failure counter
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("Recording error: {}", message);
        self.state.lock().push_error(message);
    }

    /// Mark a task as started; `READY_FOR_TASK` becomes `BUSY`
    pub fn begin_task(&self) {
        let mut state = self.state.lock();
        state.in_flight += 1;
        if state.status == PerformerStatus::ReadyForTask {
            state.status = PerformerStatus::Busy;
        }
    }

    /// Mark a task as finished; `BUSY` returns to `READY_FOR_TASK` when the last one ends
    pub fn end_task(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.task_count += 1;
        state.last_task_time = Some(current_timestamp_ms());
        if state.in_flight == 0 && state.status == PerformerStatus::Busy {
            state.status = PerformerStatus::ReadyForTask;
        }
    }

    /// `STARTING -> READY_FOR_TASK` and spawn the periodic check loop
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.status == PerformerStatus::Starting {
                state.status = PerformerStatus::ReadyForTask;
            }
        }

        let mut check_loop = self.check_loop.lock();
        if check_loop.is_some() {
            return;
        }

        let manager = Arc::clone(self);
        let interval = self.config.check_interval;
        *check_loop = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if manager.status() == PerformerStatus::Stopping {
                    break;
                }
                manager.perform_health_check().await;
            }
        }));

        info!(
            "Health manager started (interval {:?}, timeout {:?}, max failures {})",
            self.config.check_interval, self.config.check_timeout, self.config.max_failures
        );
    }

    /// Any state `-> STOPPING`; halts the periodic loop
    pub fn stop(&self) {
        self.state.lock().status = PerformerStatus::Stopping;
        if let Some(handle) = self.check_loop.lock().take() {
            handle.abort();
        }
        info!("Health manager stopped");
    }

    /// Run every provider against the timeout and fold the outcome into the state machine
    pub async fn perform_health_check(&self) -> HealthCheckResult {
        let providers: Vec<Arc<dyn HealthProvider>> = self.providers.read().clone();
        let timeout = self.config.check_timeout;

        let outcomes = join_all(providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let outcome = tokio::time::timeout(timeout, provider.check()).await;
                (provider.name().to_string(), outcome)
            }
        }))
        .await;

        let mut errors = Vec::new();
        let mut custom = Map::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(Ok(report)) => {
                    if !report.healthy {
                        let message = report
                            .message
                            .clone()
                            .unwrap_or_else(|| "reported unhealthy".to_string());
                        errors.push(format!("{}: {}", name, message));
                    }
                    custom.insert(name, report_json(&report));
                }
                Ok(Err(e)) => {
                    let message = format!("{}: check failed: {:#}", name, e);
                    warn!("Health provider error: {}", message);
                    custom.insert(name, failure_json(&message));
                    errors.push(message);
                }
                Err(_) => {
                    let message = format!("{}: check timed out after {}ms", name, timeout.as_millis());
                    warn!("Health provider timeout: {}", message);
                    custom.insert(name, failure_json(&message));
                    errors.push(message);
                }
            }
        }

        let healthy = errors.is_empty();
        let memory_usage_bytes = memory::process_memory_bytes().unwrap_or(0);

        let mut state = self.state.lock();
        if healthy {
            state.consecutive_failures = 0;
            if state.status == PerformerStatus::Error && self.config.auto_recovery {
                info!("Health check passed, recovering from ERROR");
                state.status = if state.in_flight > 0 {
                    PerformerStatus::Busy
                } else {
                    PerformerStatus::ReadyForTask
                };
            }
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            for message in &errors {
                state.push_error(message.clone());
            }
            if state.consecutive_failures >= self.config.max_failures
                && state.status != PerformerStatus::Stopping
                && state.status != PerformerStatus::Error
            {
                error!(
                    "{} consecutive failed health checks, entering ERROR",
                    state.consecutive_failures
                );
                state.status = PerformerStatus::Error;
            }
        }

        let result = HealthCheckResult {
            status: if healthy {
                state.status
            } else {
                PerformerStatus::Error
            },
            healthy,
            timestamp: current_timestamp_ms(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            memory_usage_bytes,
            task_count: state.task_count,
            last_task_time: state.last_task_time,
            errors,
            custom,
        };
        state.last_result = Some(result.clone());
        result
    }
}

fn report_json(report: &ProviderReport) -> Value {
    json!({
        "healthy": report.healthy,
        "message": report.message,
        "details": report.details,
    })
}

fn failure_json(message: &str) -> Value {
    json!({
        "healthy": false,
        "message": message,
        "details": Value::Null,
    })
}
