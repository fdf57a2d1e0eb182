//! Performer Configuration Module
//!
//! Loads the runtime configuration from an optional TOML file with
//! `PERFORMER__SECTION__KEY` environment overrides, then validates it.
//! Invalid values fail startup rather than degrading silently.

use crate::defaults::{self, MIN_INTERVAL_MS};
use crate::error::{ConfigError, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main performer configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformerConfig {
    pub server: ServerConfig,
    pub health: HealthSettings,
    pub metrics: MetricsSettings,
    pub worker: WorkerSettings,
    pub logging: LoggingSettings,
}

/// RPC server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub task_timeout_ms: u64,
    /// Adds error source chains to RPC error bodies
    pub debug: bool,
    pub max_concurrent_tasks: usize,
    /// Installs a payload size limit stage when set
    pub max_payload_bytes: Option<usize>,
}

/// Health manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub check_interval_ms: u64,
    pub check_timeout_ms: u64,
    pub max_failures: u32,
    pub auto_recovery: bool,
    pub memory_threshold_mb: u64,
}

/// Metrics collector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub export_interval_ms: u64,
    pub retention_ms: u64,
    pub max_points: usize,
    /// Optional JSON-lines export file
    pub export_path: Option<PathBuf>,
}

/// How the worker adapter decodes payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    #[default]
    Auto,
    Raw,
    Json,
    Number,
}

/// Worker selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Built-in worker name (`echo`, `json-square`)
    pub kind: String,
    pub payload_mode: PayloadMode,
    /// Contract ABI JSON attached to the worker for call-data decoding
    pub abi_path: Option<PathBuf>,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::server::HOST.to_string(),
            port: defaults::server::PORT,
            task_timeout_ms: defaults::server::TASK_TIMEOUT_MS,
            debug: false,
            max_concurrent_tasks: defaults::server::MAX_CONCURRENT_TASKS,
            max_payload_bytes: None,
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: defaults::health::CHECK_INTERVAL_MS,
            check_timeout_ms: defaults::health::CHECK_TIMEOUT_MS,
            max_failures: defaults::health::MAX_FAILURES,
            auto_recovery: defaults::health::AUTO_RECOVERY,
            memory_threshold_mb: defaults::health::MEMORY_THRESHOLD_MB,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: defaults::metrics::ENABLED,
            export_interval_ms: defaults::metrics::EXPORT_INTERVAL_MS,
            retention_ms: defaults::metrics::RETENTION_MS,
            max_points: defaults::metrics::MAX_POINTS,
            export_path: None,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            kind: "echo".to_string(),
            payload_mode: PayloadMode::Auto,
            abi_path: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ServerConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl HealthSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

impl MetricsSettings {
    pub fn export_interval(&self) -> Duration {
        Duration::from_millis(self.export_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

impl PerformerConfig {
    /// Load from an optional file plus `PERFORMER__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, defaults::ENV_PREFIX)
    }

    /// Load with a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading performer config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: PerformerConfig = builder.build()?.try_deserialize()?;
        config.expand_paths()?;
        debug!("Loaded performer config: {:?}", config);
        Ok(config)
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "must be within 1-65535"));
        }

        let intervals = [
            ("server.task_timeout_ms", self.server.task_timeout_ms),
            ("health.check_interval_ms", self.health.check_interval_ms),
            ("health.check_timeout_ms", self.health.check_timeout_ms),
            ("metrics.export_interval_ms", self.metrics.export_interval_ms),
            ("metrics.retention_ms", self.metrics.retention_ms),
        ];
        for (field, value) in intervals {
            if value < MIN_INTERVAL_MS {
                return Err(ConfigError::invalid(
                    field,
                    format!("{}ms is below the {}ms minimum", value, MIN_INTERVAL_MS),
                ));
            }
        }

        if self.server.max_payload_bytes == Some(0) {
            return Err(ConfigError::invalid("server.max_payload_bytes", "must be at least 1"));
        }
        if self.health.max_failures == 0 {
            return Err(ConfigError::invalid("health.max_failures", "must be at least 1"));
        }
        if self.metrics.max_points == 0 {
            return Err(ConfigError::invalid("metrics.max_points", "must be at least 1"));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid("server.host", "must not be empty"));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Expand `$VAR` and `~` in path settings
    fn expand_paths(&mut self) -> Result<()> {
        if let Some(path) = &self.worker.abi_path {
            self.worker.abi_path = Some(expand_path("worker.abi_path", path)?);
        }
        if let Some(path) = &self.metrics.export_path {
            self.metrics.export_path = Some(expand_path("metrics.export_path", path)?);
        }
        Ok(())
    }
}

fn expand_path(field: &str, path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw).map_err(|e| ConfigError::Expand {
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Convenience function: load, then validate
pub fn load_config(path: Option<&Path>) -> Result<PerformerConfig> {
    let config = PerformerConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PerformerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.health.max_failures, 3);
        assert!(config.health.auto_recovery);
        assert_eq!(config.worker.payload_mode, PayloadMode::Auto);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("performer.toml");

        let config_content = r#"
[server]
port = 9090
debug = true
max_payload_bytes = 4096

[health]
max_failures = 5

[worker]
kind = "json-square"
payload_mode = "json"
"#;
        fs::write(&config_path, config_content).unwrap();

        let config =
            PerformerConfig::load_with_prefix(Some(&config_path), "PERFORMER_TEST_FILE").unwrap();
        assert_eq!(config.server.port, 9090);
        assert!(config.server.debug);
        assert_eq!(config.server.max_payload_bytes, Some(4096));
        assert_eq!(config.server.task_timeout_ms, defaults::server::TASK_TIMEOUT_MS);
        assert_eq!(config.health.max_failures, 5);
        assert_eq!(config.worker.kind, "json-square");
        assert_eq!(config.worker.payload_mode, PayloadMode::Json);
        config.validate().unwrap();
    }

    #[test]
    fn test_environment_override() {
        std::env::set_var("PERFORMER_TEST_ENV__SERVER__TASK_TIMEOUT_MS", "2500");
        std::env::set_var("PERFORMER_TEST_ENV__METRICS__ENABLED", "false");

        let config = PerformerConfig::load_with_prefix(None, "PERFORMER_TEST_ENV").unwrap();
        assert_eq!(config.server.task_timeout_ms, 2_500);
        assert!(!config.metrics.enabled);

        std::env::remove_var("PERFORMER_TEST_ENV__SERVER__TASK_TIMEOUT_MS");
        std::env::remove_var("PERFORMER_TEST_ENV__METRICS__ENABLED");
    }

    #[test]
    fn test_out_of_range_port_fails_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("performer.toml");
        fs::write(&config_path, "[server]\nport = 70000\n").unwrap();

        assert!(PerformerConfig::load_with_prefix(Some(&config_path), "PERFORMER_TEST_PORT").is_err());
    }

    #[test]
    fn test_validation_rejects_short_timeouts_and_zero_port() {
        let mut config = PerformerConfig::default();
        config.server.task_timeout_ms = 999;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.task_timeout_ms"));

        let mut config = PerformerConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = PerformerConfig::default();
        config.health.max_failures = 0;
        assert!(config.validate().is_err());

        let mut config = PerformerConfig::default();
        config.server.max_payload_bytes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            PerformerConfig::load_with_prefix(Some(&missing), "PERFORMER_TEST_MISSING"),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_renders_toml() {
        let rendered = PerformerConfig::default().to_toml_string().unwrap();
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("port = 8080"));
    }
}
