//! Process-wide performer status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Performer status levels
///
/// Exactly one value exists per process. It is owned by the health manager;
/// other components request transitions through its interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformerStatus {
    /// Process is initialising, not ready for tasks
    Starting,
    /// Idle and accepting tasks
    ReadyForTask,
    /// At least one task is executing
    Busy,
    /// Consecutive health-check failures reached the configured threshold
    Error,
    /// Shutting down, new tasks are rejected
    Stopping,
}

impl PerformerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformerStatus::Starting => "STARTING",
            PerformerStatus::ReadyForTask => "READY_FOR_TASK",
            PerformerStatus::Busy => "BUSY",
            PerformerStatus::Error => "ERROR",
            PerformerStatus::Stopping => "STOPPING",
        }
    }

    /// Whether new tasks may be admitted in this state
    pub fn accepts_tasks(&self) -> bool {
        matches!(
            self,
            PerformerStatus::ReadyForTask | PerformerStatus::Busy | PerformerStatus::Error
        )
    }
}

impl fmt::Display for PerformerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&PerformerStatus::ReadyForTask).unwrap();
        assert_eq!(json, "\"READY_FOR_TASK\"");
        let parsed: PerformerStatus = serde_json::from_str("\"BUSY\"").unwrap();
        assert_eq!(parsed, PerformerStatus::Busy);
        assert!(serde_json::from_str::<PerformerStatus>("\"ready\"").is_err());
    }

    #[test]
    fn test_stopping_rejects_tasks() {
        assert!(!PerformerStatus::Stopping.accepts_tasks());
        assert!(!PerformerStatus::Starting.accepts_tasks());
        assert!(PerformerStatus::Busy.accepts_tasks());
    }
}
