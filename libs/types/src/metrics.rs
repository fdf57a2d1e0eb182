//! Per-task execution record

use serde::{Deserialize, Serialize};

/// Metrics accumulated over one task execution attempt.
///
/// Started by the pipeline's metrics stage, finalised by the processor, then
/// appended to the processor's list and never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub task_id: String,
    pub execution_id: String,
    /// Unix milliseconds
    pub start_time: u64,
    /// Unix milliseconds, set on finalisation
    pub end_time: Option<u64>,
    /// Milliseconds, set on finalisation
    pub duration_ms: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
    pub payload_size: usize,
    pub result_size: usize,
}

impl TaskMetrics {
    pub fn start(
        task_id: impl Into<String>,
        execution_id: impl Into<String>,
        start_time: u64,
        payload_size: usize,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            execution_id: execution_id.into(),
            start_time,
            end_time: None,
            duration_ms: None,
            success: false,
            error: None,
            payload_size,
            result_size: 0,
        }
    }

    /// Finalise as a success
    pub fn complete(mut self, end_time: u64, result_size: usize) -> Self {
        self.end_time = Some(end_time);
        self.duration_ms = Some(end_time.saturating_sub(self.start_time));
        self.success = true;
        self.result_size = result_size;
        self
    }

    /// Finalise as a failure
    pub fn fail(mut self, end_time: u64, error: impl Into<String>) -> Self {
        self.end_time = Some(end_time);
        self.duration_ms = Some(end_time.saturating_sub(self.start_time));
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_sets_duration_and_sizes() {
        let metrics = TaskMetrics::start("t1", "t1-1-abc", 1_000, 7).complete(1_250, 13);
        assert!(metrics.success);
        assert_eq!(metrics.duration_ms, Some(250));
        assert_eq!(metrics.payload_size, 7);
        assert_eq!(metrics.result_size, 13);
        assert!(metrics.error.is_none());
    }

    #[test]
    fn test_fail_records_error() {
        let metrics = TaskMetrics::start("t1", "t1-1-abc", 1_000, 7).fail(900, "boom");
        assert!(!metrics.success);
        // Clock went backwards: duration saturates instead of wrapping
        assert_eq!(metrics.duration_ms, Some(0));
        assert_eq!(metrics.error.as_deref(), Some("boom"));
    }
}
