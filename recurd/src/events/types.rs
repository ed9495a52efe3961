//! Per-iteration outcome records

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::TaskId;

/// Result of a single loop cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// One record per loop cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// When the cycle finished
    pub timestamp: DateTime<Utc>,
    pub task_id: TaskId,
    pub task_name: String,
    /// 1-based cycle number within the loop
    pub iteration: u64,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl IterationRecord {
    /// Record for a cycle that completed successfully
    pub fn success(task_id: TaskId, task_name: impl Into<String>, iteration: u64, duration: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            task_id,
            task_name: task_name.into(),
            iteration,
            outcome: Outcome::Success,
            error: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Record for a cycle that failed with `error`
    pub fn failure(
        task_id: TaskId,
        task_name: impl Into<String>,
        iteration: u64,
        duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            outcome: Outcome::Failure,
            error: Some(error.into()),
            ..Self::success(task_id, task_name, iteration, duration)
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }
}
