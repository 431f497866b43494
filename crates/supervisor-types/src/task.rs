//! Scheduled tasks (§3 `ScheduledTask`, §4.4).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AgentId, ExecutionResult, SupervisorError, SupervisorResult};

/// Unique identifier for one [`ScheduledTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a fresh, random task id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A cron recipe bound to an agent (§3).
///
/// Fires only when `enabled && active` (§3, §8 property 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Unique task id.
    pub id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// The agent this task invokes.
    pub agent_id: AgentId,
    /// 6-field, seconds-precision cron expression.
    pub cron_expression: String,
    /// Administrative enable flag, set at creation/update time.
    pub enabled: bool,
    /// Runtime pause/resume flag, independent of `enabled`.
    pub active: bool,
    /// `key=value` input parameters passed to the agent on each tick.
    pub input_parameters: HashMap<String, String>,
    /// Maximum retries for each fired execution.
    pub max_retries: u32,
    /// Per-execution timeout, in seconds.
    pub timeout_secs: u64,
    /// Timestamp of the most recent tick, if any.
    pub last_execution: Option<DateTime<Utc>>,
    /// Timestamp of the next scheduled tick, if known.
    pub next_execution: Option<DateTime<Utc>>,
    /// Outcome of the most recent tick.
    pub last_result: Option<ExecutionResult>,
}

impl ScheduledTask {
    /// Whether this task should currently be registered for ticks.
    pub fn should_fire(&self) -> bool {
        self.enabled && self.active
    }

    /// Validate the task's own invariants (cron syntax is validated by the
    /// scheduler, which owns the cron parser).
    pub fn validate(&self) -> SupervisorResult<()> {
        if self.name.trim().is_empty() {
            return Err(SupervisorError::Validation("task name must not be empty".into()));
        }
        if self.cron_expression.trim().is_empty() {
            return Err(SupervisorError::Validation(
                "cron_expression must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Build the `key=value ` concatenated input string §4.4 specifies as
    /// the tick-time input contract.
    pub fn build_input_string(&self) -> String {
        let mut parts: Vec<String> = self
            .input_parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        parts.sort();
        parts.join(" ")
    }
}
