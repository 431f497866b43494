//! Execution records and the state-transition invariant (§3, §8 property 1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AgentId, ErrorCategory, TaskId};

/// Unique identifier for one [`AgentExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    /// Generate a fresh, random execution id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The closed set of execution states (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Freshly created, not yet dispatched.
    Idle,
    /// Transitioning into the agent invocation.
    Starting,
    /// The agent invocation is in flight.
    Running,
    /// Terminal: the invocation returned success.
    Completed,
    /// Terminal: the invocation returned an error classified as permanent,
    /// or transient retries were exhausted.
    Failed,
    /// Terminal: the per-execution deadline elapsed while running.
    Timeout,
    /// Terminal: an explicit cancel request was honored.
    Cancelled,
    /// Terminal housekeeping state entered from any other terminal state.
    Cleanup,
}

impl ExecutionState {
    /// True if this state is one of the terminal states
    /// `{completed, failed, timeout, cancelled, cleanup}`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed
                | ExecutionState::Failed
                | ExecutionState::Timeout
                | ExecutionState::Cancelled
                | ExecutionState::Cleanup
        )
    }

    /// Validate an edge against the §3 state-transition table. The only
    /// legal edges are:
    ///
    /// ```text
    /// idle -> starting
    /// starting -> {running, failed}
    /// running -> {completed, failed, timeout, cancelled}
    /// completed -> cleanup
    /// failed -> {cleanup, starting}
    /// timeout -> cleanup
    /// cancelled -> cleanup
    /// cleanup -> idle
    /// ```
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Timeout)
                | (Running, Cancelled)
                | (Completed, Cleanup)
                | (Failed, Cleanup)
                | (Failed, Starting)
                | (Timeout, Cleanup)
                | (Cancelled, Cleanup)
                | (Cleanup, Idle)
        )
    }
}

/// Point-in-time resource-usage snapshot for one execution (§3, §4.2).
///
/// Fields are `None` rather than a fabricated zero when the host does not
/// expose the corresponding metric — per §4.2, "derived placeholder values
/// are acceptable... never fabricate zeroes as observations, mark them
/// missing".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU utilization percentage observed during the window.
    pub cpu_percent: Option<f64>,
    /// Resident memory in megabytes at snapshot time.
    pub memory_mb: Option<f64>,
    /// Peak resident memory observed during the window.
    pub peak_memory_mb: Option<f64>,
    /// Cumulative disk I/O in bytes during the window.
    pub disk_io_bytes: Option<u64>,
    /// Cumulative network I/O in bytes during the window.
    pub net_io_bytes: Option<u64>,
    /// Window start (recorded at entry to `running`).
    pub window_start: Option<DateTime<Utc>>,
    /// Window end (recorded at state finalization).
    pub window_end: Option<DateTime<Utc>>,
}

/// One attempt at running an agent (§3 `AgentExecution`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    /// Unique execution id.
    pub id: ExecutionId,
    /// The agent this execution belongs to.
    pub agent_id: AgentId,
    /// Scheduler-origin task id, if this execution was triggered by a tick.
    pub task_id: Option<TaskId>,
    /// Current state.
    pub state: ExecutionState,
    /// Previous state, for audit/debugging.
    pub previous_state: Option<ExecutionState>,
    /// Timestamp of the most recent state transition.
    pub last_state_change: DateTime<Utc>,
    /// Wall-clock start of the most recent `running` attempt.
    pub start_time: Option<DateTime<Utc>>,
    /// Wall-clock end, set once the execution reaches a terminal state.
    pub end_time: Option<DateTime<Utc>>,
    /// Sanitized input, as stored/logged (§7). The unsanitized copy is never
    /// persisted.
    pub input: String,
    /// OS process id of the spawned agent, if applicable.
    pub process_id: Option<u32>,
    /// Process exit code, once available.
    pub exit_code: Option<i32>,
    /// Sanitized error message, if the most recent attempt failed.
    pub error_message: Option<String>,
    /// Classification of `error_message`.
    pub error_category: Option<ErrorCategory>,
    /// Number of attempts made so far, counting the initial attempt (§9
    /// Open Question i: `retry_count` is "total attempts made").
    pub retry_count: u32,
    /// Maximum attempts permitted (not counting the fact that the first
    /// attempt always runs): retries stop once `retry_count == max_retries`.
    pub max_retries: u32,
    /// Most recent resource-usage snapshot.
    pub resource_usage: Option<ResourceUsage>,
}

impl AgentExecution {
    /// Create a fresh execution in the `idle` state (§4.2).
    pub fn new(agent_id: AgentId, task_id: Option<TaskId>, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::new(),
            agent_id,
            task_id,
            state: ExecutionState::Idle,
            previous_state: None,
            last_state_change: now,
            start_time: None,
            end_time: None,
            input: String::new(),
            process_id: None,
            exit_code: None,
            error_message: None,
            error_category: None,
            retry_count: 0,
            max_retries,
            resource_usage: None,
        }
    }

    /// Attempt a transition, enforcing the §3 state-transition invariant.
    pub fn transition_to(&mut self, next: ExecutionState) -> Result<(), crate::SupervisorError> {
        if !self.state.can_transition_to(next) {
            return Err(crate::SupervisorError::Conflict(format!(
                "invalid state transition: {:?} -> {:?}",
                self.state, next
            )));
        }
        self.previous_state = Some(self.state);
        self.state = next;
        self.last_state_change = Utc::now();
        if next == ExecutionState::Running && self.start_time.is_none() {
            self.start_time = Some(self.last_state_change);
        }
        if next.is_terminal() {
            self.end_time = Some(self.last_state_change);
        }
        Ok(())
    }
}

/// One recorded state-transition, used in [`ExecutionResult::state_transitions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// State transitioned from.
    pub from: ExecutionState,
    /// State transitioned to.
    pub to: ExecutionState,
    /// When the transition occurred.
    pub at: DateTime<Utc>,
}

/// Coarse outcome of a completed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The execution completed successfully.
    Success,
    /// The execution failed (permanently, or after exhausting retries).
    Failure,
    /// The execution's deadline elapsed.
    Timeout,
    /// The execution was cancelled.
    Cancelled,
}

/// Derived summary of a terminated execution (§3 `ExecutionResult`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The execution this result summarizes.
    pub execution_id: ExecutionId,
    /// The agent that was invoked.
    pub agent_id: AgentId,
    /// Coarse status.
    pub status: ExecutionStatus,
    /// Sanitized input.
    pub input: String,
    /// Sanitized output, if the agent produced any before terminating.
    pub output: Option<String>,
    /// Wall-clock duration of the whole execution (all retries), in ms.
    pub duration_ms: u64,
    /// Chronological log of state transitions.
    pub state_transitions: Vec<StateTransition>,
}

impl ExecutionStatus {
    /// Map a terminal [`ExecutionState`] to the coarse [`ExecutionStatus`].
    /// Returns `None` for non-terminal states.
    pub fn from_terminal_state(state: ExecutionState) -> Option<Self> {
        match state {
            ExecutionState::Completed => Some(ExecutionStatus::Success),
            ExecutionState::Failed => Some(ExecutionStatus::Failure),
            ExecutionState::Timeout => Some(ExecutionStatus::Timeout),
            ExecutionState::Cancelled => Some(ExecutionStatus::Cancelled),
            ExecutionState::Cleanup | ExecutionState::Idle | ExecutionState::Starting | ExecutionState::Running => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path_transition_sequence_is_legal() {
        let mut exec = AgentExecution::new(AgentId::from("a"), None, 3);
        assert!(exec.transition_to(ExecutionState::Starting).is_ok());
        assert!(exec.transition_to(ExecutionState::Running).is_ok());
        assert!(exec.transition_to(ExecutionState::Completed).is_ok());
        assert!(exec.transition_to(ExecutionState::Cleanup).is_ok());
        assert!(exec.transition_to(ExecutionState::Idle).is_ok());
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut exec = AgentExecution::new(AgentId::from("a"), None, 3);
        assert!(exec.transition_to(ExecutionState::Running).is_err());
    }

    #[test]
    fn failed_can_retry_via_starting() {
        let mut exec = AgentExecution::new(AgentId::from("a"), None, 3);
        exec.transition_to(ExecutionState::Starting).unwrap();
        exec.transition_to(ExecutionState::Running).unwrap();
        exec.transition_to(ExecutionState::Failed).unwrap();
        assert!(exec.transition_to(ExecutionState::Starting).is_ok());
    }

    #[test]
    fn terminal_states_set_end_time() {
        let mut exec = AgentExecution::new(AgentId::from("a"), None, 3);
        exec.transition_to(ExecutionState::Starting).unwrap();
        exec.transition_to(ExecutionState::Running).unwrap();
        assert!(exec.end_time.is_none());
        exec.transition_to(ExecutionState::Cancelled).unwrap();
        assert!(exec.end_time.is_some());
    }

    proptest::proptest! {
        #[test]
        fn cleanup_is_always_reachable_from_any_terminal_state(
            terminal_idx in 0..4usize,
        ) {
            let terminals = [
                ExecutionState::Completed,
                ExecutionState::Failed,
                ExecutionState::Timeout,
                ExecutionState::Cancelled,
            ];
            let terminal = terminals[terminal_idx];
            proptest::prop_assert!(terminal.can_transition_to(ExecutionState::Cleanup));
        }
    }
}
