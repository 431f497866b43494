//! Process-lifecycle status for agents managed by the control plane (§4.5,
//! §8 S1). Distinct from [`crate::ExecutionState`]: that machine tracks one
//! invocation's idle→…→cleanup path through C2; this one tracks the
//! long-lived OS process a `start`/`stop`/`restart` command manages,
//! mirroring classic supervisord process states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AgentId;

/// Closed set of process-lifecycle states (§4.5, §8 S1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessState {
    /// Not running; pid is meaningless.
    Stopped,
    /// `start` accepted; process spawned, not yet confirmed settled.
    Starting,
    /// Confirmed running past its settle window.
    Running,
    /// `stop` accepted; shutdown in flight.
    Stopping,
    /// Exited with a non-zero code before reaching `Running`.
    Fatal,
    /// Exited with a non-zero code after having reached `Running`.
    Failed,
    /// Exited with a zero code.
    Exited,
}

impl ProcessState {
    /// Whether this is one of the §4.6 CLI `--wait` terminal-stopped states
    /// (`STOPPED, FATAL, FAILED, EXITED`).
    pub fn is_terminal_stopped(&self) -> bool {
        matches!(
            self,
            ProcessState::Stopped | ProcessState::Fatal | ProcessState::Failed | ProcessState::Exited
        )
    }

    /// Whether a `start` against a process in this state is a no-op
    /// (§4.5: "409 if the transition is a no-op (already running...)").
    pub fn is_already_running(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Running)
    }
}

/// Snapshot of one agent's process-lifecycle state (§4.5 "AgentStatus").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    /// The agent this status describes.
    pub agent_id: AgentId,
    /// Human-readable name, copied from the agent's configuration.
    pub name: String,
    /// Current process state.
    pub state: ProcessState,
    /// OS process id; `0` when not running.
    pub pid: u32,
    /// Free-form detail (e.g. exit code, last error).
    pub description: String,
    /// Seconds since the process last entered `Running`; `0` otherwise.
    pub uptime_seconds: u64,
    /// When `state` was last changed.
    pub last_transition: DateTime<Utc>,
}
