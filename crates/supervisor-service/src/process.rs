//! Process-lifecycle supervisor for `start`/`stop`/`restart` (§4.5, §8 S1).
//!
//! Distinct from C2: C2 runs one bounded invocation of an agent and records
//! its outcome; this module manages a long-lived child process per agent
//! and tracks its [`ProcessState`], the way the teacher workspace's process
//! manager tracked spawned agent handles, generalized from an in-process
//! task runtime to an OS child process supervised end-to-end by this crate.

use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use supervisor_registry::AgentRegistry;
use supervisor_types::{AgentId, AgentStatus, OperationResult, ProcessState, SupervisorError, SupervisorResult};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

struct ManagedProcess {
    status: AgentStatus,
    child: Option<Child>,
    running_since: Option<Instant>,
}

/// Tracks one long-lived child process per registered agent.
pub struct ProcessSupervisor {
    registry: Arc<AgentRegistry>,
    processes: DashMap<AgentId, ManagedProcess>,
}

impl ProcessSupervisor {
    /// Build a supervisor over the given agent registry.
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            processes: DashMap::new(),
        }
    }

    fn stopped_status(agent_id: &AgentId, name: &str) -> AgentStatus {
        AgentStatus {
            agent_id: agent_id.clone(),
            name: name.to_string(),
            state: ProcessState::Stopped,
            pid: 0,
            description: String::new(),
            uptime_seconds: 0,
            last_transition: Utc::now(),
        }
    }

    /// Current status of one agent; defaults to a fresh `Stopped` record if
    /// the agent has never been started.
    pub fn status(&self, agent_id: &AgentId) -> SupervisorResult<AgentStatus> {
        let config = self.registry.get(agent_id)?;
        let status = self
            .processes
            .get(agent_id)
            .map(|p| self.refreshed_status(&p))
            .unwrap_or_else(|| Self::stopped_status(agent_id, &config.name));
        Ok(status)
    }

    fn refreshed_status(&self, managed: &ManagedProcess) -> AgentStatus {
        let mut status = managed.status.clone();
        if status.state == ProcessState::Running {
            if let Some(since) = managed.running_since {
                status.uptime_seconds = since.elapsed().as_secs();
            }
        }
        status
    }

    /// Status of every registered agent.
    pub fn list(&self) -> SupervisorResult<Vec<AgentStatus>> {
        self.registry.list()?.into_iter().map(|c| self.status(&c.id)).collect()
    }

    /// Start the agent's process. Rejects with `Conflict` if already
    /// starting or running (§4.5 409 no-op rule).
    #[instrument(skip(self))]
    pub async fn start(&self, agent_id: &AgentId) -> SupervisorResult<OperationResult> {
        let started = Instant::now();
        let config = self.registry.get(agent_id)?;

        let previous_state = self
            .processes
            .get(agent_id)
            .map(|p| p.status.state)
            .unwrap_or(ProcessState::Stopped);
        if previous_state.is_already_running() {
            return Err(SupervisorError::Conflict(format!(
                "agent '{agent_id}' is already {previous_state:?}"
            )));
        }

        let mut command = Command::new(&config.executable_path);
        if let Some(dir) = &config.working_directory {
            command.current_dir(dir);
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }
        for (key, value) in &config.cli_args {
            command.arg(format!("--{key}"));
            command.arg(value);
        }
        command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let child = command.spawn().map_err(|e| {
            SupervisorError::Permanent(format!("failed to spawn '{}': {e}", config.executable_path.display()))
        })?;
        let pid = child.id().unwrap_or(0);

        self.processes.insert(
            agent_id.clone(),
            ManagedProcess {
                status: AgentStatus {
                    agent_id: agent_id.clone(),
                    name: config.name.clone(),
                    state: ProcessState::Starting,
                    pid,
                    description: String::new(),
                    uptime_seconds: 0,
                    last_transition: Utc::now(),
                },
                child: Some(child),
                running_since: None,
            },
        );

        info!(%agent_id, pid, "process started, settling");

        Ok(OperationResult {
            agent_id: agent_id.clone(),
            success: true,
            message: format!("transitioned {previous_state:?} -> Starting"),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Stop the agent's process. Rejects with `Conflict` if already in a
    /// terminal stopped state.
    #[instrument(skip(self))]
    pub async fn stop(&self, agent_id: &AgentId) -> SupervisorResult<OperationResult> {
        let started = Instant::now();
        self.registry.get(agent_id)?;

        let mut entry = self
            .processes
            .get_mut(agent_id)
            .ok_or_else(|| SupervisorError::Conflict(format!("agent '{agent_id}' is already stopped")))?;

        if entry.status.state.is_terminal_stopped() {
            return Err(SupervisorError::Conflict(format!(
                "agent '{agent_id}' is already {:?}",
                entry.status.state
            )));
        }

        let previous_state = entry.status.state;
        if let Some(mut child) = entry.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        entry.status.state = ProcessState::Stopped;
        entry.status.pid = 0;
        entry.status.uptime_seconds = 0;
        entry.status.last_transition = Utc::now();
        entry.running_since = None;

        info!(%agent_id, "process stopped");
        Ok(OperationResult {
            agent_id: agent_id.clone(),
            success: true,
            message: format!("transitioned {previous_state:?} -> Stopped"),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Restart: stop if currently running, then start.
    pub async fn restart(&self, agent_id: &AgentId) -> SupervisorResult<OperationResult> {
        let started = Instant::now();
        let currently_running = self
            .processes
            .get(agent_id)
            .map(|p| !p.status.state.is_terminal_stopped())
            .unwrap_or(false);

        if currently_running {
            self.stop(agent_id).await?;
        }
        let mut result = self.start(agent_id).await?;
        result.message = "restarted".to_string();
        result.duration_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Poll every tracked process for exit and for the `Starting` → `Running`
    /// settle window, transitioning state accordingly. Intended to be driven
    /// by a periodic background tick from `main`.
    pub fn reconcile(&self) {
        let mut to_update = Vec::new();
        for mut entry in self.processes.iter_mut() {
            let key = entry.key().clone();
            let exited = entry
                .child
                .as_mut()
                .map(|c| matches!(c.try_wait(), Ok(Some(_))))
                .unwrap_or(false);

            if exited {
                let exit_status = entry.child.as_mut().and_then(|c| c.try_wait().ok().flatten());
                let clean = exit_status.map(|s| s.success()).unwrap_or(false);
                let reached_running = entry.status.state == ProcessState::Running;
                entry.status.state = if clean {
                    ProcessState::Exited
                } else if reached_running {
                    ProcessState::Failed
                } else {
                    ProcessState::Fatal
                };
                entry.status.pid = 0;
                entry.status.last_transition = Utc::now();
                entry.running_since = None;
                entry.child = None;
                warn!(agent_id = %key, state = ?entry.status.state, "process exited");
                continue;
            }

            if entry.status.state == ProcessState::Starting {
                to_update.push(key);
            }
        }

        for key in to_update {
            if let Some(mut entry) = self.processes.get_mut(&key) {
                entry.status.state = ProcessState::Running;
                entry.status.last_transition = Utc::now();
                entry.running_since = Some(Instant::now());
            }
        }
    }
}
