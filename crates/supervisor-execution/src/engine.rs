//! The execution engine proper (§4.2).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use supervisor_types::{
    classify_error_message, sanitize, AgentExecution, AgentId, ErrorCategory, ExecutionId,
    ExecutionResult, ExecutionState, ExecutionStatus, IAgent, ResourceUsage, StateTransition,
    SupervisorError, SupervisorResult, TaskId,
};
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

/// Default retry budget for a freshly created execution (§4.2).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Minimum and per-attempt unit of the linear retry backoff (§4.2).
const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Most-recent executions kept per agent before older ones are evicted
/// (§9 Open Question iii).
pub const DEFAULT_RETENTION_PER_AGENT: usize = 100;

/// Per-invocation parameters supplied by the caller (scheduler or control
/// plane) that the engine itself does not own.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Wall-clock deadline for one attempt; the agent's configured timeout.
    pub timeout: Duration,
    /// Scheduler-origin task id, if this run was triggered by a tick.
    pub task_id: Option<TaskId>,
    /// Retry budget for this invocation.
    pub max_retries: u32,
}

impl ExecutionContext {
    /// Build a context with no originating task (an ad-hoc or CLI-driven run).
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, task_id: None, max_retries: DEFAULT_MAX_RETRIES }
    }

    /// Attach the scheduler task id that triggered this execution.
    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Override the default retry budget, e.g. from a [`ScheduledTask`]'s
    /// own `max_retries`.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

enum Attempt {
    Success(String),
    Error(SupervisorError),
    TimedOut,
    Cancelled,
}

/// The execution engine: owns every [`AgentExecution`] record and its
/// derived [`ExecutionResult`], indexed by execution id and by agent id.
pub struct ExecutionEngine {
    executions: DashMap<ExecutionId, AgentExecution>,
    results: DashMap<ExecutionId, ExecutionResult>,
    by_agent: DashMap<AgentId, Vec<ExecutionId>>,
    cancellations: DashMap<ExecutionId, Arc<Notify>>,
    retention_per_agent: usize,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    /// Build an engine with the default per-agent retention.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION_PER_AGENT)
    }

    /// Build an engine with an explicit per-agent retention bound.
    pub fn with_retention(retention_per_agent: usize) -> Self {
        Self {
            executions: DashMap::new(),
            results: DashMap::new(),
            by_agent: DashMap::new(),
            cancellations: DashMap::new(),
            retention_per_agent,
        }
    }

    /// Run one invocation of `agent` with `input` through the full
    /// idle→starting→running→terminal lifecycle, retrying transient
    /// failures (§4.2, §7).
    #[instrument(skip(self, agent, input, ctx), fields(agent_id = %agent.get_id()))]
    pub async fn execute(
        &self,
        ctx: ExecutionContext,
        agent: Arc<dyn IAgent>,
        input: &str,
    ) -> SupervisorResult<AgentExecution> {
        let mut exec = AgentExecution::new(agent.get_id().clone(), ctx.task_id, ctx.max_retries);
        exec.input = sanitize(input);
        let execution_id = exec.id;

        let cancel_signal = Arc::new(Notify::new());
        self.cancellations.insert(execution_id, cancel_signal.clone());

        let mut transitions = Vec::new();
        self.transition(&mut exec, ExecutionState::Starting, &mut transitions)?;
        self.store(exec.clone());
        self.index(execution_id, agent.get_id().clone());

        let overall_start = Instant::now();
        let mut window_start: Option<chrono::DateTime<Utc>> = None;

        let outcome = loop {
            self.transition(&mut exec, ExecutionState::Running, &mut transitions)?;
            if window_start.is_none() {
                window_start = exec.start_time;
            }
            self.store(exec.clone());

            let attempt = run_one_attempt(agent.as_ref(), input, ctx.timeout, &cancel_signal).await;

            match attempt {
                Attempt::Success(output) => {
                    exec.retry_count += 1;
                    exec.error_message = None;
                    exec.error_category = None;
                    self.transition(&mut exec, ExecutionState::Completed, &mut transitions)?;
                    self.finish(&mut exec, window_start);
                    break self.finalize(
                        &mut exec,
                        &transitions,
                        overall_start,
                        Some(sanitize(&output)),
                    );
                }
                Attempt::Cancelled => {
                    self.transition(&mut exec, ExecutionState::Cancelled, &mut transitions)?;
                    self.finish(&mut exec, window_start);
                    break self.finalize(&mut exec, &transitions, overall_start, None);
                }
                Attempt::TimedOut => {
                    exec.error_category = Some(ErrorCategory::Transient);
                    exec.error_message = Some("execution exceeded its deadline".into());
                    self.transition(&mut exec, ExecutionState::Timeout, &mut transitions)?;
                    self.finish(&mut exec, window_start);
                    break self.finalize(&mut exec, &transitions, overall_start, None);
                }
                Attempt::Error(err) => {
                    let message = sanitize(&err.to_string());
                    let category = classify_error_message(&message);
                    exec.error_message = Some(message.clone());
                    exec.error_category = Some(category);
                    exec.retry_count += 1;

                    if category == ErrorCategory::Transient && exec.retry_count < exec.max_retries {
                        warn!(
                            %execution_id,
                            attempt = exec.retry_count,
                            "transient failure, retrying"
                        );
                        self.store(exec.clone());
                        let backoff = BASE_BACKOFF * exec.retry_count;
                        tokio::time::sleep(backoff).await;
                        self.transition(&mut exec, ExecutionState::Failed, &mut transitions)?;
                        self.transition(&mut exec, ExecutionState::Starting, &mut transitions)?;
                        continue;
                    }

                    self.transition(&mut exec, ExecutionState::Failed, &mut transitions)?;
                    self.finish(&mut exec, window_start);
                    break self.finalize(&mut exec, &transitions, overall_start, None);
                }
            }
        };

        self.cancellations.remove(&execution_id);
        outcome
    }

    fn transition(
        &self,
        exec: &mut AgentExecution,
        next: ExecutionState,
        transitions: &mut Vec<StateTransition>,
    ) -> SupervisorResult<()> {
        let from = exec.state;
        exec.transition_to(next)?;
        transitions.push(StateTransition { from, to: next, at: exec.last_state_change });
        Ok(())
    }

    fn finish(&self, exec: &mut AgentExecution, window_start: Option<chrono::DateTime<Utc>>) {
        exec.resource_usage = Some(ResourceUsage {
            window_start,
            window_end: exec.end_time,
            ..ResourceUsage::default()
        });
    }

    fn finalize(
        &self,
        exec: &mut AgentExecution,
        transitions: &[StateTransition],
        overall_start: Instant,
        output: Option<String>,
    ) -> SupervisorResult<AgentExecution> {
        let status = ExecutionStatus::from_terminal_state(exec.state).ok_or_else(|| {
            SupervisorError::Internal(format!(
                "finalize called on non-terminal state {:?}",
                exec.state
            ))
        })?;

        let result = ExecutionResult {
            execution_id: exec.id,
            agent_id: exec.agent_id.clone(),
            status,
            input: exec.input.clone(),
            output,
            duration_ms: overall_start.elapsed().as_millis() as u64,
            state_transitions: transitions.to_vec(),
        };

        self.store(exec.clone());
        self.results.insert(exec.id, result);
        info!(execution_id = %exec.id, ?status, "execution finalized");
        Ok(exec.clone())
    }

    fn store(&self, exec: AgentExecution) {
        self.executions.insert(exec.id, exec);
    }

    fn index(&self, execution_id: ExecutionId, agent_id: AgentId) {
        let mut ids = self.by_agent.entry(agent_id).or_default();
        ids.push(execution_id);
        if ids.len() > self.retention_per_agent {
            let evicted = ids.remove(0);
            self.executions.remove(&evicted);
            self.results.remove(&evicted);
        }
    }

    /// Fetch one execution record by id.
    pub fn get(&self, execution_id: ExecutionId) -> SupervisorResult<AgentExecution> {
        self.executions
            .get(&execution_id)
            .map(|e| e.clone())
            .ok_or_else(|| SupervisorError::NotFound(format!("execution '{execution_id}' not found")))
    }

    /// List every retained execution for one agent, oldest first.
    pub fn list(&self, agent_id: &AgentId) -> Vec<AgentExecution> {
        self.by_agent
            .get(agent_id)
            .map(|ids| ids.iter().filter_map(|id| self.executions.get(id).map(|e| e.clone())).collect())
            .unwrap_or_default()
    }

    /// All executions currently in a non-terminal state, across every agent.
    pub fn get_active(&self) -> Vec<AgentExecution> {
        self.executions
            .iter()
            .filter(|entry| !entry.state.is_terminal())
            .map(|entry| entry.clone())
            .collect()
    }

    /// Fetch the derived result of a terminated execution.
    pub fn get_result(&self, execution_id: ExecutionId) -> SupervisorResult<ExecutionResult> {
        self.results
            .get(&execution_id)
            .map(|r| r.clone())
            .ok_or_else(|| SupervisorError::NotFound(format!("result for '{execution_id}' not found")))
    }

    /// Request cancellation of an in-flight execution. Legal only while the
    /// execution is `starting` or `running` (§4.2).
    pub fn cancel(&self, execution_id: ExecutionId) -> SupervisorResult<()> {
        let state = self.get(execution_id)?.state;
        if !matches!(state, ExecutionState::Starting | ExecutionState::Running) {
            return Err(SupervisorError::Conflict(format!(
                "execution '{execution_id}' cannot be cancelled from state {state:?}"
            )));
        }
        if let Some(signal) = self.cancellations.get(&execution_id) {
            signal.notify_one();
        }
        Ok(())
    }

    /// Force an execution's recorded state to `new_state`, enforcing the
    /// §3 transition table. Exposed for administrative overrides outside
    /// the normal `execute` loop.
    pub fn update_state(&self, execution_id: ExecutionId, new_state: ExecutionState) -> SupervisorResult<()> {
        let mut entry = self
            .executions
            .get_mut(&execution_id)
            .ok_or_else(|| SupervisorError::NotFound(format!("execution '{execution_id}' not found")))?;
        entry.transition_to(new_state)
    }

    /// Aggregate counters across every retained execution, for `/metrics`.
    pub fn stats(&self) -> ExecutionStats {
        let mut stats = ExecutionStats::default();
        for entry in self.executions.iter() {
            stats.total += 1;
            stats.total_retries += entry.retry_count as u64;
            if !entry.state.is_terminal() {
                stats.active += 1;
            }
            match entry.state {
                ExecutionState::Idle => stats.idle += 1,
                ExecutionState::Starting => stats.starting += 1,
                ExecutionState::Running => stats.running += 1,
                ExecutionState::Completed => stats.completed += 1,
                ExecutionState::Failed => stats.failed += 1,
                ExecutionState::Timeout => stats.timeout += 1,
                ExecutionState::Cancelled => stats.cancelled += 1,
                ExecutionState::Cleanup => stats.cleanup += 1,
            }
        }
        stats
    }
}

/// Per-state execution counters accumulated by the engine (§4.2, `/metrics`).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ExecutionStats {
    /// Total retained executions, across every state.
    pub total: u64,
    /// Executions currently in a non-terminal state.
    pub active: u64,
    /// Sum of `retry_count` across every retained execution.
    pub total_retries: u64,
    pub idle: u64,
    pub starting: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeout: u64,
    pub cancelled: u64,
    pub cleanup: u64,
}

async fn run_one_attempt(
    agent: &dyn IAgent,
    input: &str,
    timeout: Duration,
    cancel_signal: &Notify,
) -> Attempt {
    tokio::select! {
        _ = cancel_signal.notified() => Attempt::Cancelled,
        outcome = tokio::time::timeout(timeout, agent.execute(input)) => match outcome {
            Ok(Ok(output)) => Attempt::Success(output),
            Ok(Err(err)) => Attempt::Error(err),
            Err(_) => Attempt::TimedOut,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use supervisor_types::{AccessType, AgentConfiguration, AgentMode, InputPattern, OutputPattern};

    struct FakeAgent {
        id: AgentId,
        config: AgentConfiguration,
        script: Mutex<Vec<SupervisorResult<String>>>,
        calls: AtomicU32,
    }

    fn config(id: &str) -> AgentConfiguration {
        let now = Utc::now();
        AgentConfiguration {
            id: AgentId::from(id),
            name: id.into(),
            agent_type: "test".into(),
            executable_path: "/bin/true".into(),
            working_directory: None,
            env: Default::default(),
            cli_args: Default::default(),
            input_pattern: InputPattern::Stdin,
            output_pattern: OutputPattern::Stdout,
            input_file_template: None,
            output_file_template: None,
            mode: AgentMode::Task,
            access_type: AccessType::ReadOnly,
            max_concurrent_executions: 5,
            timeout_secs: 5,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    impl FakeAgent {
        fn scripted(id: &str, script: Vec<SupervisorResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                id: AgentId::from(id),
                config: config(id),
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl IAgent for FakeAgent {
        async fn execute(&self, _input: &str) -> SupervisorResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok("done".into())
            } else {
                script.remove(0)
            }
        }

        fn get_id(&self) -> &AgentId {
            &self.id
        }

        fn get_name(&self) -> &str {
            &self.config.name
        }

        fn get_type(&self) -> &str {
            &self.config.agent_type
        }

        fn is_read_only(&self) -> bool {
            self.config.access_type == AccessType::ReadOnly
        }

        fn get_config(&self) -> &AgentConfiguration {
            &self.config
        }

        fn validate(&self) -> SupervisorResult<()> {
            self.config.validate()
        }
    }

    #[tokio::test]
    async fn successful_execution_reaches_completed_and_stores_result() {
        let engine = ExecutionEngine::new();
        let agent = FakeAgent::scripted("a", vec![Ok("hello".into())]);
        let exec = engine
            .execute(ExecutionContext::new(Duration::from_secs(1)), agent, "input")
            .await
            .unwrap();
        assert_eq!(exec.state, ExecutionState::Completed);
        let result = engine.get_result(exec.id).unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        // §8 S2: errors twice, then succeeds — retry_count reaches 3 (two
        // retries + the final success) and error_message/error_category are
        // cleared on the eventual success.
        let engine = ExecutionEngine::new();
        let agent = FakeAgent::scripted(
            "a",
            vec![
                Err(SupervisorError::Transient("connection refused".into())),
                Err(SupervisorError::Transient("connection refused".into())),
                Ok("recovered".into()),
            ],
        );
        let exec = engine
            .execute(ExecutionContext::new(Duration::from_secs(1)), agent.clone(), "input")
            .await
            .unwrap();
        assert_eq!(exec.state, ExecutionState::Completed);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 3);
        assert_eq!(exec.retry_count, 3);
        assert!(exec.error_message.is_none());
        assert!(exec.error_category.is_none());
    }

    #[tokio::test]
    async fn permanent_failure_does_not_retry() {
        let engine = ExecutionEngine::new();
        let agent = FakeAgent::scripted("a", vec![Err(SupervisorError::Permanent("bad input".into()))]);
        let exec = engine
            .execute(ExecutionContext::new(Duration::from_secs(1)), agent.clone(), "input")
            .await
            .unwrap();
        assert_eq!(exec.state, ExecutionState::Failed);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_exhausts_retries_and_fails() {
        let engine = ExecutionEngine::new();
        let script = (0..10)
            .map(|_| Err(SupervisorError::Transient("timeout".into())))
            .collect();
        let agent = FakeAgent::scripted("a", script);
        let exec = engine
            .execute(ExecutionContext::new(Duration::from_secs(1)), agent.clone(), "input")
            .await
            .unwrap();
        assert_eq!(exec.state, ExecutionState::Failed);
        assert!(agent.calls.load(Ordering::SeqCst) <= DEFAULT_MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn deadline_elapsing_moves_to_timeout_not_failed() {
        struct SlowAgent {
            id: AgentId,
            config: AgentConfiguration,
        }
        #[async_trait]
        impl IAgent for SlowAgent {
            async fn execute(&self, _input: &str) -> SupervisorResult<String> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok("too late".into())
            }
            fn get_id(&self) -> &AgentId {
                &self.id
            }
            fn get_name(&self) -> &str {
                &self.config.name
            }
            fn get_type(&self) -> &str {
                &self.config.agent_type
            }
            fn is_read_only(&self) -> bool {
                true
            }
            fn get_config(&self) -> &AgentConfiguration {
                &self.config
            }
            fn validate(&self) -> SupervisorResult<()> {
                Ok(())
            }
        }

        let engine = ExecutionEngine::new();
        let agent = Arc::new(SlowAgent { id: AgentId::from("slow"), config: config("slow") });
        let exec = engine
            .execute(ExecutionContext::new(Duration::from_millis(20)), agent, "input")
            .await
            .unwrap();
        assert_eq!(exec.state, ExecutionState::Timeout);
        assert_eq!(exec.error_category, Some(ErrorCategory::Transient));
    }

    #[tokio::test]
    async fn cancel_is_rejected_once_execution_is_terminal() {
        let engine = ExecutionEngine::new();
        let agent = FakeAgent::scripted("a", vec![Ok("done".into())]);
        let exec = engine
            .execute(ExecutionContext::new(Duration::from_secs(1)), agent, "input")
            .await
            .unwrap();
        assert!(engine.cancel(exec.id).is_err());
    }

    #[tokio::test]
    async fn get_active_excludes_terminal_executions() {
        let engine = ExecutionEngine::new();
        let agent = FakeAgent::scripted("a", vec![Ok("done".into())]);
        engine
            .execute(ExecutionContext::new(Duration::from_secs(1)), agent, "input")
            .await
            .unwrap();
        assert!(engine.get_active().is_empty());
    }

    #[tokio::test]
    async fn list_returns_executions_for_the_requested_agent_only() {
        let engine = ExecutionEngine::new();
        let a = FakeAgent::scripted("a", vec![Ok("1".into())]);
        let b = FakeAgent::scripted("b", vec![Ok("2".into())]);
        engine.execute(ExecutionContext::new(Duration::from_secs(1)), a, "x").await.unwrap();
        engine.execute(ExecutionContext::new(Duration::from_secs(1)), b, "y").await.unwrap();
        assert_eq!(engine.list(&AgentId::from("a")).len(), 1);
        assert_eq!(engine.list(&AgentId::from("b")).len(), 1);
    }

    #[tokio::test]
    async fn retention_evicts_oldest_execution_past_the_bound() {
        let engine = ExecutionEngine::with_retention(2);
        let agent = FakeAgent::scripted("a", vec![]);
        for _ in 0..3 {
            engine
                .execute(ExecutionContext::new(Duration::from_secs(1)), agent.clone(), "x")
                .await
                .unwrap();
        }
        assert_eq!(engine.list(&AgentId::from("a")).len(), 2);
    }
}
