//! The scheduler proper (§4.4).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use supervisor_concurrency::{ReadOnlyPool, ReadWritePolicy};
use supervisor_execution::{ExecutionContext, ExecutionEngine, SubprocessAgent};
use supervisor_registry::AgentRegistry;
use supervisor_types::{
    AccessType, ExecutionResult, IAgent, ScheduledTask, SupervisorError, SupervisorResult, TaskId,
};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Cron-driven dispatcher: one spawned tick loop per active task, resolving
/// the agent through the registry (C1) and running it through the
/// execution engine (C2) under the matching concurrency policy (C3).
pub struct Scheduler {
    registry: Arc<AgentRegistry>,
    execution_engine: Arc<ExecutionEngine>,
    rw_policy: Arc<ReadWritePolicy>,
    ro_pool: Arc<ReadOnlyPool>,
    tasks: RwLock<HashMap<TaskId, ScheduledTask>>,
    handles: RwLock<HashMap<TaskId, JoinHandle<()>>>,
    tick_count: AtomicU64,
    enabled: std::sync::atomic::AtomicBool,
}

impl Scheduler {
    /// Build a scheduler over the given registry, execution engine, and
    /// concurrency policies. Always wrapped in an `Arc` since tick loops
    /// hold a handle back to it.
    pub fn new(
        registry: Arc<AgentRegistry>,
        execution_engine: Arc<ExecutionEngine>,
        rw_policy: Arc<ReadWritePolicy>,
        ro_pool: Arc<ReadOnlyPool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            execution_engine,
            rw_policy,
            ro_pool,
            tasks: RwLock::new(HashMap::new()),
            handles: RwLock::new(HashMap::new()),
            tick_count: AtomicU64::new(0),
            enabled: std::sync::atomic::AtomicBool::new(true),
        })
    }

    /// Total number of ticks fired across every task's lifetime, for `/metrics`.
    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    /// Enable or disable tick-loop dispatch process-wide (server config
    /// `scheduler_enabled`). Disabling does not cancel already-spawned tick
    /// loops (call `shutdown()` for that); it only stops new ones —
    /// `schedule`/`resume`/`update` — from being spawned.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Register a task: validates it, confirms its agent exists, parses its
    /// cron expression, and — if `should_fire()` — spawns its tick loop.
    /// Sets `active = true` and computes the first `next_execution`.
    #[instrument(skip(self, task), fields(task_id = %task.id, agent_id = %task.agent_id))]
    pub async fn schedule(self: &Arc<Self>, mut task: ScheduledTask) -> SupervisorResult<()> {
        task.validate()?;
        self.registry.get(&task.agent_id)?;
        let parsed = parse_cron(&task.cron_expression)?;

        task.active = true;
        task.next_execution = parsed.upcoming(Utc).next();
        let task_id = task.id;

        {
            let mut guard = self.tasks.write().unwrap();
            if guard.contains_key(&task_id) {
                return Err(SupervisorError::Conflict(format!(
                    "task '{task_id}' is already scheduled"
                )));
            }
            guard.insert(task_id, task.clone());
        }

        if task.should_fire() {
            self.spawn_tick_loop(task_id, parsed);
        }

        info!(%task_id, "task scheduled");
        Ok(())
    }

    /// Remove a task entirely: aborts its tick loop (if any) and drops both
    /// indexes.
    pub fn unschedule(&self, task_id: TaskId) -> SupervisorResult<()> {
        let removed = self.tasks.write().unwrap().remove(&task_id).is_some();
        if !removed {
            return Err(SupervisorError::NotFound(format!("task '{task_id}' not found")));
        }
        if let Some(handle) = self.handles.write().unwrap().remove(&task_id) {
            handle.abort();
        }
        Ok(())
    }

    /// Pause a task: flips `active` off and aborts its tick loop, leaving
    /// the task itself in the index.
    pub fn pause(&self, task_id: TaskId) -> SupervisorResult<()> {
        {
            let mut guard = self.tasks.write().unwrap();
            let task = guard
                .get_mut(&task_id)
                .ok_or_else(|| SupervisorError::NotFound(format!("task '{task_id}' not found")))?;
            task.active = false;
        }
        if let Some(handle) = self.handles.write().unwrap().remove(&task_id) {
            handle.abort();
        }
        Ok(())
    }

    /// Resume a paused task: flips `active` on and, if the task is also
    /// `enabled`, re-spawns its tick loop.
    pub fn resume(self: &Arc<Self>, task_id: TaskId) -> SupervisorResult<()> {
        let snapshot = {
            let mut guard = self.tasks.write().unwrap();
            let task = guard
                .get_mut(&task_id)
                .ok_or_else(|| SupervisorError::NotFound(format!("task '{task_id}' not found")))?;
            task.active = true;
            task.clone()
        };

        if snapshot.should_fire() {
            let parsed = parse_cron(&snapshot.cron_expression)?;
            self.spawn_tick_loop(task_id, parsed);
        }
        Ok(())
    }

    /// Update a task's definition in place. Re-spawns its tick loop only if
    /// the cron expression changed.
    pub fn update(self: &Arc<Self>, mut task: ScheduledTask) -> SupervisorResult<()> {
        task.validate()?;
        self.registry.get(&task.agent_id)?;
        let task_id = task.id;

        let previous_expression = {
            let guard = self.tasks.read().unwrap();
            guard
                .get(&task_id)
                .ok_or_else(|| SupervisorError::NotFound(format!("task '{task_id}' not found")))?
                .cron_expression
                .clone()
        };
        let expression_changed = previous_expression != task.cron_expression;

        self.tasks.write().unwrap().insert(task_id, task.clone());

        if expression_changed {
            if let Some(handle) = self.handles.write().unwrap().remove(&task_id) {
                handle.abort();
            }
            if task.should_fire() {
                let parsed = parse_cron(&task.cron_expression)?;
                self.spawn_tick_loop(task_id, parsed);
            }
        }

        Ok(())
    }

    /// Ad-hoc fire: runs the agent now, independent of the cron schedule,
    /// and returns the synchronous result.
    #[instrument(skip(self), fields(%task_id))]
    pub async fn execute(&self, task_id: TaskId) -> SupervisorResult<ExecutionResult> {
        let task = self.get(task_id)?;
        let result = self.dispatch(&task).await;
        self.record_tick(task_id, &result);
        result
    }

    /// Snapshot of every scheduled task.
    pub fn list(&self) -> Vec<ScheduledTask> {
        self.tasks.read().unwrap().values().cloned().collect()
    }

    /// Fetch one task's current snapshot.
    pub fn get(&self, task_id: TaskId) -> SupervisorResult<ScheduledTask> {
        self.tasks
            .read()
            .unwrap()
            .get(&task_id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(format!("task '{task_id}' not found")))
    }

    /// Abort every running tick loop. Used during process shutdown; the
    /// scheduler itself remains usable afterward (`schedule` can re-spawn).
    pub fn shutdown(&self) {
        for (task_id, handle) in self.handles.write().unwrap().drain() {
            handle.abort();
            info!(%task_id, "tick loop aborted on shutdown");
        }
    }

    fn spawn_tick_loop(self: &Arc<Self>, task_id: TaskId, schedule: Schedule) {
        if !self.is_enabled() {
            return;
        }
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    return;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
                scheduler.fire_tick(task_id).await;
            }
        });
        self.handles.write().unwrap().insert(task_id, handle);
    }

    async fn fire_tick(self: &Arc<Self>, task_id: TaskId) {
        let Ok(task) = self.get(task_id) else {
            return;
        };
        if !task.should_fire() {
            return;
        }
        let result = self.dispatch(&task).await;
        if let Err(err) = &result {
            warn!(%task_id, agent_id = %task.agent_id, error = %err, "scheduled tick failed");
        }
        self.tick_count.fetch_add(1, Ordering::Relaxed);
        self.record_tick(task_id, &result);
    }

    fn record_tick(&self, task_id: TaskId, result: &SupervisorResult<ExecutionResult>) {
        let next = self
            .tasks
            .read()
            .unwrap()
            .get(&task_id)
            .and_then(|t| parse_cron(&t.cron_expression).ok())
            .and_then(|s| s.upcoming(Utc).next());

        let mut guard = self.tasks.write().unwrap();
        if let Some(t) = guard.get_mut(&task_id) {
            t.last_execution = Some(Utc::now());
            t.next_execution = next;
            if let Ok(result) = result {
                t.last_result = Some(result.clone());
            }
        }
    }

    /// Resolve the agent, build its input, and run it once through C2 under
    /// the policy matching its `access_type`.
    async fn dispatch(&self, task: &ScheduledTask) -> SupervisorResult<ExecutionResult> {
        let config = self.registry.get(&task.agent_id)?;
        let agent: Arc<dyn IAgent> = Arc::new(SubprocessAgent::new(config.clone()));
        let input = task.build_input_string();
        let ctx = ExecutionContext::new(Duration::from_secs(task.timeout_secs))
            .with_task(task.id)
            .with_max_retries(task.max_retries);
        let engine = self.execution_engine.clone();

        let exec = match config.access_type {
            AccessType::ReadWrite => {
                self.rw_policy
                    .execute(&task.agent_id, config.access_type, move || async move {
                        engine.execute(ctx, agent, &input).await
                    })
                    .await?
            }
            AccessType::ReadOnly => {
                let capacity = config.effective_max_concurrent_executions();
                self.ro_pool
                    .execute(&task.agent_id, config.access_type, capacity, move || async move {
                        engine.execute(ctx, agent, &input).await
                    })
                    .await?
            }
        };

        self.execution_engine.get_result(exec.id)
    }
}

fn parse_cron(expression: &str) -> SupervisorResult<Schedule> {
    Schedule::from_str(expression)
        .map_err(|e| SupervisorError::Validation(format!("invalid cron expression '{expression}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use supervisor_types::{AgentConfiguration, AgentId, AgentMode, InputPattern, OutputPattern};

    fn agent_config(id: &str, access_type: AccessType) -> AgentConfiguration {
        let now = Utc::now();
        AgentConfiguration {
            id: AgentId::from(id),
            name: id.into(),
            agent_type: "cli-tool".into(),
            executable_path: "/bin/cat".into(),
            working_directory: None,
            env: Map::new(),
            cli_args: Map::new(),
            input_pattern: InputPattern::Stdin,
            output_pattern: OutputPattern::Stdout,
            input_file_template: None,
            output_file_template: None,
            mode: AgentMode::Task,
            access_type,
            max_concurrent_executions: 5,
            timeout_secs: 5,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn task(agent_id: &str, cron_expression: &str) -> ScheduledTask {
        ScheduledTask {
            id: TaskId::new(),
            name: "t".into(),
            agent_id: AgentId::from(agent_id),
            cron_expression: cron_expression.into(),
            enabled: true,
            active: false,
            input_parameters: Map::new(),
            max_retries: 1,
            timeout_secs: 5,
            last_execution: None,
            next_execution: None,
            last_result: None,
        }
    }

    fn scheduler() -> Arc<Scheduler> {
        Scheduler::new(
            Arc::new(AgentRegistry::new()),
            Arc::new(ExecutionEngine::new()),
            Arc::new(ReadWritePolicy::new()),
            Arc::new(ReadOnlyPool::new()),
        )
    }

    #[tokio::test]
    async fn schedule_rejects_unknown_agent() {
        let scheduler = scheduler();
        let err = scheduler
            .schedule(task("ghost", "* * * * * *"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound(_)));
    }

    #[tokio::test]
    async fn schedule_rejects_invalid_cron_expression() {
        let scheduler = scheduler();
        scheduler.registry.register(agent_config("a", AccessType::ReadOnly)).unwrap();
        let err = scheduler
            .schedule(task("a", "not a cron expression"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Validation(_)));
    }

    #[tokio::test]
    async fn schedule_sets_active_and_computes_next_execution() {
        let scheduler = scheduler();
        scheduler.registry.register(agent_config("a", AccessType::ReadOnly)).unwrap();
        let t = task("a", "* * * * * *");
        let task_id = t.id;
        scheduler.schedule(t).await.unwrap();
        let stored = scheduler.get(task_id).unwrap();
        assert!(stored.active);
        assert!(stored.next_execution.is_some());
    }

    #[tokio::test]
    async fn schedule_rejects_duplicate_task_id() {
        let scheduler = scheduler();
        scheduler.registry.register(agent_config("a", AccessType::ReadOnly)).unwrap();
        let t = task("a", "* * * * * *");
        let dup = t.clone();
        scheduler.schedule(t).await.unwrap();
        let err = scheduler.schedule(dup).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Conflict(_)));
    }

    #[tokio::test]
    async fn unschedule_removes_task_and_is_idempotent_failure() {
        let scheduler = scheduler();
        scheduler.registry.register(agent_config("a", AccessType::ReadOnly)).unwrap();
        let t = task("a", "* * * * * *");
        let task_id = t.id;
        scheduler.schedule(t).await.unwrap();
        scheduler.unschedule(task_id).unwrap();
        assert!(scheduler.get(task_id).is_err());
        assert!(scheduler.unschedule(task_id).is_err());
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_active_flag() {
        let scheduler = scheduler();
        scheduler.registry.register(agent_config("a", AccessType::ReadOnly)).unwrap();
        let t = task("a", "* * * * * *");
        let task_id = t.id;
        scheduler.schedule(t).await.unwrap();

        scheduler.pause(task_id).unwrap();
        assert!(!scheduler.get(task_id).unwrap().active);

        scheduler.resume(task_id).unwrap();
        assert!(scheduler.get(task_id).unwrap().active);
    }

    #[tokio::test]
    async fn execute_runs_the_agent_and_records_last_result() {
        let scheduler = scheduler();
        scheduler.registry.register(agent_config("a", AccessType::ReadOnly)).unwrap();
        let mut t = task("a", "0 0 0 1 1 *");
        t.input_parameters.insert("msg".into(), "hi".into());
        let task_id = t.id;
        scheduler.schedule(t).await.unwrap();

        let result = scheduler.execute(task_id).await.unwrap();
        assert_eq!(result.output.as_deref(), Some("msg=hi"));

        let stored = scheduler.get(task_id).unwrap();
        assert!(stored.last_execution.is_some());
        assert!(stored.last_result.is_some());
    }

    #[tokio::test]
    async fn update_reparses_cron_only_when_expression_changes() {
        let scheduler = scheduler();
        scheduler.registry.register(agent_config("a", AccessType::ReadOnly)).unwrap();
        let mut t = task("a", "* * * * * *");
        let task_id = t.id;
        scheduler.schedule(t.clone()).await.unwrap();

        t.name = "renamed".into();
        scheduler.update(t.clone()).unwrap();
        assert_eq!(scheduler.get(task_id).unwrap().name, "renamed");

        t.cron_expression = "not a cron expression".into();
        assert!(scheduler.update(t).is_err());
    }

    #[tokio::test]
    async fn list_reflects_every_scheduled_task() {
        let scheduler = scheduler();
        scheduler.registry.register(agent_config("a", AccessType::ReadOnly)).unwrap();
        scheduler.registry.register(agent_config("b", AccessType::ReadOnly)).unwrap();
        scheduler.schedule(task("a", "* * * * * *")).await.unwrap();
        scheduler.schedule(task("b", "* * * * * *")).await.unwrap();
        assert_eq!(scheduler.list().len(), 2);
    }
}
