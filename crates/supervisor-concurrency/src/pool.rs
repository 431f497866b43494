//! Read-only policy: a bounded admission pool (§4.3). Up to
//! `max_concurrent_executions` invocations run at once; further requests
//! fail immediately with a capacity error — the pool never queues or blocks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use supervisor_types::{AccessType, AgentExecution, AgentId, SupervisorError, SupervisorResult};
use tokio::sync::Semaphore;

struct AgentPool {
    semaphore: Arc<Semaphore>,
    capacity: u32,
}

/// Admission-bounded concurrency pool for read-only agents.
#[derive(Default)]
pub struct ReadOnlyPool {
    pools: RwLock<HashMap<AgentId, Arc<AgentPool>>>,
}

/// Snapshot of one agent's pool utilization (§4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolMetrics {
    /// Configured admission bound.
    pub total_capacity: u32,
    /// Number of permits currently checked out.
    pub used_capacity: u32,
    /// Number of permits still available.
    pub available_count: u32,
    /// `used_capacity / total_capacity`, in `[0.0, 1.0]`.
    pub utilization_rate: f64,
    /// Same as `total_capacity`, exposed under the spec's field name.
    pub max_concurrent: u32,
}

impl ReadOnlyPool {
    /// Build an empty pool registry; per-agent pools are created lazily on
    /// first use, sized by the `capacity` passed to [`Self::execute`].
    pub fn new() -> Self {
        Self::default()
    }

    fn pool_for(&self, agent_id: &AgentId, capacity: u32) -> Arc<AgentPool> {
        if let Some(pool) = self.pools.read().unwrap().get(agent_id) {
            return pool.clone();
        }
        let mut guard = self.pools.write().unwrap();
        if let Some(pool) = guard.get(agent_id) {
            return pool.clone();
        }
        let pool = Arc::new(AgentPool {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        });
        guard.insert(agent_id.clone(), pool.clone());
        pool
    }

    /// Admit one execution for `agent_id` if capacity remains.
    ///
    /// Rejects `access_type != ReadOnly` outright. `capacity` is the agent's
    /// effective `max_concurrent_executions` (§4.1 default already applied
    /// by the caller).
    pub async fn execute<F, Fut>(
        &self,
        agent_id: &AgentId,
        access_type: AccessType,
        capacity: u32,
        run: F,
    ) -> SupervisorResult<AgentExecution>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SupervisorResult<AgentExecution>>,
    {
        if access_type != AccessType::ReadOnly {
            return Err(SupervisorError::Validation(format!(
                "agent '{agent_id}' is not read-only; the bounded-pool policy does not apply"
            )));
        }

        let pool = self.pool_for(agent_id, capacity);
        let _permit = pool.semaphore.clone().try_acquire_owned().map_err(|_| {
            SupervisorError::Capacity(format!("read-only pool for agent '{agent_id}' is exhausted"))
        })?;

        run().await
    }

    /// Current utilization snapshot for `agent_id`, or `None` if the agent
    /// has never had a pool created for it.
    pub fn metrics(&self, agent_id: &AgentId) -> Option<PoolMetrics> {
        let guard = self.pools.read().unwrap();
        let pool = guard.get(agent_id)?;
        let available = pool.semaphore.available_permits() as u32;
        let used = pool.capacity.saturating_sub(available);
        let utilization_rate = if pool.capacity == 0 {
            0.0
        } else {
            f64::from(used) / f64::from(pool.capacity)
        };
        Some(PoolMetrics {
            total_capacity: pool.capacity,
            used_capacity: used,
            available_count: available,
            utilization_rate,
            max_concurrent: pool.capacity,
        })
    }
}
