//! Read-write policy: a bounded, single-in-flight-per-agent request queue
//! (§4.3). A single worker task per agent dequeues and runs exactly one
//! execution at a time; a full queue fails `execute` immediately rather than
//! blocking the caller.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use supervisor_types::{AccessType, AgentExecution, AgentId, SupervisorError, SupervisorResult};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::debug;

/// Default bound on pending requests per agent (§5 backpressure).
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

type BoxedJob = Pin<Box<dyn Future<Output = ()> + Send>>;

struct AgentQueue {
    sender: mpsc::Sender<BoxedJob>,
    pending: Arc<AtomicUsize>,
    active: Arc<AtomicBool>,
}

/// Single-in-flight-per-agent execution queue for read-write agents.
pub struct ReadWritePolicy {
    capacity: usize,
    queues: RwLock<HashMap<AgentId, Arc<AgentQueue>>>,
}

impl Default for ReadWritePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadWritePolicy {
    /// Build a policy with the default queue capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Build a policy with an explicit per-agent queue capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            queues: RwLock::new(HashMap::new()),
        }
    }

    fn queue_for(&self, agent_id: &AgentId) -> Arc<AgentQueue> {
        if let Some(queue) = self.queues.read().unwrap().get(agent_id) {
            return queue.clone();
        }

        let mut guard = self.queues.write().unwrap();
        if let Some(queue) = guard.get(agent_id) {
            return queue.clone();
        }

        let (sender, mut receiver) = mpsc::channel::<BoxedJob>(self.capacity);
        let pending = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicBool::new(false));

        let worker_pending = pending.clone();
        let worker_active = active.clone();
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                worker_pending.fetch_sub(1, Ordering::SeqCst);
                worker_active.store(true, Ordering::SeqCst);
                job.await;
                worker_active.store(false, Ordering::SeqCst);
            }
        });

        let queue = Arc::new(AgentQueue { sender, pending, active });
        guard.insert(agent_id.clone(), queue.clone());
        queue
    }

    /// Enqueue one execution for `agent_id` and await its result.
    ///
    /// Rejects `access_type != ReadWrite` outright. Fails with
    /// [`SupervisorError::Capacity`] if the queue is already full.
    pub async fn execute<F, Fut>(
        &self,
        agent_id: &AgentId,
        access_type: AccessType,
        run: F,
    ) -> SupervisorResult<AgentExecution>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = SupervisorResult<AgentExecution>> + Send + 'static,
    {
        if access_type != AccessType::ReadWrite {
            return Err(SupervisorError::Validation(format!(
                "agent '{agent_id}' is not read-write; the single-in-flight policy does not apply"
            )));
        }

        let queue = self.queue_for(agent_id);
        let (result_tx, result_rx) = oneshot::channel();
        let job: BoxedJob = Box::pin(async move {
            let result = run().await;
            let _ = result_tx.send(result);
        });

        queue.pending.fetch_add(1, Ordering::SeqCst);
        if queue.sender.try_send(job).is_err() {
            queue.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SupervisorError::Capacity(format!(
                "read-write queue for agent '{agent_id}' is full"
            )));
        }
        debug!(%agent_id, "enqueued read-write execution");

        result_rx.await.map_err(|_| {
            SupervisorError::Internal("read-write worker dropped the result channel".into())
        })?
    }

    /// Block until `agent_id` has no active execution and nothing queued
    /// behind it (polls with a small backoff; returns immediately if the
    /// agent has never been scheduled).
    pub async fn wait_for_completion(&self, agent_id: &AgentId) {
        loop {
            let busy = self
                .queues
                .read()
                .unwrap()
                .get(agent_id)
                .map(|queue| queue.active.load(Ordering::SeqCst) || queue.pending.load(Ordering::SeqCst) > 0)
                .unwrap_or(false);
            if !busy {
                return;
            }
            sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Number of requests queued behind the currently active execution.
    pub fn queue_length(&self, agent_id: &AgentId) -> usize {
        self.queues
            .read()
            .unwrap()
            .get(agent_id)
            .map(|queue| queue.pending.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn dummy_execution() -> AgentExecution {
        AgentExecution::new(AgentId::from("w"), None, 3)
    }

    #[tokio::test]
    async fn rejects_read_only_agents() {
        let policy = ReadWritePolicy::new();
        let id = AgentId::from("w");
        let err = policy
            .execute(&id, AccessType::ReadOnly, || async { Ok(dummy_execution()) })
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Validation(_)));
    }

    #[tokio::test]
    async fn serializes_concurrent_requests_for_one_agent() {
        let policy = Arc::new(ReadWritePolicy::new());
        let id = AgentId::from("w");
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let policy = policy.clone();
            let id = id.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                policy
                    .execute(&id, AccessType::ReadWrite, move || async move {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                        Ok(dummy_execution())
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_queue_rejects_with_capacity_error() {
        let policy = Arc::new(ReadWritePolicy::with_capacity(1));
        let id = AgentId::from("w");

        // Occupy the single worker slot with a long-running job.
        let blocking_policy = policy.clone();
        let blocking_id = id.clone();
        let blocker = tokio::spawn(async move {
            blocking_policy
                .execute(&blocking_id, AccessType::ReadWrite, || async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(dummy_execution())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;

        // Fill the one queue slot, then overflow it.
        let id2 = id.clone();
        let policy2 = policy.clone();
        let filler = tokio::spawn(async move {
            policy2
                .execute(&id2, AccessType::ReadWrite, || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(dummy_execution())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let overflow = policy
            .execute(&id, AccessType::ReadWrite, || async { Ok(dummy_execution()) })
            .await;
        assert!(matches!(overflow, Err(SupervisorError::Capacity(_))));

        blocker.await.unwrap().unwrap();
        filler.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_for_completion_returns_once_slot_is_empty() {
        let policy = Arc::new(ReadWritePolicy::new());
        let id = AgentId::from("w");
        let _ = policy
            .execute(&id, AccessType::ReadWrite, || async { Ok(dummy_execution()) })
            .await
            .unwrap();
        policy.wait_for_completion(&id).await;
        assert_eq!(policy.queue_length(&id), 0);
    }

    #[test]
    fn unknown_agent_has_no_active_execution_or_backlog() {
        let policy = ReadWritePolicy::new();
        assert_eq!(policy.queue_length(&AgentId::from("ghost")), 0);
    }
}
