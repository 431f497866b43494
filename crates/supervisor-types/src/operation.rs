//! Outcome envelopes for lifecycle commands (§3 `OperationResult`/`BatchOperationResult`).

use serde::{Deserialize, Serialize};

use crate::AgentId;

/// Outcome of a single lifecycle operation against one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// The agent the operation targeted.
    pub agent_id: AgentId,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable detail (error message on failure, confirmation on success).
    pub message: String,
    /// Wall-clock duration of the operation, in ms.
    pub duration_ms: u64,
}

/// Summary envelope for a batch of lifecycle operations (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperationResult {
    /// Per-agent results, in the order they were attempted.
    pub results: Vec<OperationResult>,
    /// Total number of agents targeted.
    pub total: usize,
    /// Number of agents for which the operation succeeded.
    pub succeeded: usize,
    /// Number of agents for which the operation failed.
    pub failed: usize,
    /// Total wall-clock duration of the whole batch, in ms.
    pub duration_ms: u64,
}

impl BatchOperationResult {
    /// Build a batch summary from individual results, computing the
    /// succeeded/failed/total counts.
    pub fn from_results(results: Vec<OperationResult>, duration_ms: u64) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = total - succeeded;
        Self {
            results,
            total,
            succeeded,
            failed,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_summary_counts_successes_and_failures() {
        let results = vec![
            OperationResult {
                agent_id: AgentId::from("a"),
                success: true,
                message: "ok".into(),
                duration_ms: 10,
            },
            OperationResult {
                agent_id: AgentId::from("b"),
                success: false,
                message: "boom".into(),
                duration_ms: 5,
            },
        ];
        let batch = BatchOperationResult::from_results(results, 15);
        assert_eq!(batch.total, 2);
        assert_eq!(batch.succeeded, 1);
        assert_eq!(batch.failed, 1);
    }
}
