//! The `IAgent` capability interface (§9 "Dynamic dispatch to agent
//! implementations").
//!
//! The execution engine depends on this trait, never on a concrete agent
//! implementation — generic-CLI agents, A2A-wrapped agents, and test fakes
//! all implement it the same way.

use async_trait::async_trait;

use crate::{AgentConfiguration, AgentId, SupervisorResult};

/// Capability interface implemented by every concrete agent variant.
#[async_trait]
pub trait IAgent: Send + Sync {
    /// Invoke the agent with raw (unsanitized) input, returning its raw
    /// output. Implementations own the actual transport: subprocess,
    /// JSON-RPC call, gRPC call, or an in-memory test double.
    async fn execute(&self, input: &str) -> SupervisorResult<String>;

    /// The agent's unique id.
    fn get_id(&self) -> &AgentId;

    /// The agent's display name.
    fn get_name(&self) -> &str;

    /// The agent's type tag.
    fn get_type(&self) -> &str;

    /// Whether this agent is classified read-only (§4.3 concurrency policy
    /// selection).
    fn is_read_only(&self) -> bool;

    /// Borrow the full configuration backing this agent.
    fn get_config(&self) -> &AgentConfiguration;

    /// Re-validate the backing configuration. Exposed so callers can check
    /// liveness of a handle without round-tripping through the registry.
    fn validate(&self) -> SupervisorResult<()>;
}
