#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **supervisor-execution** – Execution engine (C2).
//!
//! Runs a single agent invocation through the `AgentExecution` state
//! machine: idle → starting → running → one of `{completed, failed,
//! timeout, cancelled}` → cleanup. Retries transient failures with linear
//! backoff, times out long-running invocations, and supports cooperative
//! cancellation — the same lifecycle the teacher workspace's process
//! manager tracks per agent, generalized here to run any [`IAgent`] rather
//! than an in-process LLM task.

mod engine;
mod subprocess;

pub use engine::{
    ExecutionContext, ExecutionEngine, ExecutionStats, DEFAULT_MAX_RETRIES, DEFAULT_RETENTION_PER_AGENT,
};
pub use subprocess::SubprocessAgent;
