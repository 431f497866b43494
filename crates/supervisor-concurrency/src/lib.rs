#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **supervisor-concurrency** – Concurrency policies (C3).
//!
//! Two policies wrap the execution engine, selected by an agent's
//! [`AccessType`](supervisor_types::AccessType):
//!
//! - [`ReadWritePolicy`] — a bounded, single-in-flight-per-agent queue.
//! - [`ReadOnlyPool`] — a bounded admission pool.
//!
//! Neither policy depends on the execution engine directly; callers pass the
//! actual invocation as a closure, the same seam the teacher workspace uses
//! between its process manager and its executor.

mod pool;
mod queue;

pub use pool::{PoolMetrics, ReadOnlyPool};
pub use queue::ReadWritePolicy;
