#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **supervisor-scheduler** – Cron-driven scheduler (C4).
//!
//! Maps [`ScheduledTask`](supervisor_types::ScheduledTask)s to ticks: one
//! cron-entry handle per active task, resolving the agent through the
//! registry (C1) and dispatching through the execution engine (C2),
//! wrapped by the appropriate concurrency policy (C3). Mirrors the
//! poll-and-dispatch shape of the teacher workspace's orchestration engine,
//! generalized from a fixed agent roster to cron-scheduled ticks.

mod scheduler;

pub use scheduler::Scheduler;
