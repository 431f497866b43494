//! Error taxonomy shared across the supervisor (§7).
//!
//! `SupervisorError` is the *kind* taxonomy surfaced at component boundaries
//! (registry, execution engine, scheduler, HTTP layer); `ErrorCategory` is
//! the narrower transient/permanent/agent/system classification recorded on
//! an [`crate::AgentExecution`] to drive the retry loop.

use serde::{Deserialize, Serialize};

/// Error kinds returned by the supervisor's public operations.
///
/// Mirrors the taxonomy in spec §7: validation and not-found/conflict/
/// capacity errors are returned to callers verbatim; transient errors are
/// absorbed by the execution engine's retry loop and only escape it once
/// retries are exhausted (at which point they surface as `Permanent`).
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum SupervisorError {
    /// Bad input to a public surface: malformed config, empty id, mismatched
    /// access/concurrency invariant, etc. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Reference to an unknown agent, execution, or task.
    #[error("not found: {0}")]
    NotFound(String),

    /// A no-op lifecycle transition, or a forbidden state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A concurrency bound was reached (read-write queue full, read-only
    /// pool exhausted).
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// Transient failure; the execution engine may retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// Permanent failure; never retried.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Catch-all for unexpected internal failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// Map to the HTTP status code the control plane should respond with.
    pub fn http_status(&self) -> u16 {
        match self {
            SupervisorError::Validation(_) => 400,
            SupervisorError::NotFound(_) => 404,
            SupervisorError::Conflict(_) => 409,
            SupervisorError::Capacity(_) => 409,
            SupervisorError::Transient(_) => 503,
            SupervisorError::Permanent(_) => 500,
            SupervisorError::Internal(_) => 500,
        }
    }

    /// Map to the JSON-RPC-style numeric `code` field used on the HTTP
    /// surface (§6). Kinds without a dedicated agent-protocol code fall back
    /// to the standard JSON-RPC `internal error` code.
    pub fn protocol_code(&self) -> i64 {
        match self {
            SupervisorError::NotFound(_) => -32001,
            SupervisorError::Permanent(_) | SupervisorError::Transient(_) => -32002,
            SupervisorError::Capacity(_) => -32004,
            SupervisorError::Validation(_) => -32602,
            SupervisorError::Conflict(_) => -32000,
            SupervisorError::Internal(_) => -32603,
        }
    }
}

/// Result alias used throughout the supervisor crates.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// Classification recorded on a terminal [`crate::AgentExecution`] (§3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Matches one of the transient substrings; retried up to `max_retries`.
    Transient,
    /// Anything not classified as transient. Never retried.
    Permanent,
    /// The agent itself reported a semantic failure (reserved for callers
    /// that want a distinction finer than transient/permanent).
    AgentError,
    /// A host/system-level failure distinct from the agent's own logic.
    SystemError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_matches_spec_table() {
        assert_eq!(SupervisorError::NotFound("x".into()).http_status(), 404);
        assert_eq!(SupervisorError::Conflict("x".into()).http_status(), 409);
        assert_eq!(SupervisorError::Capacity("x".into()).http_status(), 409);
        assert_eq!(SupervisorError::Validation("x".into()).http_status(), 400);
    }

    #[test]
    fn protocol_codes_match_spec() {
        assert_eq!(SupervisorError::NotFound("x".into()).protocol_code(), -32001);
        assert_eq!(SupervisorError::Capacity("x".into()).protocol_code(), -32004);
    }
}
