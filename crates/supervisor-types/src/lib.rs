#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **supervisor-types** – Shared data model for the agent supervisor.
//!
//! The crate is dependency-light and sits at the bottom of the crate graph so
//! that every other crate (registry, execution engine, scheduler, control
//! plane, CLI) can depend on it without creating cycles. It defines the
//! records described in the specification's data model: agent configuration,
//! execution records, scheduled tasks, and the lifecycle-operation envelopes,
//! plus the error taxonomy and the `IAgent` capability trait that the
//! execution engine depends on instead of any concrete agent implementation.

mod agent;
mod config;
mod error;
mod execution;
mod operation;
mod status;
mod task;

pub use agent::IAgent;
pub use config::{AccessType, AgentConfiguration, AgentMode, InputPattern, OutputPattern};
pub use error::{ErrorCategory, SupervisorError, SupervisorResult};
pub use execution::{
    AgentExecution, ExecutionId, ExecutionResult, ExecutionState, ExecutionStatus,
    ResourceUsage, StateTransition,
};
pub use operation::{BatchOperationResult, OperationResult};
pub use status::{AgentStatus, ProcessState};
pub use task::{ScheduledTask, TaskId};

use serde::{Deserialize, Serialize};

/// Unique identifier for an [`AgentConfiguration`].
///
/// Agent ids are caller-supplied (unlike execution/task ids) so registration
/// can reject duplicates deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Case-insensitive substrings that mark an environment variable key as
/// sensitive (§4.1 leakage guard).
pub const SENSITIVE_ENV_KEY_MARKERS: &[&str] = &[
    "password", "secret", "token", "key", "auth", "credential", "api", "cert", "ssl", "tls",
];

/// Case-insensitive substrings that classify an error message as transient
/// (§7), i.e. retry-eligible inside the execution engine.
pub const TRANSIENT_ERROR_MARKERS: &[&str] = &[
    "timeout",
    "connection refused",
    "network",
    "connection reset",
    "broken pipe",
    "resource unavailable",
    "try again",
    "temporarily unavailable",
];

/// Case-insensitive substrings that trigger redaction of a line of
/// input/output/error text before it is stored or logged (§7).
pub const SENSITIVE_LINE_MARKERS: &[&str] = &[
    "password", "token", "key", "secret", "auth", "credential", "private", "api", "cert", "ssl",
    "tls",
];

/// Placeholder text substituted for a redacted line.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED_SENSITIVE_DATA]";

/// Redact sensitive lines from free-form text per the §7 sanitization
/// policy: a line containing one of [`SENSITIVE_LINE_MARKERS`] (case
/// insensitive) followed by `=`, `:`, or a quote is replaced wholesale.
///
/// Idempotent: `sanitize(sanitize(x)) == sanitize(x)`, since a line that has
/// already been replaced by [`REDACTED_PLACEHOLDER`] contains none of the
/// markers and is left untouched on a second pass.
pub fn sanitize(text: &str) -> String {
    text.lines()
        .map(sanitize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn sanitize_line(line: &str) -> String {
    let lower = line.to_ascii_lowercase();
    for marker in SENSITIVE_LINE_MARKERS {
        if let Some(pos) = lower.find(marker) {
            let rest = &lower[pos + marker.len()..];
            let trimmed = rest.trim_start();
            if trimmed.starts_with('=') || trimmed.starts_with(':') || trimmed.starts_with('"') || trimmed.starts_with('\'')
            {
                return REDACTED_PLACEHOLDER.to_string();
            }
        }
    }
    line.to_string()
}

/// Classify an error message as transient or permanent per §7.
pub fn classify_error_message(message: &str) -> ErrorCategory {
    let lower = message.to_ascii_lowercase();
    if TRANSIENT_ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorCategory::Transient
    } else {
        ErrorCategory::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_redacts_key_value_lines() {
        let text = "starting up\nAPI_TOKEN=abc123\nsecret: sh0rt\nnothing to see here";
        let sanitized = sanitize(text);
        let lines: Vec<&str> = sanitized.lines().collect();
        assert_eq!(lines[0], "starting up");
        assert_eq!(lines[1], REDACTED_PLACEHOLDER);
        assert_eq!(lines[2], REDACTED_PLACEHOLDER);
        assert_eq!(lines[3], "nothing to see here");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let text = "password=hunter2\nok line";
        let once = sanitize(text);
        let twice = sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn sanitize_leaves_non_assignment_mentions_alone() {
        let text = "the token bucket algorithm limits requests";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn classify_error_message_detects_transient_markers() {
        assert_eq!(
            classify_error_message("connection refused by peer"),
            ErrorCategory::Transient
        );
        assert_eq!(
            classify_error_message("invalid configuration: missing field"),
            ErrorCategory::Permanent
        );
    }

    #[test]
    fn agent_id_roundtrips_through_json() {
        let id = AgentId::from("db-worker");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"db-worker\"");
        let decoded: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, decoded);
    }
}
