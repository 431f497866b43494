//! Agent configuration (§3 `AgentConfiguration`).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AgentId, SupervisorError, SupervisorResult, SENSITIVE_ENV_KEY_MARKERS};

/// How an agent receives its input for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputPattern {
    /// Input is written to the child process's stdin.
    Stdin,
    /// Input is written to a file built from `input_file_template`.
    File,
    /// Input is passed as CLI arguments.
    Args,
    /// Input is framed as a JSON-RPC request.
    JsonRpc,
}

/// How an agent emits its output for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputPattern {
    /// Output is read from the child process's stdout.
    Stdout,
    /// Output is read from a file built from `output_file_template`.
    File,
    /// Output is framed as a JSON-RPC response.
    JsonRpc,
}

/// Single-shot vs. persistent-session invocation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// One invocation runs to completion and exits.
    Task,
    /// The agent keeps a persistent session across invocations.
    Interactive,
}

/// Whether concurrent invocations of an agent are safe.
///
/// Determines which concurrency policy (§4.3) wraps the execution engine for
/// this agent: `ReadWrite` agents are limited to one in-flight execution at a
/// time; `ReadOnly` agents are admitted up to `max_concurrent_executions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    /// Safe to run many invocations concurrently.
    ReadOnly,
    /// Mutates shared state; at most one invocation may run at a time.
    ReadWrite,
}

/// Default bound for read-only agents that don't specify one (§4.1).
pub const DEFAULT_READ_ONLY_CONCURRENCY: u32 = 10;

/// Immutable-except-by-explicit-update configuration for one agent (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfiguration {
    /// Unique identifier.
    pub id: AgentId,
    /// Human-readable display name.
    pub name: String,
    /// Free-form agent type tag (e.g. `"cli-tool"`, `"json-rpc-service"`).
    pub agent_type: String,
    /// Path to the executable to invoke.
    pub executable_path: PathBuf,
    /// Working directory for the child process, if not the supervisor's own.
    pub working_directory: Option<PathBuf>,
    /// Environment variables to set for the invocation.
    pub env: HashMap<String, String>,
    /// CLI arguments to pass, as a key-value map translated by the
    /// invocation recipe into positional/flag arguments.
    pub cli_args: HashMap<String, String>,
    /// How input is delivered to the agent.
    pub input_pattern: InputPattern,
    /// How output is read back from the agent.
    pub output_pattern: OutputPattern,
    /// Template for the input file path when `input_pattern == File`.
    pub input_file_template: Option<String>,
    /// Template for the output file path when `output_pattern == File`.
    pub output_file_template: Option<String>,
    /// Task vs. interactive invocation mode.
    pub mode: AgentMode,
    /// Read-only vs. read-write concurrency classification.
    pub access_type: AccessType,
    /// Maximum number of simultaneous executions permitted for this agent.
    pub max_concurrent_executions: u32,
    /// Per-execution timeout, in seconds.
    pub timeout_secs: u64,
    /// Whether the agent accepts new executions at all.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AgentConfiguration {
    /// Validate the invariants from §3/§4.1. Does not mutate `self`.
    pub fn validate(&self) -> SupervisorResult<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(SupervisorError::Validation("agent id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(SupervisorError::Validation("agent name must not be empty".into()));
        }
        if self.access_type == AccessType::ReadWrite && self.max_concurrent_executions != 1 {
            return Err(SupervisorError::Validation(
                "read-write agents must have max_concurrent_executions == 1".into(),
            ));
        }
        // A read-only agent may leave max_concurrent_executions unset (0);
        // effective_max_concurrent_executions() applies the §4.1 default.
        if self.input_pattern == InputPattern::File
            && self
                .input_file_template
                .as_ref()
                .map(|t| t.trim().is_empty())
                .unwrap_or(true)
        {
            return Err(SupervisorError::Validation(
                "input_pattern=file requires a non-empty input_file_template".into(),
            ));
        }
        if self.output_pattern == OutputPattern::File
            && self
                .output_file_template
                .as_ref()
                .map(|t| t.trim().is_empty())
                .unwrap_or(true)
        {
            return Err(SupervisorError::Validation(
                "output_pattern=file requires a non-empty output_file_template".into(),
            ));
        }
        for key in self.env.keys() {
            if is_sensitive_env_key(key) {
                return Err(SupervisorError::Validation(format!(
                    "environment variable key '{key}' looks like it carries a secret; \
                     configure it out-of-band instead"
                )));
            }
        }
        Ok(())
    }

    /// True when `input_pattern`/`output_pattern` disagree about JSON-RPC
    /// framing. §4.1 treats this as an accepted-but-warned configuration,
    /// not a hard validation error.
    pub fn has_mismatched_json_rpc_patterns(&self) -> bool {
        (self.input_pattern == InputPattern::JsonRpc) != (self.output_pattern == OutputPattern::JsonRpc)
    }

    /// Effective concurrency bound, applying the §4.1 read-only default.
    pub fn effective_max_concurrent_executions(&self) -> u32 {
        if self.access_type == AccessType::ReadOnly && self.max_concurrent_executions == 0 {
            DEFAULT_READ_ONLY_CONCURRENCY
        } else {
            self.max_concurrent_executions
        }
    }
}

fn is_sensitive_env_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_ENV_KEY_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(access_type: AccessType, max_concurrent: u32) -> AgentConfiguration {
        let now = Utc::now();
        AgentConfiguration {
            id: AgentId::from("db-worker"),
            name: "DB Worker".into(),
            agent_type: "cli-tool".into(),
            executable_path: PathBuf::from("/usr/local/bin/db-worker"),
            working_directory: None,
            env: HashMap::new(),
            cli_args: HashMap::new(),
            input_pattern: InputPattern::Stdin,
            output_pattern: OutputPattern::Stdout,
            input_file_template: None,
            output_file_template: None,
            mode: AgentMode::Task,
            access_type,
            max_concurrent_executions: max_concurrent,
            timeout_secs: 30,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn read_write_requires_single_concurrency() {
        let cfg = base(AccessType::ReadWrite, 2);
        assert!(cfg.validate().is_err());
        let cfg = base(AccessType::ReadWrite, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn file_input_pattern_requires_template() {
        let mut cfg = base(AccessType::ReadOnly, 5);
        cfg.input_pattern = InputPattern::File;
        assert!(cfg.validate().is_err());
        cfg.input_file_template = Some("/tmp/{id}.json".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn sensitive_env_keys_are_rejected() {
        let mut cfg = base(AccessType::ReadOnly, 5);
        cfg.env.insert("API_TOKEN".into(), "x".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn read_only_default_concurrency_applies_when_unset() {
        let cfg = base(AccessType::ReadOnly, 0);
        assert_eq!(
            cfg.effective_max_concurrent_executions(),
            DEFAULT_READ_ONLY_CONCURRENCY
        );
    }
}
