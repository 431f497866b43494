//! Concrete [`IAgent`] backed by an OS subprocess (§9 "Dynamic dispatch").
//!
//! Translates an [`AgentConfiguration`]'s input/output patterns into the
//! plumbing a spawned child process needs: stdin/stdout pipes, a file
//! handed off by path, positional CLI arguments, or a JSON-RPC envelope
//! framed over stdio. Mirrors the subprocess-spawning shape of the teacher
//! workspace's process manager, generalized from its LLM-task runtime to
//! any externally invoked executable.

use std::process::Stdio;

use serde_json::json;
use supervisor_types::{AgentConfiguration, AgentId, IAgent, InputPattern, OutputPattern, SupervisorError, SupervisorResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::instrument;

/// An agent invoked as a child process of the supervisor.
pub struct SubprocessAgent {
    config: AgentConfiguration,
}

impl SubprocessAgent {
    /// Wrap a configuration as an invocable agent handle.
    pub fn new(config: AgentConfiguration) -> Self {
        Self { config }
    }

    fn build_command(&self, extra_args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.executable_path);
        if let Some(dir) = &self.config.working_directory {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        for (key, value) in &self.config.cli_args {
            cmd.arg(format!("--{key}"));
            cmd.arg(value);
        }
        for arg in extra_args {
            cmd.arg(arg);
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    fn render_template(&self, template: &str) -> String {
        template.replace("{agent}", self.config.id.as_str())
    }
}

#[async_trait::async_trait]
impl IAgent for SubprocessAgent {
    #[instrument(skip(self, input), fields(agent_id = %self.config.id))]
    async fn execute(&self, input: &str) -> SupervisorResult<String> {
        let extra_args: Vec<String> = match self.config.input_pattern {
            InputPattern::Args => input.split_whitespace().map(str::to_string).collect(),
            _ => Vec::new(),
        };

        let mut command = self.build_command(&extra_args);
        let mut child = command
            .spawn()
            .map_err(|e| SupervisorError::Permanent(format!("failed to spawn '{}': {e}", self.config.executable_path.display())))?;

        match self.config.input_pattern {
            InputPattern::Stdin => {
                if let Some(mut stdin) = child.stdin.take() {
                    stdin
                        .write_all(input.as_bytes())
                        .await
                        .map_err(|e| SupervisorError::Transient(format!("failed to write stdin: {e}")))?;
                }
            }
            InputPattern::JsonRpc => {
                let envelope = json!({"jsonrpc": "2.0", "method": "invoke", "params": input, "id": 1});
                if let Some(mut stdin) = child.stdin.take() {
                    stdin
                        .write_all(envelope.to_string().as_bytes())
                        .await
                        .map_err(|e| SupervisorError::Transient(format!("failed to write stdin: {e}")))?;
                }
            }
            InputPattern::File => {
                let template = self
                    .config
                    .input_file_template
                    .as_deref()
                    .ok_or_else(|| SupervisorError::Internal("input_pattern=file with no template".into()))?;
                let path = self.render_template(template);
                tokio::fs::write(&path, input)
                    .await
                    .map_err(|e| SupervisorError::Transient(format!("failed to write input file '{path}': {e}")))?;
            }
            InputPattern::Args => {}
        }
        drop(child.stdin.take());

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SupervisorError::Transient(format!("failed to wait on child: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SupervisorError::Permanent(format!(
                "agent exited with {}: {stderr}",
                output.status
            )));
        }

        match self.config.output_pattern {
            OutputPattern::Stdout => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            OutputPattern::JsonRpc => {
                let raw = String::from_utf8_lossy(&output.stdout);
                let parsed: serde_json::Value = serde_json::from_str(raw.trim())
                    .map_err(|e| SupervisorError::Permanent(format!("invalid json-rpc response: {e}")))?;
                if let Some(error) = parsed.get("error") {
                    return Err(SupervisorError::Permanent(format!("agent returned json-rpc error: {error}")));
                }
                Ok(parsed.get("result").map(|v| v.to_string()).unwrap_or_default())
            }
            OutputPattern::File => {
                let template = self
                    .config
                    .output_file_template
                    .as_deref()
                    .ok_or_else(|| SupervisorError::Internal("output_pattern=file with no template".into()))?;
                let path = self.render_template(template);
                let mut contents = String::new();
                tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| SupervisorError::Transient(format!("failed to open output file '{path}': {e}")))?
                    .read_to_string(&mut contents)
                    .await
                    .map_err(|e| SupervisorError::Transient(format!("failed to read output file '{path}': {e}")))?;
                Ok(contents)
            }
        }
    }

    fn get_id(&self) -> &AgentId {
        &self.config.id
    }

    fn get_name(&self) -> &str {
        &self.config.name
    }

    fn get_type(&self) -> &str {
        &self.config.agent_type
    }

    fn is_read_only(&self) -> bool {
        self.config.access_type == supervisor_types::AccessType::ReadOnly
    }

    fn get_config(&self) -> &AgentConfiguration {
        &self.config
    }

    fn validate(&self) -> SupervisorResult<()> {
        self.config.validate()
    }
}
