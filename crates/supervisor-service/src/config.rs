//! Server-side configuration (§6 "Configuration").

use std::path::Path;

use serde::Deserialize;

/// Top-level `supervisord` configuration file shape.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Directory of agent configuration YAML files (C1 bootstrap).
    #[serde(default = "default_agents_dir")]
    pub agents_dir: String,
    /// Bearer tokens accepted by the auth middleware. Empty disables auth.
    #[serde(default)]
    pub auth_tokens: Vec<String>,
    /// Allowed CORS origins; `["*"]` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body size, in bytes (§4.5 413 enforcement).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Whether C4's scheduler is active for this process.
    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,
}

fn default_agents_dir() -> String {
    "config/agents".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_message_size() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            agents_dir: default_agents_dir(),
            auth_tokens: Vec::new(),
            cors_origins: default_cors_origins(),
            max_message_size: default_max_message_size(),
            scheduler_enabled: default_true(),
        }
    }
}

impl ServiceConfig {
    /// Load from a YAML file, falling back to defaults for any field the
    /// file omits. Returns defaults unmodified if the path does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        Ok(config)
    }
}
