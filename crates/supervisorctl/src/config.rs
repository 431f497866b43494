//! Client-side configuration (§6 "Configuration"): YAML file plus
//! `SUPERVISOR_`-prefixed environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Top-level `supervisorctl` configuration file shape.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub defaults: DefaultsSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_url")]
    pub url: String,
    /// Request timeout, in seconds (valid range 1..300 per §6).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplaySection {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub colors: bool,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            format: default_format(),
            colors: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    /// Reserved for a future `--retries` flag (0..10); not yet consumed by
    /// any subcommand, mirroring the spec's own deferral of `tail`/`events`.
    #[serde(default = "default_restart_attempts")]
    pub restart_attempts: u32,
    /// Reserved default wait budget, in seconds (1..300); the `--wait` poll
    /// loop itself uses the fixed 30s/1s (start/restart) and 30s/500ms
    /// (stop) cadence from §4.6 regardless of this value.
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u64,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            restart_attempts: default_restart_attempts(),
            wait_time_secs: default_wait_time_secs(),
        }
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_format() -> String {
    "table".to_string()
}

fn default_true() -> bool {
    true
}

fn default_restart_attempts() -> u32 {
    3
}

fn default_wait_time_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            auth: AuthSection::default(),
            display: DisplaySection::default(),
            defaults: DefaultsSection::default(),
        }
    }
}

impl ClientConfig {
    /// Load from `explicit_path` if given, otherwise the first of the §6
    /// search path to exist (`./supervisorctl.yaml`,
    /// `$HOME/.config/supervisorctl/supervisorctl.yaml`,
    /// `/etc/supervisorctl/supervisorctl.yaml`); falls back to defaults if
    /// none exist. Applies `SUPERVISOR_*` environment overrides last.
    pub fn load(explicit_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::from_search_path(explicit_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_search_path(explicit_path: Option<&Path>) -> anyhow::Result<Self> {
        let candidates: Vec<PathBuf> = match explicit_path {
            Some(p) => vec![p.to_path_buf()],
            None => {
                let mut v = vec![PathBuf::from("./supervisorctl.yaml")];
                if let Some(home) = std::env::var_os("HOME") {
                    v.push(PathBuf::from(home).join(".config/supervisorctl/supervisorctl.yaml"));
                }
                v.push(PathBuf::from("/etc/supervisorctl/supervisorctl.yaml"));
                v
            }
        };

        for path in candidates {
            if path.exists() {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                return serde_yaml::from_str(&raw)
                    .with_context(|| format!("parsing {}", path.display()));
            }
        }
        Ok(Self::default())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SUPERVISOR_SERVER_URL") {
            self.server.url = v;
        }
        if let Ok(v) = std::env::var("SUPERVISOR_SERVER_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.server.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("SUPERVISOR_AUTH_TOKEN") {
            self.auth.token = Some(v);
        }
        if let Ok(v) = std::env::var("SUPERVISOR_DISPLAY_FORMAT") {
            self.display.format = v;
        }
        if let Ok(v) = std::env::var("SUPERVISOR_DISPLAY_COLORS") {
            if let Ok(b) = v.parse() {
                self.display.colors = b;
            }
        }
        if let Ok(v) = std::env::var("SUPERVISOR_DEFAULTS_RESTART_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.defaults.restart_attempts = n;
            }
        }
        if let Ok(v) = std::env::var("SUPERVISOR_DEFAULTS_WAIT_TIME") {
            if let Ok(n) = v.parse() {
                self.defaults.wait_time_secs = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ClientConfig::load(Some(Path::new("/no/such/file.yaml"))).unwrap();
        assert_eq!(config.server.url, "http://127.0.0.1:8080");
        assert_eq!(config.display.format, "table");
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisorctl.yaml");
        std::fs::write(&path, "server:\n  url: http://example.test:9000\n").unwrap();
        let config = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.url, "http://example.test:9000");
        assert_eq!(config.server.timeout_secs, 10);
    }

    #[test]
    fn env_var_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisorctl.yaml");
        std::fs::write(&path, "server:\n  url: http://example.test:9000\n").unwrap();
        std::env::set_var("SUPERVISOR_SERVER_URL", "http://override.test:1");
        let config = ClientConfig::load(Some(&path)).unwrap();
        std::env::remove_var("SUPERVISOR_SERVER_URL");
        assert_eq!(config.server.url, "http://override.test:1");
    }
}
