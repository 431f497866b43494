#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **supervisor-registry** – Agent Registry (C1).
//!
//! Holds [`AgentConfiguration`] records keyed by id and validates them on
//! every mutation. All operations are synchronous and serialized behind a
//! single reader/writer lock (§4.1, §5) — `get`/`list` may proceed
//! concurrently with each other, `register`/`update`/`delete` serialize
//! against everything else.

mod loader;

pub use loader::{load_configurations_from_directory, load_configuration_file};

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use supervisor_types::{AgentConfiguration, AgentId, SupervisorError, SupervisorResult};
use tracing::{debug, instrument, warn};

/// Thread-safe registry of agent configurations.
pub struct AgentRegistry {
    inner: RwLock<HashMap<AgentId, AgentConfiguration>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new agent configuration.
    ///
    /// Rejects duplicate ids and any configuration that fails [`AgentConfiguration::validate`].
    #[instrument(skip(self, config), fields(agent_id = %config.id))]
    pub fn register(&self, config: AgentConfiguration) -> SupervisorResult<()> {
        validate_with_warnings(&config)?;

        let mut guard = self
            .inner
            .write()
            .map_err(|_| SupervisorError::Internal("registry lock poisoned".into()))?;

        if guard.contains_key(&config.id) {
            return Err(SupervisorError::Conflict(format!(
                "agent '{}' is already registered",
                config.id
            )));
        }

        debug!("registering agent");
        guard.insert(config.id.clone(), config);
        Ok(())
    }

    /// Update an existing agent configuration in place.
    ///
    /// Requires prior existence; otherwise returns a not-found error.
    #[instrument(skip(self, config), fields(agent_id = %config.id))]
    pub fn update(&self, mut config: AgentConfiguration) -> SupervisorResult<()> {
        validate_with_warnings(&config)?;

        let mut guard = self
            .inner
            .write()
            .map_err(|_| SupervisorError::Internal("registry lock poisoned".into()))?;

        if !guard.contains_key(&config.id) {
            return Err(SupervisorError::NotFound(format!(
                "agent '{}' is not registered",
                config.id
            )));
        }

        config.updated_at = Utc::now();
        guard.insert(config.id.clone(), config);
        Ok(())
    }

    /// Remove an agent configuration.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &AgentId) -> SupervisorResult<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| SupervisorError::Internal("registry lock poisoned".into()))?;

        if guard.remove(id).is_none() {
            return Err(SupervisorError::NotFound(format!("agent '{id}' is not registered")));
        }
        Ok(())
    }

    /// Fetch a snapshot of one agent's configuration.
    ///
    /// Returns an owned clone so callers cannot mutate registry state
    /// through the handle (§4.1: "callers must not mutate").
    pub fn get(&self, id: &AgentId) -> SupervisorResult<AgentConfiguration> {
        let guard = self
            .inner
            .read()
            .map_err(|_| SupervisorError::Internal("registry lock poisoned".into()))?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(format!("agent '{id}' is not registered")))
    }

    /// List all registered agent configurations.
    pub fn list(&self) -> SupervisorResult<Vec<AgentConfiguration>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| SupervisorError::Internal("registry lock poisoned".into()))?;
        Ok(guard.values().cloned().collect())
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Whether the registry holds no agents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate a configuration, logging (but not rejecting) the §4.1
/// mismatched-JSON-RPC-pattern warning.
fn validate_with_warnings(config: &AgentConfiguration) -> SupervisorResult<()> {
    config.validate()?;
    if config.has_mismatched_json_rpc_patterns() {
        warn!(
            agent_id = %config.id,
            "input_pattern/output_pattern disagree about json-rpc framing; accepted with a warning"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use std::path::PathBuf;
    use supervisor_types::{AccessType, AgentMode, InputPattern, OutputPattern};

    fn config(id: &str) -> AgentConfiguration {
        let now = Utc::now();
        AgentConfiguration {
            id: AgentId::from(id),
            name: id.to_string(),
            agent_type: "cli-tool".into(),
            executable_path: PathBuf::from("/usr/bin/true"),
            working_directory: None,
            env: Map::new(),
            cli_args: Map::new(),
            input_pattern: InputPattern::Stdin,
            output_pattern: OutputPattern::Stdout,
            input_file_template: None,
            output_file_template: None,
            mode: AgentMode::Task,
            access_type: AccessType::ReadOnly,
            max_concurrent_executions: 5,
            timeout_secs: 30,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn register_rejects_duplicate_ids() {
        let registry = AgentRegistry::new();
        registry.register(config("a")).unwrap();
        let err = registry.register(config("a")).unwrap_err();
        assert!(matches!(err, SupervisorError::Conflict(_)));
    }

    #[test]
    fn update_requires_prior_existence() {
        let registry = AgentRegistry::new();
        let err = registry.update(config("a")).unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound(_)));
    }

    #[test]
    fn get_returns_snapshot_not_shared_state() {
        let registry = AgentRegistry::new();
        registry.register(config("a")).unwrap();
        let mut snap = registry.get(&AgentId::from("a")).unwrap();
        snap.name = "mutated locally".into();
        assert_eq!(registry.get(&AgentId::from("a")).unwrap().name, "a");
    }

    #[test]
    fn delete_removes_agent_and_is_idempotent_failure() {
        let registry = AgentRegistry::new();
        registry.register(config("a")).unwrap();
        registry.delete(&AgentId::from("a")).unwrap();
        assert!(registry.get(&AgentId::from("a")).is_err());
        assert!(registry.delete(&AgentId::from("a")).is_err());
    }

    #[test]
    fn register_rejects_invalid_concurrency_invariant() {
        let registry = AgentRegistry::new();
        let mut cfg = config("a");
        cfg.access_type = AccessType::ReadWrite;
        cfg.max_concurrent_executions = 3;
        assert!(registry.register(cfg).is_err());
    }

    #[test]
    fn list_reflects_all_registered_agents() {
        let registry = AgentRegistry::new();
        registry.register(config("a")).unwrap();
        registry.register(config("b")).unwrap();
        let mut ids: Vec<String> = registry.list().unwrap().into_iter().map(|c| c.id.0).collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
