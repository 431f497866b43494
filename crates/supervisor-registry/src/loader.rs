//! YAML configuration loading.
//!
//! Agent configurations are authored as one YAML file per agent under a
//! directory and loaded in bulk at startup. A file that fails to parse or
//! validate is skipped with a warning rather than aborting the whole load,
//! so one bad file doesn't take down every other agent.

use std::fs;
use std::path::Path;

use supervisor_types::{AgentConfiguration, SupervisorError, SupervisorResult};
use tracing::{debug, info, warn};

/// Load a single agent configuration file and validate it.
pub fn load_configuration_file(path: &Path) -> SupervisorResult<AgentConfiguration> {
    let contents = fs::read_to_string(path).map_err(|e| {
        SupervisorError::Validation(format!("failed to read {}: {e}", path.display()))
    })?;

    let config: AgentConfiguration = serde_yaml::from_str(&contents).map_err(|e| {
        SupervisorError::Validation(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.validate()?;
    Ok(config)
}

/// Load every `.yaml`/`.yml` file in `dir` as an [`AgentConfiguration`].
///
/// Files that fail to parse or validate are logged and skipped; the call
/// only fails outright if `dir` itself cannot be read.
pub fn load_configurations_from_directory(dir: &Path) -> SupervisorResult<Vec<AgentConfiguration>> {
    info!(dir = %dir.display(), "loading agent configurations");

    if !dir.exists() {
        return Err(SupervisorError::Validation(format!(
            "agent configuration directory does not exist: {}",
            dir.display()
        )));
    }

    let entries = fs::read_dir(dir).map_err(|e| {
        SupervisorError::Validation(format!("failed to read directory {}: {e}", dir.display()))
    })?;

    let mut configs = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("failed to read directory entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        if !path
            .extension()
            .map(|ext| ext == "yaml" || ext == "yml")
            .unwrap_or(false)
        {
            continue;
        }

        match load_configuration_file(&path) {
            Ok(config) => {
                debug!(agent_id = %config.id, path = %path.display(), "loaded agent configuration");
                configs.push(config);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping invalid agent configuration");
            }
        }
    }

    if configs.is_empty() {
        warn!(dir = %dir.display(), "no valid agent configurations found");
    } else {
        info!(count = configs.len(), "loaded agent configurations");
    }

    Ok(configs)
}
