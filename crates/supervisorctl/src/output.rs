//! Result rendering: `table`, `simple`, `json` (§4.6, §6).

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use supervisor_types::{AgentStatus, BatchOperationResult, ProcessState};

/// The three output formats the CLI surface documents (§6); a config value
/// of `yaml` (listed in §6's client option table but not a documented CLI
/// flag value) falls back to `json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Simple,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "simple" => Ok(Self::Simple),
            "json" | "yaml" => Ok(Self::Json),
            other => Err(anyhow::anyhow!("unknown output format '{other}'")),
        }
    }
}

fn colorize_state(state: ProcessState, colors: bool) -> String {
    let text = format!("{state:?}").to_uppercase();
    if !colors {
        return text;
    }
    match state {
        ProcessState::Running => text.green().to_string(),
        ProcessState::Starting | ProcessState::Stopping => text.yellow().to_string(),
        ProcessState::Fatal | ProcessState::Failed => text.red().to_string(),
        ProcessState::Stopped | ProcessState::Exited => text.normal().to_string(),
    }
}

/// Render a list of agent statuses.
pub fn render_statuses(statuses: &[AgentStatus], format: OutputFormat, colors: bool) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(statuses).unwrap_or_default(),
        OutputFormat::Simple => statuses
            .iter()
            .map(|s| format!("{}\t{}\t{}", s.name, colorize_state(s.state, colors), s.pid))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["NAME", "STATE", "PID", "UPTIME (s)"]);
            for s in statuses {
                table.add_row(vec![
                    Cell::new(&s.name),
                    Cell::new(colorize_state(s.state, colors)),
                    Cell::new(s.pid),
                    Cell::new(s.uptime_seconds),
                ]);
            }
            table.to_string()
        }
    }
}

/// Render a batch of lifecycle-operation results, with the §3
/// total/succeeded/failed/duration summary.
pub fn render_operation_results(batch: &BatchOperationResult, format: OutputFormat, colors: bool) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(batch).unwrap_or_default(),
        OutputFormat::Simple => {
            let mut lines = batch
                .results
                .iter()
                .map(|r| format!("{}\t{}\t{}", r.agent_id, paint_outcome(r.success, colors), r.message))
                .collect::<Vec<_>>();
            lines.push(format!(
                "{}/{} succeeded ({} ms)",
                batch.succeeded, batch.total, batch.duration_ms
            ));
            lines.join("\n")
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["AGENT", "RESULT", "MESSAGE", "DURATION (ms)"]);
            for r in &batch.results {
                table.add_row(vec![
                    Cell::new(&r.agent_id),
                    Cell::new(paint_outcome(r.success, colors)),
                    Cell::new(&r.message),
                    Cell::new(r.duration_ms),
                ]);
            }
            let mut rendered = table.to_string();
            rendered.push_str(&format!(
                "\n{}/{} succeeded, total {} ms",
                batch.succeeded, batch.total, batch.duration_ms
            ));
            rendered
        }
    }
}

fn paint_outcome(success: bool, colors: bool) -> String {
    let text = if success { "OK" } else { "FAILED" };
    if !colors {
        return text.to_string();
    }
    if success {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_documented_formats() {
        assert_eq!(OutputFormat::from_str("table").unwrap(), OutputFormat::Table);
        assert_eq!(OutputFormat::from_str("SIMPLE").unwrap(), OutputFormat::Simple);
        assert_eq!(OutputFormat::from_str("json").unwrap(), OutputFormat::Json);
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(OutputFormat::from_str("xml").is_err());
    }

    #[test]
    fn json_rendering_round_trips_through_serde() {
        let status = AgentStatus {
            agent_id: supervisor_types::AgentId::from("a"),
            name: "a".into(),
            state: ProcessState::Running,
            pid: 42,
            description: String::new(),
            uptime_seconds: 5,
            last_transition: chrono::Utc::now(),
        };
        let rendered = render_statuses(&[status], OutputFormat::Json, false);
        assert!(rendered.contains("\"RUNNING\""));
        assert!(rendered.contains("42"));
    }
}
