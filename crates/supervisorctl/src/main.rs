#![forbid(unsafe_code)]

//! **supervisorctl** – command-line client for the agent supervisor's HTTP
//! control plane (§4.6).
//!
//! Resolves agent name patterns against `/api/v1/agents/status`, issues the
//! matching lifecycle operation, and optionally polls until the targets
//! settle. Mirrors the teacher workspace's CLI in shape (clap subcommands,
//! `anyhow`-based error propagation, `tracing` to stderr) generalized from an
//! in-process runtime client to an HTTP client.

mod client;
mod config;
mod matcher;
mod output;

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use supervisor_types::{AgentStatus, BatchOperationResult, OperationResult, ProcessState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::{CliError, Client};
use crate::config::ClientConfig;
use crate::matcher::NamePattern;
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "supervisorctl")]
#[command(about = "Command-line client for the agent supervisor's control plane")]
#[command(version)]
struct Cli {
    /// Path to the client configuration file (overrides the §6 search path).
    #[arg(long)]
    config: Option<String>,

    /// Base URL of the control plane, overriding configuration.
    #[arg(long)]
    server_url: Option<String>,

    /// Bearer token, overriding configuration.
    #[arg(long)]
    token: Option<String>,

    /// Output format: table, simple, or json.
    #[arg(long)]
    format: Option<String>,

    /// Disable colorized output.
    #[arg(long)]
    no_colors: bool,

    /// Increase log verbosity; repeatable.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show agent process status.
    Status {
        /// Name patterns to match; no patterns means every agent.
        patterns: Vec<String>,
    },
    /// Start matching agents.
    Start {
        patterns: Vec<String>,
        /// Poll until every target reaches RUNNING (or 30s elapses).
        #[arg(short = 'w', long)]
        wait: bool,
        /// Skip the multi-match confirmation prompt.
        #[arg(short = 'F', long)]
        force: bool,
    },
    /// Stop matching agents.
    Stop {
        patterns: Vec<String>,
        /// Poll until every target reaches a terminal stopped state (or 30s elapses).
        #[arg(short = 'w', long)]
        wait: bool,
        #[arg(short = 'F', long)]
        force: bool,
    },
    /// Restart matching agents.
    Restart {
        patterns: Vec<String>,
        #[arg(short = 'w', long)]
        wait: bool,
        #[arg(short = 'F', long)]
        force: bool,
    },
    /// Follow an agent's output (declared, not yet implemented; §4.6).
    Tail { pattern: String },
    /// Stream lifecycle events (declared, not yet implemented; §4.6).
    Events,
}

#[derive(Clone, Copy)]
enum LifecycleOp {
    Start,
    Stop,
    Restart,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let config_path = cli.config.as_ref().map(PathBuf::from);
    let mut config = match ClientConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to load configuration: {e}");
            return 4;
        }
    };

    if let Some(url) = &cli.server_url {
        config.server.url = url.clone();
    }
    if let Some(token) = &cli.token {
        config.auth.token = Some(token.clone());
    }

    let format_str = cli.format.clone().unwrap_or_else(|| config.display.format.clone());
    let format = match OutputFormat::from_str(&format_str) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {e}");
            return 4;
        }
    };
    let colors = !cli.no_colors && config.display.colors;

    let timeout = Duration::from_secs(config.server.timeout_secs.clamp(1, 300));
    let client = match Client::new(config.server.url.clone(), config.auth.token.clone(), timeout) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to build HTTP client: {e}");
            return 1;
        }
    };

    match cli.command {
        Commands::Status { patterns } => cmd_status(&client, &patterns, format, colors).await,
        Commands::Start { patterns, wait, force } => {
            cmd_lifecycle(&client, LifecycleOp::Start, &patterns, wait, force, format, colors).await
        }
        Commands::Stop { patterns, wait, force } => {
            cmd_lifecycle(&client, LifecycleOp::Stop, &patterns, wait, force, format, colors).await
        }
        Commands::Restart { patterns, wait, force } => {
            cmd_lifecycle(&client, LifecycleOp::Restart, &patterns, wait, force, format, colors).await
        }
        Commands::Tail { pattern } => {
            eprintln!("tail {pattern}: not yet implemented");
            1
        }
        Commands::Events => {
            eprintln!("events: not yet implemented");
            1
        }
    }
}

async fn cmd_status(client: &Client, patterns: &[String], format: OutputFormat, colors: bool) -> i32 {
    let all = match client.list_status().await {
        Ok(v) => v,
        Err(e) => return report_client_error(&e),
    };
    let matched = match filter_by_patterns(&all, patterns) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return 4;
        }
    };
    if matched.is_empty() && !patterns.is_empty() {
        eprintln!("no agents matched");
        return 0;
    }
    println!("{}", output::render_statuses(&matched, format, colors));
    0
}

async fn cmd_lifecycle(
    client: &Client,
    op: LifecycleOp,
    patterns: &[String],
    wait: bool,
    force: bool,
    format: OutputFormat,
    colors: bool,
) -> i32 {
    let all = match client.list_status().await {
        Ok(v) => v,
        Err(e) => return report_client_error(&e),
    };
    let targets = match filter_by_patterns(&all, patterns) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return 4;
        }
    };

    if targets.is_empty() {
        eprintln!("no agents matched");
        return 0;
    }

    if targets.len() > 1 && !force && !confirm(&targets) {
        eprintln!("aborted");
        return 0;
    }

    let batch_start = std::time::Instant::now();
    let mut results = Vec::with_capacity(targets.len());
    for target in &targets {
        let outcome = match op {
            LifecycleOp::Start => client.start(&target.name).await,
            LifecycleOp::Stop => client.stop(&target.name).await,
            LifecycleOp::Restart => client.restart(&target.name).await,
        };
        match outcome {
            Ok(result) => results.push(result),
            Err(e @ (CliError::Auth(_) | CliError::Connection(_))) => return report_client_error(&e),
            Err(CliError::General(message)) => results.push(OperationResult {
                agent_id: target.agent_id.clone(),
                success: false,
                message,
                duration_ms: 0,
            }),
        }
    }

    if wait {
        wait_for_settlement(client, &targets, op).await;
    }

    let batch = BatchOperationResult::from_results(results, batch_start.elapsed().as_millis() as u64);
    let all_succeeded = batch.failed == 0;
    println!("{}", output::render_operation_results(&batch, format, colors));
    if all_succeeded {
        0
    } else {
        1
    }
}

fn filter_by_patterns(statuses: &[AgentStatus], patterns: &[String]) -> anyhow::Result<Vec<AgentStatus>> {
    if patterns.is_empty() {
        return Ok(statuses.to_vec());
    }
    let compiled = patterns.iter().map(|p| NamePattern::parse(p)).collect::<anyhow::Result<Vec<_>>>()?;
    Ok(statuses
        .iter()
        .filter(|s| compiled.iter().any(|p| p.matches(&s.name)))
        .cloned()
        .collect())
}

fn confirm(targets: &[AgentStatus]) -> bool {
    let names = targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ");
    eprint!("{} agents matched ({names}); proceed? [y/N] ", targets.len());
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Poll `/status` for every target until it settles or 30s elapses (§4.6):
/// every 1s for start/restart until `RUNNING`, every 500ms for stop until a
/// terminal stopped state.
async fn wait_for_settlement(client: &Client, targets: &[AgentStatus], op: LifecycleOp) {
    let interval = match op {
        LifecycleOp::Stop => Duration::from_millis(500),
        LifecycleOp::Start | LifecycleOp::Restart => Duration::from_secs(1),
    };
    let settled = |state: ProcessState| match op {
        LifecycleOp::Stop => state.is_terminal_stopped(),
        LifecycleOp::Start | LifecycleOp::Restart => state == ProcessState::Running,
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let mut all_settled = true;
        for target in targets {
            let reached = matches!(client.get_status(&target.name).await, Ok(status) if settled(status.state));
            if !reached {
                all_settled = false;
            }
        }
        if all_settled || tokio::time::Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

fn report_client_error(err: &CliError) -> i32 {
    eprintln!("error: {err}");
    err.exit_code()
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
