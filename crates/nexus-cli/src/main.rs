//! `nexus`: run NexusFS agent tasks from the command line.

mod config;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use config::{BatchFile, LogFormat, LoggingConfig, NexusConfig};
use nexus_orchestrator::{
    AgentKind, Orchestrator, Parameters, TaskDescriptor, TaskHandle, TaskPriority, TaskStatus,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nexus", about = "NexusFS filesystem agent orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nexus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single task inline and print it as JSON
    Run {
        /// Agent kind (organizer, cleanup, search, monitor, repair, backup)
        kind: AgentKind,
        /// Task parameter as key=value; values are parsed as JSON when possible
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
        /// Free-form description
        #[arg(short, long, default_value = "")]
        description: String,
        /// low, normal, high or critical
        #[arg(long, default_value = "normal")]
        priority: TaskPriority,
    },
    /// Queue every task of a TOML batch file and run them on the worker pool
    Batch {
        /// File with [[tasks]] entries
        file: PathBuf,
        /// Number of workers (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Print the orchestrator status and effective configuration
    Status,
}

/// Parse `key=value`. The value is taken as JSON if it parses, else as a string.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn task_summary(handle: &TaskHandle) -> Value {
    let task = handle.snapshot();
    json!({
        "id": task.id(),
        "kind": task.kind(),
        "description": task.description(),
        "status": task.status(),
        "duration_ms": task.duration_ms(),
        "error": task.error(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = NexusConfig::load_or_default(&cli.config)?;
    init_tracing(&config.logging);

    let orchestrator = Orchestrator::new(config.orchestrator.clone());
    orchestrator.register_all_agents();

    match cli.command {
        Commands::Run {
            kind,
            params,
            description,
            priority,
        } => {
            let parameters: Parameters = params.into_iter().collect();
            let task = TaskDescriptor::new(kind)
                .with_description(description)
                .with_priority(priority)
                .with_parameters(parameters);

            let done = orchestrator.execute_task(task).await;
            println!("{}", serde_json::to_string_pretty(&done)?);
            if done.status() != TaskStatus::Completed {
                bail!(
                    "task {} {}: {}",
                    done.id(),
                    done.status(),
                    done.error().unwrap_or("no error recorded")
                );
            }
        }
        Commands::Batch { file, workers } => {
            let batch = BatchFile::load(&file)?;
            if batch.tasks.is_empty() {
                println!("No tasks in {}", file.display());
                return Ok(());
            }

            let handles = batch
                .tasks
                .into_iter()
                .map(|task| orchestrator.submit_task(task.into_descriptor()))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to queue batch")?;

            let workers = workers.unwrap_or(config.orchestrator.workers);
            info!(tasks = handles.len(), workers, "Running batch");
            orchestrator.start(workers);
            orchestrator.wait_until_idle().await;
            orchestrator.stop().await;

            let failed = handles
                .iter()
                .filter(|h| h.status() != TaskStatus::Completed)
                .count();
            let report = json!({
                "tasks": handles.iter().map(task_summary).collect::<Vec<_>>(),
                "completed": handles.len() - failed,
                "failed": failed,
                "agents": orchestrator.monitor().to_json().await,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            if failed > 0 {
                bail!("{failed} of {} task(s) did not complete", handles.len());
            }
        }
        Commands::Status => {
            let report = json!({
                "status": orchestrator.get_status(),
                "config": {
                    "workers": config.orchestrator.workers,
                    "history_capacity": config.orchestrator.history_capacity,
                    "agent_history_capacity": config.orchestrator.agent_history_capacity,
                    "queue_capacity": config.orchestrator.queue_capacity,
                    "task_timeout_secs": config.orchestrator.task_timeout_secs,
                    "unregistered_agent": config.orchestrator.unregistered_agent,
                },
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_types() {
        assert_eq!(parse_param("path=/tmp/x").unwrap(), ("path".into(), json!("/tmp/x")));
        assert_eq!(parse_param("dry_run=false").unwrap().1, json!(false));
        assert_eq!(parse_param("max_results=5").unwrap().1, json!(5));
        assert_eq!(parse_param("query=a=b").unwrap().1, json!("a=b"));
    }

    #[test]
    fn test_parse_param_rejects_malformed() {
        assert!(parse_param("no-equals").is_err());
        assert!(parse_param("=value").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "nexus", "run", "search", "-p", "path=/srv", "-p", "query=report", "--priority", "high",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                kind,
                params,
                priority,
                ..
            } => {
                assert_eq!(kind, AgentKind::Search);
                assert_eq!(params.len(), 2);
                assert_eq!(priority, TaskPriority::High);
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.config, PathBuf::from("nexus.toml"));
    }

    #[test]
    fn test_cli_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["nexus", "run", "defrag"]).is_err());
    }
}
