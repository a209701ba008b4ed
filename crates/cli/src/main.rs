//! `etl-redshift` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — check a pipeline definition and print its execution order.
//! - `run`      — execute a pipeline against a warehouse.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine::{
    registry_for, Executor, ExecutorConfig, Graph, PipelineDefinition, RunContext, RunStatus,
};
use operators::Collaborators;
use warehouse::{create_pool, EnvCredentials, PgWarehouse};

#[derive(Parser)]
#[command(
    name = "etl-redshift",
    about = "Runs S3 → Redshift ETL pipelines as dependency graphs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a pipeline definition JSON file.
    Validate {
        /// Path to the pipeline JSON file.
        path: PathBuf,
    },
    /// Run a pipeline to completion.
    Run {
        /// Path to the pipeline JSON file.
        path: PathBuf,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
        #[arg(long, default_value_t = 5)]
        max_connections: u32,
        /// Overrides the definition's `max_parallel_tasks` (0 = unlimited).
        #[arg(long)]
        max_parallel: Option<usize>,
        /// Print the full run result as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Validate { path } => validate(&path).map(|(definition, graph, _)| {
            println!(
                "✅ Pipeline '{}' is valid. Execution order: {:?}",
                definition.name,
                graph.order()
            );
            RunStatus::Success
        }),
        Command::Run {
            path,
            database_url,
            max_connections,
            max_parallel,
            json,
        } => {
            run(RunArgs {
                path,
                database_url,
                max_connections,
                max_parallel,
                json,
            })
            .await
        }
    };

    match result {
        Ok(RunStatus::Success) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Load `path`, build its graph and check its run defaults.
fn validate(path: &Path) -> anyhow::Result<(PipelineDefinition, Graph, ExecutorConfig)> {
    let definition = PipelineDefinition::load(path)
        .with_context(|| format!("cannot load pipeline {}", path.display()))?;
    let graph = definition
        .build_graph()
        .with_context(|| format!("pipeline '{}' is invalid", definition.name))?;
    let config = definition
        .executor_config()
        .with_context(|| format!("pipeline '{}' has invalid defaults", definition.name))?;
    Ok((definition, graph, config))
}

struct RunArgs {
    path: PathBuf,
    database_url: String,
    max_connections: u32,
    max_parallel: Option<usize>,
    json: bool,
}

async fn run(args: RunArgs) -> anyhow::Result<RunStatus> {
    let (definition, graph, mut config) = validate(&args.path)?;
    if let Some(max_parallel) = args.max_parallel {
        config.max_parallel_tasks = max_parallel;
    }

    let pool = create_pool(&args.database_url, args.max_connections)
        .await
        .context("failed to connect to the warehouse")?;
    let mut collaborators = Collaborators::new(
        Arc::new(PgWarehouse::new(pool)),
        Arc::new(EnvCredentials::new()),
    );
    if let Some(timeout) = definition.call_timeout() {
        collaborators = collaborators.with_call_timeout(timeout);
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    info!(pipeline = %definition.name, "starting pipeline");
    let executor = Executor::new(collaborators, config);
    let ctx = executor
        .run_until_cancelled(&graph, &registry_for(&graph), &cancel)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
    } else {
        print_report(&ctx);
    }
    Ok(ctx.status)
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, letting running tasks finish");
        cancel.cancel();
    }
}

fn print_report(ctx: &RunContext) {
    for task in ctx.tasks() {
        let took = match (task.started_at, task.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        };
        let detail = task.error.as_deref().unwrap_or("");
        println!(
            "{:<28} {:<8} attempts={} took={:?} {}",
            task.task_id,
            task.status.to_string(),
            task.attempts,
            took,
            detail
        );
    }
    let summary = ctx.summary();
    println!(
        "run {} {}: {} succeeded, {} failed, {} skipped",
        ctx.run_id, ctx.status, summary.succeeded, summary.failed, summary.skipped
    );
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::CommandFactory;

    use super::*;

    const SHIPPED: &str = include_str!("../../../pipelines/dag_etl_redshift.json");

    fn definition_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "etl-redshift",
            "run",
            "pipeline.json",
            "--database-url",
            "postgres://localhost/dev",
            "--max-parallel",
            "2",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                max_parallel,
                max_connections,
                json,
                ..
            } => {
                assert_eq!(max_parallel, Some(2));
                assert_eq!(max_connections, 5);
                assert!(json);
            }
            Command::Validate { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn validate_accepts_shipped_pipeline() {
        let file = definition_file(SHIPPED);
        let (definition, graph, config) = validate(file.path()).unwrap();
        assert_eq!(config.default_retry.max_attempts, 4);
        assert_eq!(definition.name, "dag_etl_redshift");
        assert_eq!(graph.len(), 11);
    }

    #[test]
    fn validate_rejects_cycles() {
        let file = definition_file(
            r#"{ "name": "loop", "tasks": [
                { "id": "a", "kind": "noop", "upstream": ["b"] },
                { "id": "b", "kind": "noop", "upstream": ["a"] }
            ] }"#,
        );
        let err = validate(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("pipeline 'loop' is invalid"));
    }

    #[test]
    fn validate_rejects_invalid_defaults() {
        let file = definition_file(
            r#"{ "name": "no_attempts", "defaults": { "max_attempts": 0 },
                 "tasks": [ { "id": "a", "kind": "noop" } ] }"#,
        );
        let err = validate(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("pipeline 'no_attempts' has invalid defaults"));
    }

    #[test]
    fn validate_reports_missing_file() {
        let err = validate(Path::new("/nonexistent/pipeline.json")).unwrap_err();
        assert!(err.to_string().contains("cannot load pipeline"));
    }
}
