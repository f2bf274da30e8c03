//! NornFlow CLI — runs declarative task workflows against a fleet of hosts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use nornflow::error::{print_error, NornFlowError};
use nornflow::orchestrator::{build_store, Orchestrator};
use nornflow::{EngineConfig, HookRegistry, Inventory, MockHostRunner, TaskCatalog, TemplateService, Workflow};

#[derive(Parser)]
#[command(name = "nornflow")]
#[command(about = "Workflow engine for running declarative task sequences against a fleet of network devices")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log verbosity: error, warn, info, debug, trace. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Load additional environment-layer variables from a `KEY=VALUE` file.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file against an inventory
    Run {
        /// Path to the workflow YAML file
        workflow: PathBuf,

        /// Path to the inventory YAML file
        #[arg(long)]
        inventory: PathBuf,

        /// Directory of domain-default YAML files, merged below everything else
        #[arg(long)]
        domain_defaults_dir: Option<PathBuf>,

        /// `name=value` pairs bound at CLI-layer precedence (repeatable)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Force dry-run regardless of the workflow's own `dry_run:` setting
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a workflow file without running it
    Validate {
        /// Path to the workflow YAML file
        workflow: PathBuf,

        /// Path to the inventory YAML file
        #[arg(long)]
        inventory: PathBuf,
    },
    /// List the built-in task catalog
    ListTasks,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn init_logging(log_level: &Option<String>) {
    let filter = log_level
        .clone()
        .unwrap_or_else(|| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn load_env_file(path: &Option<PathBuf>) -> Result<Map<String, Value>, NornFlowError> {
    let mut env = Map::new();
    let Some(path) = path else {
        return Ok(env);
    };
    let text = std::fs::read_to_string(path)?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            env.insert(k.trim().to_string(), Value::String(v.trim().to_string()));
        }
    }
    Ok(env)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&e);
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32, NornFlowError> {
    let environment = load_env_file(&cli.env_file)?;

    match cli.command {
        Commands::ListTasks => {
            let catalog = TaskCatalog::with_builtins();
            for name in ["set", "echo", "write_file"] {
                if catalog.is_known(name) {
                    println!("{}", name.green());
                }
            }
            Ok(0)
        }
        Commands::Validate { workflow, inventory } => {
            let orch = build_orchestrator(&workflow, &inventory, &environment, &HashMap::new(), None, None)?;
            match orch.validate() {
                Ok(()) => {
                    println!("{}", "workflow is valid".green());
                    Ok(0)
                }
                Err(e) => {
                    print_error(&e);
                    Ok(1)
                }
            }
        }
        Commands::Run {
            workflow,
            inventory,
            domain_defaults_dir,
            vars,
            dry_run,
        } => {
            let cli_vars: HashMap<String, String> = vars.into_iter().collect();
            let orch = build_orchestrator(
                &workflow,
                &inventory,
                &environment,
                &cli_vars,
                domain_defaults_dir.as_deref(),
                // Only force dry-run when the flag is actually present; a bare
                // `Some(false)` would override a workflow file's own
                // `dry_run: true` and let it perform real side effects.
                if dry_run { Some(true) } else { None },
            )?;

            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let _ = tokio::signal::ctrl_c().await;
                    cancel.cancel();
                });
            }

            let summary = orch.run(&cancel).await?;
            print_summary(&summary);

            if summary.cancelled {
                eprintln!("{}", "run cancelled".yellow());
                Ok(130)
            } else if summary.any_failures() {
                Ok(1)
            } else {
                Ok(0)
            }
        }
    }
}

fn build_orchestrator(
    workflow_path: &std::path::Path,
    inventory_path: &std::path::Path,
    environment: &Map<String, Value>,
    cli_vars: &HashMap<String, String>,
    domain_defaults_dir: Option<&std::path::Path>,
    dry_run_override: Option<bool>,
) -> Result<Orchestrator, NornFlowError> {
    let workflow_text = std::fs::read_to_string(workflow_path)?;
    let workflow = Workflow::from_yaml(&workflow_text)?;

    let inventory_text = std::fs::read_to_string(inventory_path)?;
    let inventory = Arc::new(Inventory::from_yaml(&inventory_text)?);

    let mut config = EngineConfig::default().with_worker_cap(num_cpus_hint());
    for (k, v) in cli_vars {
        config = config.with_cli_var(k.clone(), Value::String(v.clone()));
    }
    for (k, v) in environment {
        config = config.with_environment(k.clone(), v.clone());
    }
    if let Some(dir) = domain_defaults_dir {
        config = config.with_domain_defaults_dir(dir);
    }

    let templates = Arc::new(TemplateService::new());
    let store = build_store(
        inventory.clone(),
        templates,
        config.cli_vars.into_iter().collect(),
        config.environment.into_iter().collect(),
        workflow.vars.clone(),
        config.domain_defaults_dir.as_deref(),
    )?;

    let mut orch = Orchestrator::new(
        workflow,
        inventory,
        Arc::new(TaskCatalog::with_builtins()),
        HookRegistry::with_builtins(),
        store,
        Arc::new(MockHostRunner),
        config.worker_cap,
    );
    if let Some(dry_run) = dry_run_override {
        orch = orch.with_dry_run_override(dry_run);
    }
    Ok(orch)
}

fn num_cpus_hint() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn print_summary(summary: &nornflow::RunSummary) {
    println!("{} {}", "workflow:".bold(), summary.workflow_name);
    for task_summary in &summary.task_summaries {
        let label = format!("  task '{}'", task_summary.task.name);
        if task_summary.skipped {
            println!("{} {}", label, "skipped".yellow());
            continue;
        }
        let failures = task_summary.aggregated.iter().filter(|r| r.failed).count();
        if failures == 0 {
            println!("{} {}", label, "ok".green());
        } else {
            println!(
                "{} {}",
                label,
                format!("{failures}/{} failed", task_summary.aggregated.len()).red()
            );
            for r in task_summary.aggregated.iter().filter(|r| r.failed) {
                if let Some(msg) = &r.exception {
                    println!("    {}: {}", r.host, msg.red());
                }
            }
        }
    }
}
