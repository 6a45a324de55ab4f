//! skillrun CLI - grouped LLM extraction

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use serde_json::Value;

use skillrun::config::CheckpointBackend;
use skillrun::loader::load_task_set_dir;
use skillrun::process::ValidationEngine;
use skillrun::{
    CheckpointStore, EngineConfig, EngineError, ExecutionEngine, ExecutionRequest,
    ExecutionResponse, FileCheckpointStore, FixSuggestion, HttpClientFactory,
    MemoryCheckpointStore, ResponseStatus, TaskSetRegistry,
};

#[derive(Parser)]
#[command(name = "skillrun")]
#[command(about = "skillrun - grouped LLM extraction with validation and human review")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/skillrun/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Task-set root directory (overrides config)
    #[arg(long, global = true)]
    skills: Option<PathBuf>,

    /// Checkpoint directory (overrides config)
    #[arg(long, global = true)]
    checkpoint_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a document through a task set
    Run {
        /// Task set id
        task_set: String,

        /// Document file
        document: PathBuf,

        /// Override default vendor (anthropic, openai, gemini, mock)
        #[arg(short, long)]
        vendor: Option<String>,

        /// Override default model
        #[arg(short, long)]
        model: Option<String>,

        /// Use this execution id instead of a generated one
        #[arg(long)]
        execution_id: Option<String>,
    },

    /// Run and print progress events as JSON lines
    Stream {
        task_set: String,
        document: PathBuf,
        #[arg(short, long)]
        vendor: Option<String>,
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Resume an execution paused for human review
    Resume {
        execution_id: String,

        /// Reviewer feedback as JSON
        #[arg(short, long)]
        feedback: Option<String>,
    },

    /// Print the stored state of an execution
    Show { execution_id: String },

    /// Check a task-set directory (parse, prompts, rules, output shape)
    Validate { dir: PathBuf },

    /// Delete finished checkpoints older than the retention window
    Purge {
        /// Retention in days (overrides config)
        #[arg(long)]
        days: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(suggestion) = e
                .downcast_ref::<EngineError>()
                .and_then(|err| err.fix_suggestion())
            {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

/// Returns Ok(false) when the command ran but the execution failed
async fn dispatch(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run {
            task_set,
            document,
            vendor,
            model,
            execution_id,
        } => {
            let engine = build_engine(&config)?;
            let mut request = request(&task_set, &document, vendor, model).await?;
            request.execution_id = execution_id;
            let response = engine.execute(request).await;
            Ok(report(&response)?)
        }

        Commands::Stream {
            task_set,
            document,
            vendor,
            model,
        } => {
            let engine = build_engine(&config)?;
            let request = request(&task_set, &document, vendor, model).await?;
            let mut stream = engine.stream_execute(request);
            while let Some(event) = stream.next().await {
                println!("{}", serde_json::to_string(&event)?);
            }
            let response = stream.finish().await?;
            Ok(report(&response)?)
        }

        Commands::Resume {
            execution_id,
            feedback,
        } => {
            let feedback: Option<Value> = feedback
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .context("--feedback must be valid JSON")?;
            let engine = build_engine(&config)?;
            let response = engine.resume(&execution_id, feedback).await?;
            Ok(report(&response)?)
        }

        Commands::Show { execution_id } => {
            let store = build_store(&config)?;
            let state = store
                .load(&execution_id)
                .await?
                .ok_or_else(|| EngineError::ExecutionNotFound {
                    execution_id: execution_id.clone(),
                })?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(true)
        }

        Commands::Validate { dir } => {
            validate_dir(&dir)?;
            Ok(true)
        }

        Commands::Purge { days } => {
            let store = build_store(&config)?;
            let retention = match days {
                Some(days) => std::time::Duration::from_secs(days * 86_400),
                None => config.retention(),
            };
            let purged = store.purge_expired(retention).await?;
            eprintln!("{} Purged {} checkpoint(s)", "✓".green(), purged);
            Ok(true)
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    }
    .with_env();

    if let Some(skills) = &cli.skills {
        config.skills.path = skills.clone();
    }
    if let Some(dir) = &cli.checkpoint_dir {
        config.checkpoint.dir = dir.clone();
    }
    Ok(config)
}

fn build_store(config: &EngineConfig) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    let store: Arc<dyn CheckpointStore> = match config.checkpoint.backend {
        CheckpointBackend::File => Arc::new(FileCheckpointStore::new(&config.checkpoint.dir)?),
        CheckpointBackend::Memory => Arc::new(MemoryCheckpointStore::new()),
    };
    Ok(store)
}

fn build_engine(config: &EngineConfig) -> anyhow::Result<ExecutionEngine> {
    let registry = TaskSetRegistry::from_dir(&config.skills.path)
        .with_context(|| format!("loading task sets from {}", config.skills.path.display()))?;
    let clients = HttpClientFactory::new(config.api_keys());

    Ok(ExecutionEngine::new(
        Arc::new(registry),
        build_store(config)?,
        Arc::new(clients),
        config.engine_settings(),
    ))
}

async fn request(
    task_set: &str,
    document: &Path,
    vendor: Option<String>,
    model: Option<String>,
) -> anyhow::Result<ExecutionRequest> {
    let text = tokio::fs::read_to_string(document)
        .await
        .with_context(|| format!("reading {}", document.display()))?;
    let mut request = ExecutionRequest::new(text, task_set);
    request.vendor = vendor;
    request.model = model;
    Ok(request)
}

/// Print the response as JSON on stdout and a status line on stderr
fn report(response: &ExecutionResponse) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(response)?);

    let label = match response.status {
        ResponseStatus::Completed => "completed".green(),
        ResponseStatus::Partial => "partial".yellow(),
        ResponseStatus::Paused => "paused".cyan(),
        ResponseStatus::Failed => "failed".red(),
    };
    eprintln!(
        "{} Execution {} {} ({} ms, {} tokens)",
        "→".cyan(),
        response.execution_id.bold(),
        label.bold(),
        response.metadata.processing_time_ms,
        response.metadata.token_usage.total
    );
    if let Some(error) = &response.error {
        eprintln!("  {}", error.dimmed());
    }
    if response.is_paused() {
        eprintln!(
            "  {} skillrun resume {}",
            "Next:".yellow(),
            response.execution_id
        );
    }

    Ok(response.status != ResponseStatus::Failed)
}

fn validate_dir(dir: &Path) -> Result<(), EngineError> {
    let task_set = load_task_set_dir(dir)?;
    ValidationEngine::new(task_set.output_shape.as_ref(), &task_set.validation_rules)?;

    let plan = task_set.group_plan();
    println!("{} Task set '{}' is valid", "✓".green(), task_set.id);
    println!("  Version: {}", task_set.version);
    println!("  Merge: {}", task_set.merge_strategy);
    for (group, tasks) in &plan {
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        println!("  Group {}: {}", group, ids.join(", "));
    }
    let disabled = task_set.tasks.len() - plan.values().map(Vec::len).sum::<usize>();
    if disabled > 0 {
        println!("  Disabled: {}", disabled);
    }
    println!("  Rules: {}", task_set.validation_rules.len());
    println!(
        "  Output shape: {}",
        if task_set.output_shape.is_some() { "yes" } else { "no" }
    );
    Ok(())
}
