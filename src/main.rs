//! agentflow - Main Entry Point
//!
//! Drives one pipeline run from the terminal: agent outputs land in review
//! files, and the operator submits, fixes or retries from a small prompt.

use agentflow::audit::AuditWriter;
use agentflow::config::PipelineConfig;
use agentflow::observability::{init_default_logging, LogFormat};
use agentflow::pipeline::{
    AgentName, LoggingObserver, PipelineController, PipelineEvent, PipelineEventPayload,
    PipelineHandle, PipelineInputs, ReviewOutcome,
};
use agentflow::review::{FileReviewSurface, ReviewGate, ReviewSubmission};
use agentflow::service::{HttpAgentInvoker, HttpValidationService, ServiceConfig};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, Level};

/// Human-reviewed multi-agent pipeline orchestrator
#[derive(Parser)]
#[command(name = "agentflow")]
#[command(about = "Run a sequence of agents with a human review checkpoint after each")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a run and drive it interactively
    Run {
        /// Project title
        #[arg(short, long)]
        title: String,

        /// File holding the requirements text
        #[arg(short, long, value_name = "FILE")]
        requirements: Option<PathBuf>,

        /// File holding additional context
        #[arg(long, value_name = "FILE")]
        context: Option<PathBuf>,

        /// Comma-separated agent sequence, overriding the configured one
        #[arg(short, long, value_delimiter = ',')]
        agents: Option<Vec<String>>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// List the agent catalog and dependencies
    Agents,
}

const PROMPT_HELP: &str =
    "commands: submit | fix <task> | set <agent> <task> <json> | retry | status | abandon | quit";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    init_default_logging(default_level, LogFormat::Compact);

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run {
            title,
            requirements,
            context,
            agents,
        } => run_pipeline(config, title, requirements, context, agents).await,
        Commands::Config { show } => handle_config_command(config, show),
        Commands::Agents => list_agents(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(PipelineConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["agentflow.toml", "config/agentflow.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(PipelineConfig::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using defaults");
            Ok(PipelineConfig::default())
        }
    }
}

fn read_optional(path: &Option<PathBuf>) -> Result<String, Box<dyn std::error::Error>> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()).into()),
        None => Ok(String::new()),
    }
}

/// Bootstrap: build the controller with its HTTP collaborators
fn build_controller(config: &PipelineConfig) -> Result<PipelineHandle, Box<dyn std::error::Error>> {
    let mut service = ServiceConfig::from_section(&config.service)?;
    if let Some(token) = config.get_api_token()? {
        service = service.with_api_token(token);
    }

    let mut surface = FileReviewSurface::new(config.review.directory.clone());
    if let Some(editor) = &config.review.editor {
        surface = surface.with_editor(editor.clone());
    }

    let mut controller = PipelineController::new(
        config.catalog()?,
        Arc::new(HttpAgentInvoker::new(service.clone())?),
        Arc::new(HttpValidationService::new(service)?),
        Arc::new(surface),
    )
    .with_observer(Arc::new(LoggingObserver));

    if let Some(directory) = &config.audit.directory {
        controller = controller.with_audit(AuditWriter::new(directory.clone()));
    }

    Ok(controller.spawn())
}

async fn run_pipeline(
    config: PipelineConfig,
    title: String,
    requirements: Option<PathBuf>,
    context: Option<PathBuf>,
    agents: Option<Vec<String>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let sequence = match agents {
        Some(names) => names
            .iter()
            .map(|name| AgentName::new(name.trim()))
            .collect::<Result<Vec<_>, _>>()?,
        None => config.sequence()?,
    };
    let inputs = PipelineInputs::new(
        title,
        read_optional(&requirements)?,
        read_optional(&context)?,
        sequence,
    );

    let handle = build_controller(&config)?;
    let mut events = handle.subscribe();
    let run_id = handle.start(inputs).await?;
    info!(run_id = %run_id, "Run started");
    println!("{PROMPT_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", event.summary());
                    if print_event_detail(&event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    println!("({missed} events skipped)");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_prompt(&handle, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
            _ = signal::ctrl_c() => {
                info!("Received Ctrl-C, abandoning run");
                handle.abandon().await?;
                break;
            }
        }
    }

    Ok(())
}

/// Print follow-up information for an event. Returns true once the run is over.
fn print_event_detail(event: &PipelineEvent) -> bool {
    match &event.payload {
        PipelineEventPayload::RunCompleted { .. } | PipelineEventPayload::RunAbandoned => true,
        PipelineEventPayload::RunFailed { .. } => {
            println!("type 'retry' to re-dispatch or 'quit' to stop");
            false
        }
        PipelineEventPayload::AwaitingReview { .. } => {
            println!("edit the review file, then type 'submit'");
            false
        }
        _ => false,
    }
}

/// Execute one prompt line. Returns false when the operator quits.
async fn handle_prompt(handle: &PipelineHandle, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let result = match words.next() {
        None => Ok(()),
        Some("quit") | Some("exit") => return false,
        Some("submit") => submit(handle).await,
        Some("fix") => match words.next() {
            Some(task) => fix_from_file(handle, task).await,
            None => Err("usage: fix <task>".into()),
        },
        Some("set") => {
            let (agent, task) = (words.next(), words.next());
            let value: Vec<&str> = words.collect();
            match (agent, task) {
                (Some(agent), Some(task)) if !value.is_empty() => {
                    set_task(handle, agent, task, &value.join(" ")).await
                }
                _ => Err("usage: set <agent> <task> <json>".into()),
            }
        }
        Some("retry") => handle.retry().await.map_err(Into::into),
        Some("status") => status(handle).await,
        Some("abandon") => handle.abandon().await.map_err(Into::into),
        Some(other) => Err(format!("unknown command '{other}'. {PROMPT_HELP}").into()),
    };

    if let Err(e) = result {
        println!("error: {e}");
    }
    true
}

async fn current_agent(
    handle: &PipelineHandle,
) -> Result<(AgentName, Option<String>), Box<dyn std::error::Error>> {
    let snapshot = handle.snapshot().await?;
    match snapshot.current_agent {
        Some(agent) => Ok((agent, snapshot.review_location)),
        None => Err(format!("nothing to review (status: {})", snapshot.status).into()),
    }
}

async fn submit(handle: &PipelineHandle) -> Result<(), Box<dyn std::error::Error>> {
    let (agent, _) = current_agent(handle).await?;
    let outcome = handle
        .submit_review(agent, ReviewSubmission::FromSurface)
        .await?;
    print_outcome(&outcome);
    Ok(())
}

async fn fix_from_file(
    handle: &PipelineHandle,
    task: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (agent, location) = current_agent(handle).await?;
    let location = location.ok_or("no review file for the current agent")?;
    let text = tokio::fs::read_to_string(Path::new(&location)).await?;
    let output = ReviewGate::parse(&agent, &text)?;
    let value = output
        .get(task)
        .cloned()
        .ok_or_else(|| format!("task '{task}' not found in {location}"))?;
    let outcome = handle.correct_task(agent, task, value).await?;
    print_outcome(&outcome);
    Ok(())
}

async fn set_task(
    handle: &PipelineHandle,
    agent: &str,
    task: &str,
    json: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = AgentName::new(agent)?;
    let value: Value = serde_json::from_str(json)?;
    let outcome = handle.correct_task(agent, task, value).await?;
    print_outcome(&outcome);
    Ok(())
}

async fn status(handle: &PipelineHandle) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = handle.snapshot().await?;
    println!("status: {}", snapshot.status);
    if let Some(agent) = &snapshot.current_agent {
        println!("agent: {agent}");
    }
    if let Some(location) = &snapshot.review_location {
        println!("review file: {location}");
    }
    if !snapshot.pending_tasks.is_empty() {
        println!("unvalidated tasks: {}", snapshot.pending_tasks.join(", "));
    }
    let finalized: Vec<&str> = snapshot.outputs.agents().map(AgentName::as_str).collect();
    println!("finalized: {}", finalized.join(", "));
    Ok(())
}

fn print_outcome(outcome: &ReviewOutcome) {
    match outcome {
        ReviewOutcome::Advanced { finalized, next } => {
            println!("{finalized} accepted, {next} dispatched");
        }
        ReviewOutcome::Completed => println!("all agents accepted"),
        ReviewOutcome::Pending {
            failed,
            pending_tasks,
            submitted,
        } => {
            for failure in failed {
                println!("  {} rejected: {}", failure.task, failure.message);
            }
            if !pending_tasks.is_empty() {
                println!("  still unvalidated: {}", pending_tasks.join(", "));
            }
            if !submitted {
                println!("  type 'submit' when the review is done");
            }
        }
        ReviewOutcome::Corrected {
            agent,
            task,
            changed,
        } => {
            if *changed {
                println!("{agent}.{task} updated");
            } else {
                println!("{agent}.{task} unchanged");
            }
        }
    }
}

fn handle_config_command(
    config: PipelineConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

fn list_agents(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = config.catalog()?;
    for spec in catalog.specs() {
        let deps: Vec<&str> = spec.depends_on.iter().map(AgentName::as_str).collect();
        if deps.is_empty() {
            println!("{}", spec.name);
        } else {
            println!("{} <- {}", spec.name, deps.join(", "));
        }
    }
    Ok(())
}
