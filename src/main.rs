//! # Panel Report Agent
//!
//! Turns a one-line product idea into a written report by interviewing a
//! panel of synthesized developer personas.
//!
//! This application demonstrates:
//! - Driving a checkpointed, human-in-the-loop workflow from a CLI
//! - Wrapping a Rig agent as the workflow's completion service
//! - CLI design with clap
//! - Structured logging with tracing
//!
//! ## Quick Start
//! ```bash
//! cargo run -- "habit-tracking app" --panel-size 3
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Configuration management
mod config;

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::{Context, Result};
use clap::Parser;
use rig::client::{CompletionClient, ProviderClient};
use rig::providers::openai;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rig_panel::pregel::CheckpointerConfig;
use rig_panel::report::{REVIEW_PERSONAS, REVIEW_REQUIREMENTS};
use rig_panel::{
    EvidenceSources, LLMConfig, ReportConfig, ReportWorkflow, RigCompletionService, RunInput, RunOutcome,
    RunState, TavilySearch, WikipediaSearch,
};

use crate::config::Config;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
/// # Rust Concept: Derive Macros with Clap
///
/// `required_unless_present` makes the topic optional only when resuming;
/// `env` lets an environment variable stand in for a flag.
#[derive(Parser, Debug)]
#[command(
    name = "panel-report-agent",
    version,
    about = "Writes a report on a product idea by interviewing a panel of developer personas",
    long_about = r#"
Panel Report Agent

Given a topic, it:
  1. Distills the product requirements          (you review them)
  2. Proposes a panel of developer personas     (you review them)
  3. Interviews every persona, citing web and encyclopedia sources
  4. Writes an introduction, a body and a conclusion from the interviews

At each review press Enter (or type "approve") to continue, or type feedback
to have that step redone. Progress is checkpointed: stop at any review and
continue later with --resume <WORKFLOW_ID>.

ENVIRONMENT:
  OPENAI_API_KEY, TAVILY_API_KEY (required), LLM_MODEL, MAX_INTERVIEW_TURNS,
  CHECKPOINT_DIR. A .env file in the working directory is read too.

EXAMPLES:
  panel-report-agent "habit-tracking app"
  panel-report-agent --panel-size 4 --max-turns 3 "offline-first notes app"
  panel-report-agent --resume 4f1c2a9e-...
"#
)]
struct Args {
    /// The product idea to write about
    #[arg(value_name = "TOPIC", required_unless_present = "resume")]
    topic: Option<String>,

    /// Maximum number of personas on the panel
    #[arg(short = 'p', long = "panel-size", default_value_t = 3)]
    panel_size: usize,

    /// Expert answers per interview (overrides MAX_INTERVIEW_TURNS)
    #[arg(short = 't', long = "max-turns")]
    max_turns: Option<usize>,

    /// Chat model to use (overrides LLM_MODEL)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Checkpoint directory (overrides CHECKPOINT_DIR)
    #[arg(long = "checkpoint-dir", value_name = "DIR")]
    checkpoint_dir: Option<PathBuf>,

    /// Compress checkpoints with zstd
    #[arg(long = "compress", default_value = "false")]
    compress: bool,

    /// Continue a paused run instead of starting a new one
    #[arg(long = "resume", value_name = "WORKFLOW_ID", conflicts_with = "topic")]
    resume: Option<String>,

    /// Print the final run state as JSON after the report
    #[arg(long = "json", default_value = "false")]
    json: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    let mut config = Config::from_env()?;
    if let Some(model) = args.model.clone() {
        config.model = model;
    }
    if let Some(turns) = args.max_turns {
        config.max_interview_turns = turns;
    }
    if let Some(dir) = args.checkpoint_dir.clone() {
        config.checkpoint_dir = dir;
    }
    config.validate()?;

    info!(
        model = %config.model,
        turns = config.max_interview_turns,
        checkpoints = %config.checkpoint_dir.display(),
        "Configuration loaded"
    );

    // The completion service is held twice: once by the workflow, once here
    // to report token usage at the end.
    let openai_key = config.openai_api_key.clone().unwrap_or_default();
    let agent = openai::Client::from_val(openai_key.into()).agent(&config.model).build();
    let llm = Arc::new(
        RigCompletionService::new(agent, LLMConfig::new(&config.model).with_temperature(0.0))
            .with_provider_name("openai"),
    );

    let tavily_key = config.tavily_api_key.clone().unwrap_or_default();
    let evidence = EvidenceSources::new(Arc::new(TavilySearch::new(tavily_key)), Arc::new(WikipediaSearch::new()));

    let mut builder = ReportWorkflow::builder(llm.clone(), evidence)
        .config(ReportConfig::default().with_max_turns(config.max_interview_turns))
        .checkpoint_store(CheckpointerConfig::File {
            path: config.checkpoint_dir.clone(),
            compression: args.compress,
        });
    if let Some(id) = &args.resume {
        builder = builder.workflow_id(id);
    }
    let mut workflow = builder.build().context("Failed to build the report workflow")?;

    let mut snapshots = workflow.subscribe();
    tokio::spawn(async move {
        while let Some((superstep, state)) = snapshots.recv().await {
            debug!(
                superstep,
                personas = state.personas.len(),
                sections = state.sections.len(),
                finished = state.final_report.is_some(),
                "Superstep finished"
            );
        }
    });

    match drive(&mut workflow, &args).await {
        Ok(state) => {
            println!("\n{}", "=".repeat(60));
            println!("REPORT");
            println!("{}\n", "=".repeat(60));
            println!("{}", state.final_report.as_deref().unwrap_or_default());
            println!("\n{}", "=".repeat(60));

            if args.json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            }

            let usage = llm.total_usage();
            info!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                total_tokens = usage.total_tokens,
                "Report completed"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, workflow_id = %workflow.workflow_id(), "Report run failed");
            eprintln!("\nReport run failed: {:#}", e);
            eprintln!(
                "Progress up to the last finished step is saved; retry with --resume {}",
                workflow.workflow_id()
            );
            Err(e)
        }
    }
}

// =============================================================================
// INTERACTIVE LOOP
// =============================================================================
/// Start or resume the run, then keep asking for feedback until it finishes.
///
/// # Rust Concept: Looping over an enum
///
/// `RunOutcome` is either `Interrupted` or `Completed`. The `loop` + `match`
/// keeps resuming while the run is paused and breaks out with the final state.
async fn drive(workflow: &mut ReportWorkflow, args: &Args) -> Result<RunState> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let mut outcome = match (&args.resume, &args.topic) {
        (Some(id), _) => {
            let Some(state) = workflow.pending_state().await? else {
                anyhow::bail!("No saved progress for run {} under the checkpoint directory", id);
            };
            match workflow.pending().await? {
                Some(at) => {
                    info!(workflow_id = %id, at = %at, "Resuming paused run");
                    let feedback = review(at.as_str(), &state, &mut stdin).await?;
                    workflow.resume(feedback).await?
                }
                // stopped by a failure; pick up after the last saved step
                None => {
                    info!(workflow_id = %id, "Continuing run from its last checkpoint");
                    workflow.resume(None).await?
                }
            }
        }
        (None, Some(topic)) => {
            info!(workflow_id = %workflow.workflow_id(), topic = %topic, "Starting report run");
            workflow.start(RunInput::new(topic.clone(), args.panel_size)).await?
        }
        (None, None) => anyhow::bail!("A topic is required unless --resume is given"),
    };

    loop {
        match outcome {
            RunOutcome::Completed(state) => return Ok(state),
            RunOutcome::Interrupted { at, state } => {
                eprintln!("(workflow id: {})", workflow.workflow_id());
                let feedback = review(at.as_str(), &state, &mut stdin).await?;
                outcome = workflow.resume(feedback).await?;
            }
        }
    }
}

/// Show what is up for review and read one line of feedback.
///
/// An empty line approves. End of input aborts; the run stays resumable.
async fn review(at: &str, state: &RunState, stdin: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    println!("\n{}", "-".repeat(60));
    match at {
        REVIEW_REQUIREMENTS => {
            println!("REQUIREMENTS for \"{}\"\n", state.topic);
            println!("{}", state.requirements.as_deref().unwrap_or("(none)"));
        }
        REVIEW_PERSONAS => {
            println!("PANEL ({} personas)\n", state.personas.len());
            for persona in &state.personas {
                println!("{}", persona.sheet());
            }
        }
        other => println!("Paused before {}", other),
    }
    println!("{}", "-".repeat(60));
    println!("Press Enter to approve, or type feedback:");

    let line = stdin
        .next_line()
        .await
        .context("Failed to read feedback from stdin")?
        .context("Input closed before feedback was given")?;

    let feedback = line.trim();
    Ok((!feedback.is_empty()).then(|| feedback.to_string()))
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` picks debug over info.
fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
