//! rig-panel: human-in-the-loop panel interview reports for Rig
//!
//! A topic goes in; a cited report comes out. Along the way the run:
//! - distills design requirements for the topic
//! - assembles a panel of developer personas
//! - interviews every persona concurrently, grounding each answer in web
//!   and encyclopedia evidence
//! - writes a body, introduction and conclusion from the interview memos
//!
//! A reviewer approves or revises the requirements and the panel. The run
//! pauses (and checkpoints) before each review and resumes with the feedback.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rig::providers::openai::Client;
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig_panel::{
//!     EvidenceSources, LLMConfig, ReportWorkflow, RigCompletionService, RunInput, RunOutcome,
//!     TavilySearch, WikipediaSearch,
//! };
//!
//! let agent = Client::from_env().agent("gpt-4.1").build();
//! let llm = Arc::new(RigCompletionService::new(agent, LLMConfig::new("gpt-4.1")));
//! let evidence = EvidenceSources::new(
//!     Arc::new(TavilySearch::from_env()?),
//!     Arc::new(WikipediaSearch::new()),
//! );
//!
//! let mut run = ReportWorkflow::builder(llm, evidence).build()?;
//! let mut outcome = run.start(RunInput::new("habit-tracking app", 3)).await?;
//! while let RunOutcome::Interrupted { .. } = outcome {
//!     outcome = run.resume(None).await?;
//! }
//! println!("{}", outcome.final_report().unwrap_or_default());
//! ```

pub mod compat;
pub mod config;
pub mod error;
pub mod evidence;
pub mod llm;
pub mod pregel;
pub mod report;
pub mod state;
pub mod workflow;

pub use compat::RigCompletionService;
pub use config::ReportConfig;
pub use error::ReportError;
pub use evidence::{
    EvidenceDocument, EvidenceLookup, EvidenceProvider, EvidenceSources, LookupError, TavilySearch,
    WikipediaSearch,
};
pub use llm::{complete_as, CompletionService, LLMConfig, OutputSchema, StructuredOutput, TokenUsage};
pub use report::{
    InterviewState, Persona, ReportWorkflow, ReportWorkflowBuilder, RunInput, RunOutcome, RunState,
};
pub use state::{Message, Role};
