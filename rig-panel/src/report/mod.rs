//! Panel interview report workflow
//!
//! # Workflow Structure
//!
//! ```text
//! process_requirements ─▶ ‖review_requirements‖ ──┬─▶ (revise) process_requirements
//!                                                 └─▶ create_personas
//! create_personas ─▶ ‖review_personas‖ ──┬─▶ (revise) create_personas
//!                                        └─▶ conduct_interviews (one interview per persona)
//! conduct_interviews ─┬─▶ write_body ─────────┐
//!                     ├─▶ write_introduction ─┼─▶ finalize_report ─▶ END
//!                     └─▶ write_conclusion ───┘
//! ```
//!
//! `‖node‖` marks a pause-before checkpoint: the run stops there until it is
//! resumed with reviewer feedback.

pub mod assembly;
pub mod finalize;
pub mod interview;
pub mod planning;
pub mod prompts;
pub mod review;
pub mod schema;
pub mod state;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub const PROCESS_REQUIREMENTS: &str = "process_requirements";
pub const REVIEW_REQUIREMENTS: &str = "review_requirements";
pub const CREATE_PERSONAS: &str = "create_personas";
pub const REVIEW_PERSONAS: &str = "review_personas";
pub const CONDUCT_INTERVIEWS: &str = "conduct_interviews";
pub const WRITE_BODY: &str = "write_body";
pub const WRITE_INTRODUCTION: &str = "write_introduction";
pub const WRITE_CONCLUSION: &str = "write_conclusion";
pub const FINALIZE_REPORT: &str = "finalize_report";

// interview sub-workflow
pub const ASK_QUESTION: &str = "ask_question";
pub const SEARCH_WEB: &str = "search_web";
pub const SEARCH_ENCYCLOPEDIA: &str = "search_encyclopedia";
pub const ANSWER_QUESTION: &str = "answer_question";
pub const SAVE_INTERVIEW: &str = "save_interview";
pub const WRITE_SECTION: &str = "write_section";

pub use assembly::{AssemblyPart, AssemblyVertex};
pub use finalize::{finalize_report, FinalizeVertex};
pub use interview::{route_messages, ConductInterviewsVertex, InterviewRoute, InterviewRunner, EXPERT};
pub use planning::{PersonaVertex, RequirementsVertex};
pub use prompts::{PromptBuilder, ReportPrompts};
pub use review::{is_approved, route_feedback, FeedbackRoute, ReviewStage, ReviewVertex};
pub use schema::{PersonaPanel, RequirementsSummary, SearchQuery};
pub use state::{
    InterviewSeed, InterviewState, InterviewUpdate, Persona, RunState, RunUpdate, RUN_STATE_VERSION,
};
pub use workflow::{ReportWorkflow, ReportWorkflowBuilder, RunInput, RunOutcome};
