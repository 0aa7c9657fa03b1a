//! The top-level report workflow
//!
//! Wires planning, review, interviews and assembly into one checkpointed
//! graph. A run pauses before each review node; [`ReportWorkflow::resume`]
//! continues it with the reviewer's feedback.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::evidence::EvidenceSources;
use crate::llm::CompletionService;
use crate::pregel::{
    create_checkpointer, Checkpointer, CheckpointerConfig, PregelError, VertexId, WorkflowResult,
};
use crate::workflow::{BuiltWorkflowGraph, CompiledWorkflow, WorkflowBuildError, WorkflowGraph, END};

use super::assembly::{AssemblyPart, AssemblyVertex};
use super::finalize::FinalizeVertex;
use super::interview::{ConductInterviewsVertex, InterviewRunner};
use super::planning::{PersonaVertex, RequirementsVertex};
use super::review::{ReviewStage, ReviewVertex};
use super::state::{RunState, RUN_STATE_VERSION};
use super::{
    CONDUCT_INTERVIEWS, CREATE_PERSONAS, FINALIZE_REPORT, PROCESS_REQUIREMENTS, REVIEW_PERSONAS,
    REVIEW_REQUIREMENTS, WRITE_BODY, WRITE_CONCLUSION, WRITE_INTRODUCTION,
};

/// What a caller supplies to start a run
#[derive(Debug, Clone)]
pub struct RunInput {
    pub topic: String,
    pub max_personas: usize,
    pub human_feedback: Option<String>,
}

impl RunInput {
    pub fn new(topic: impl Into<String>, max_personas: usize) -> Self {
        Self {
            topic: topic.into(),
            max_personas,
            human_feedback: None,
        }
    }

    fn validate(&self) -> Result<(), ReportError> {
        if self.topic.trim().is_empty() {
            return Err(ReportError::InvalidInput("topic must not be empty".into()));
        }
        if self.max_personas == 0 {
            return Err(ReportError::InvalidInput("max_personas must be at least 1".into()));
        }
        Ok(())
    }
}

/// How a call to `start` or `resume` ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Paused before a review node; resume to continue.
    Interrupted { at: VertexId, state: RunState },
    Completed(RunState),
}

impl RunOutcome {
    pub fn state(&self) -> &RunState {
        match self {
            RunOutcome::Interrupted { state, .. } => state,
            RunOutcome::Completed(state) => state,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn final_report(&self) -> Option<&str> {
        self.state().final_report.as_deref()
    }

    fn from_result(result: WorkflowResult<RunState>) -> Result<Self, ReportError> {
        match result.interrupted {
            Some(at) => Ok(RunOutcome::Interrupted { at, state: result.state }),
            None if result.state.final_report.is_some() => Ok(RunOutcome::Completed(result.state)),
            None => Err(ReportError::MissingField("final_report")),
        }
    }
}

/// Builder for [`ReportWorkflow`]
pub struct ReportWorkflowBuilder {
    llm: Arc<dyn CompletionService>,
    evidence: EvidenceSources,
    config: ReportConfig,
    checkpointer: Option<Arc<dyn Checkpointer<RunState>>>,
    store: CheckpointerConfig,
    workflow_id: Option<String>,
}

impl ReportWorkflowBuilder {
    pub fn new(llm: Arc<dyn CompletionService>, evidence: EvidenceSources) -> Self {
        Self {
            llm,
            evidence,
            config: ReportConfig::default(),
            checkpointer: None,
            store: CheckpointerConfig::Memory,
            workflow_id: None,
        }
    }

    pub fn config(mut self, config: ReportConfig) -> Self {
        self.config = config;
        self
    }

    /// Where checkpoints go when no checkpointer is given. In memory unless set.
    pub fn checkpoint_store(mut self, store: CheckpointerConfig) -> Self {
        self.store = store;
        self
    }

    /// Use this checkpointer instead of one built from the store config.
    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer<RunState>>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Reuse an existing id to resume a run saved by another process.
    pub fn workflow_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn build(self) -> Result<ReportWorkflow, ReportError> {
        let graph = build_graph(self.llm, self.evidence, &self.config)
            .map_err(|e| ReportError::Workflow(PregelError::config_error(e.to_string())))?;

        let workflow_id = self
            .workflow_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let checkpointer: Arc<dyn Checkpointer<RunState>> = match self.checkpointer {
            Some(checkpointer) => checkpointer,
            None => Arc::from(create_checkpointer::<RunState>(self.store, &workflow_id)),
        };

        let workflow = CompiledWorkflow::compile_with_checkpointer(
            graph,
            self.config.pregel_config(),
            checkpointer,
            workflow_id,
        );
        Ok(ReportWorkflow { workflow })
    }
}

fn build_graph(
    llm: Arc<dyn CompletionService>,
    evidence: EvidenceSources,
    config: &ReportConfig,
) -> Result<BuiltWorkflowGraph<RunState>, WorkflowBuildError> {
    let runner = Arc::new(InterviewRunner::new(llm.clone(), evidence, config.clone()));

    WorkflowGraph::<RunState>::new()
        .name("panel_report")
        .node(Arc::new(RequirementsVertex::new(llm.clone())))
        .node(Arc::new(ReviewVertex::new(ReviewStage::Requirements)))
        .node(Arc::new(PersonaVertex::new(llm.clone())))
        .node(Arc::new(ReviewVertex::new(ReviewStage::Personas)))
        .node(Arc::new(ConductInterviewsVertex::new(runner, config)))
        .node(Arc::new(AssemblyVertex::new(AssemblyPart::Body, llm.clone())))
        .node(Arc::new(AssemblyVertex::new(AssemblyPart::Introduction, llm.clone())))
        .node(Arc::new(AssemblyVertex::new(AssemblyPart::Conclusion, llm)))
        .node(Arc::new(FinalizeVertex::default()))
        .entry(PROCESS_REQUIREMENTS)
        .edge(PROCESS_REQUIREMENTS, REVIEW_REQUIREMENTS)
        .branches(REVIEW_REQUIREMENTS, &[PROCESS_REQUIREMENTS, CREATE_PERSONAS])
        .edge(CREATE_PERSONAS, REVIEW_PERSONAS)
        .branches(REVIEW_PERSONAS, &[CREATE_PERSONAS, CONDUCT_INTERVIEWS])
        .edge(CONDUCT_INTERVIEWS, WRITE_BODY)
        .edge(CONDUCT_INTERVIEWS, WRITE_INTRODUCTION)
        .edge(CONDUCT_INTERVIEWS, WRITE_CONCLUSION)
        .edge(WRITE_BODY, FINALIZE_REPORT)
        .edge(WRITE_INTRODUCTION, FINALIZE_REPORT)
        .edge(WRITE_CONCLUSION, FINALIZE_REPORT)
        .edge(FINALIZE_REPORT, END)
        .interrupt_before(REVIEW_REQUIREMENTS)
        .interrupt_before(REVIEW_PERSONAS)
        .build()
}

/// A resumable report run
pub struct ReportWorkflow {
    workflow: CompiledWorkflow<RunState>,
}

impl ReportWorkflow {
    pub fn builder(llm: Arc<dyn CompletionService>, evidence: EvidenceSources) -> ReportWorkflowBuilder {
        ReportWorkflowBuilder::new(llm, evidence)
    }

    pub fn workflow_id(&self) -> &str {
        self.workflow.workflow_id()
    }

    /// Start a fresh run. It stops at the requirements review.
    pub async fn start(&mut self, input: RunInput) -> Result<RunOutcome, ReportError> {
        input.validate()?;
        info!(workflow_id = %self.workflow_id(), topic = %input.topic, panel = input.max_personas, "Starting report run");

        let mut state = RunState::new(input.topic, input.max_personas);
        state.human_feedback = input.human_feedback;

        let result = self.workflow.run(state).await.map_err(ReportError::from_pregel)?;
        RunOutcome::from_result(result)
    }

    /// Continue a paused run. `None` or `"approve"` approves; anything else
    /// is sent back as revision feedback.
    pub async fn resume(&mut self, feedback: Option<String>) -> Result<RunOutcome, ReportError> {
        let checkpoint = self
            .workflow
            .latest_checkpoint()
            .await?
            .ok_or_else(|| PregelError::NothingToResume(self.workflow_id().to_string()))?;
        if checkpoint.state.version != RUN_STATE_VERSION {
            return Err(ReportError::IncompatibleState {
                expected: RUN_STATE_VERSION,
                found: checkpoint.state.version,
            });
        }
        info!(
            workflow_id = %self.workflow_id(),
            at = ?checkpoint.interrupted_at(),
            feedback = ?feedback,
            "Resuming report run"
        );

        let result = self
            .workflow
            .resume_with(move |mut state| {
                state.human_feedback = feedback;
                state
            })
            .await
            .map_err(ReportError::from_pregel)?;
        RunOutcome::from_result(result)
    }

    /// The review node the saved run is waiting at, if any.
    pub async fn pending(&self) -> Result<Option<VertexId>, ReportError> {
        Ok(self
            .workflow
            .latest_checkpoint()
            .await?
            .and_then(|cp| cp.interrupted_at()))
    }

    /// State as of the latest checkpoint
    pub async fn pending_state(&self) -> Result<Option<RunState>, ReportError> {
        Ok(self.workflow.latest_checkpoint().await?.map(|cp| cp.state))
    }

    /// Receive `(superstep, state)` after every superstep of later calls.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<(usize, RunState)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.workflow.set_snapshot_sender(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceDocument;
    use crate::pregel::{Checkpoint, MemoryCheckpointer};
    use crate::report::testing::{FakeLlm, FixedLookup};
    use static_assertions::assert_impl_all;

    assert_impl_all!(ReportWorkflow: Send);

    fn workflow(llm: FakeLlm) -> ReportWorkflow {
        let lookup = Arc::new(FixedLookup::new(vec![EvidenceDocument::new(
            "https://example.com/streaks",
            "Streaks lift retention.",
        )]));
        ReportWorkflow::builder(Arc::new(llm), EvidenceSources::new(lookup.clone(), lookup))
            .config(ReportConfig::default().with_max_turns(1))
            .workflow_id("wf-test")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_pauses_before_each_review_then_completes() {
        let mut run = workflow(FakeLlm::new(2));

        let outcome = run.start(RunInput::new("habit-tracking app", 2)).await.unwrap();
        let RunOutcome::Interrupted { at, state } = outcome else {
            panic!("expected a pause");
        };
        assert_eq!(at.as_str(), REVIEW_REQUIREMENTS);
        assert!(state.requirements.is_some());
        assert_eq!(run.pending().await.unwrap(), Some(VertexId::new(REVIEW_REQUIREMENTS)));

        let outcome = run.resume(None).await.unwrap();
        let RunOutcome::Interrupted { at, state } = outcome else {
            panic!("expected a pause");
        };
        assert_eq!(at.as_str(), REVIEW_PERSONAS);
        assert_eq!(state.personas.len(), 2);

        let outcome = run.resume(Some("approve".into())).await.unwrap();
        assert!(outcome.is_completed());
        let state = outcome.state();
        assert_eq!(state.sections.len(), 2);
        let report = outcome.final_report().unwrap();
        assert!(report.contains("\n\n---\n\n"));
        assert!(report.ends_with("[1] https://example.com/streaks"));
        assert_eq!(run.pending().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejection_regenerates_requirements() {
        let llm = Arc::new(FakeLlm::new(1));
        let lookup = Arc::new(FixedLookup::new(vec![]));
        let mut run = ReportWorkflow::builder(llm.clone(), EvidenceSources::new(lookup.clone(), lookup))
            .build()
            .unwrap();

        run.start(RunInput::new("habit-tracking app", 1)).await.unwrap();
        let outcome = run.resume(Some("please add more detail".into())).await.unwrap();

        let RunOutcome::Interrupted { at, state } = outcome else {
            panic!("expected a pause");
        };
        assert_eq!(at.as_str(), REVIEW_REQUIREMENTS);
        assert!(state.personas.is_empty());

        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1][0].content.contains("please add more detail"));
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint() {
        let mut run = workflow(FakeLlm::new(1));
        let err = run.resume(None).await.unwrap_err();
        assert!(matches!(err, ReportError::Workflow(PregelError::NothingToResume(id)) if id == "wf-test"));
    }

    #[tokio::test]
    async fn test_failed_run_continues_from_last_checkpoint() {
        let checkpointer = Arc::new(MemoryCheckpointer::<RunState>::new());
        let lookup = Arc::new(FixedLookup::new(vec![]));
        let reopen = |llm: FakeLlm| {
            ReportWorkflow::builder(Arc::new(llm), EvidenceSources::new(lookup.clone(), lookup.clone()))
                .config(ReportConfig::default().with_max_turns(1))
                .checkpointer(checkpointer.clone())
                .workflow_id("wf-retry")
                .build()
                .unwrap()
        };

        let mut run = reopen(FakeLlm::new(2).failing_for("Name: Dev 2"));
        run.start(RunInput::new("habit-tracking app", 2)).await.unwrap();
        run.resume(None).await.unwrap();
        let err = run.resume(None).await.unwrap_err();
        assert!(matches!(err, ReportError::InterviewFailed { ref persona, .. } if persona == "Dev 2"));

        // saved after the panel review, not at a pause
        assert_eq!(run.pending().await.unwrap(), None);
        let saved = run.pending_state().await.unwrap().expect("checkpoint");
        assert_eq!(saved.personas.len(), 2);
        assert!(saved.final_report.is_none());

        let outcome = reopen(FakeLlm::new(2)).resume(None).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.state().sections.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let mut run = workflow(FakeLlm::new(1));
        assert!(matches!(
            run.start(RunInput::new("  ", 2)).await,
            Err(ReportError::InvalidInput(_))
        ));
        assert!(matches!(
            run.start(RunInput::new("habits", 0)).await,
            Err(ReportError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_incompatible_checkpoint_is_refused() {
        let checkpointer = Arc::new(MemoryCheckpointer::<RunState>::new());
        let mut stale = RunState::new("habits", 1);
        stale.version = RUN_STATE_VERSION + 1;
        checkpointer
            .save(&Checkpoint::new(
                "wf-old",
                1,
                stale,
                Default::default(),
                Default::default(),
            ))
            .await
            .unwrap();

        let lookup = Arc::new(FixedLookup::new(vec![]));
        let mut run = ReportWorkflow::builder(Arc::new(FakeLlm::new(1)), EvidenceSources::new(lookup.clone(), lookup))
            .checkpointer(checkpointer)
            .workflow_id("wf-old")
            .build()
            .unwrap();

        assert!(matches!(
            run.resume(None).await,
            Err(ReportError::IncompatibleState { found, .. }) if found == RUN_STATE_VERSION + 1
        ));
    }
}
