//! Interview sub-workflow
//!
//! Each persona runs through its own small graph:
//!
//! ```text
//!                 ┌─▶ search_web ──────────┐
//! ask_question ───┤                        ├─▶ answer_question ──┬─▶ ask_question
//!                 └─▶ search_encyclopedia ─┘                     └─▶ save_interview ─▶ write_section ─▶ END
//! ```
//!
//! The two searches run in the same superstep and both append to the
//! evidence context before the answer is drafted. `answer_question` decides
//! whether to loop or wrap up with [`route_messages`].
//!
//! [`ConductInterviewsVertex`] is the top-level node that runs one such
//! graph per persona, concurrently, and collects the sections.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::evidence::{format_documents, EvidenceProvider, EvidenceSources};
use crate::llm::{complete_as, CompletionService};
use crate::pregel::{ComputeContext, ComputeResult, PregelError, Vertex, VertexId, WorkflowMessage};
use crate::state::{buffer_string, Message, Role};
use crate::workflow::{CompiledWorkflow, WorkflowGraph, END};

use super::prompts::{ReportPrompts, CLOSING_PHRASE};
use super::review::INTERVIEW_SEED;
use super::schema::SearchQuery;
use super::state::{InterviewSeed, InterviewState, InterviewUpdate, RunState, RunUpdate};
use super::{
    ANSWER_QUESTION, ASK_QUESTION, CONDUCT_INTERVIEWS, SAVE_INTERVIEW, SEARCH_ENCYCLOPEDIA, SEARCH_WEB,
    WRITE_SECTION,
};

/// Speaker name on every expert reply
pub const EXPERT: &str = "expert";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewRoute {
    AskQuestion,
    SaveInterview,
}

impl InterviewRoute {
    pub fn node(&self) -> &'static str {
        match self {
            InterviewRoute::AskQuestion => ASK_QUESTION,
            InterviewRoute::SaveInterview => SAVE_INTERVIEW,
        }
    }
}

/// Decide what follows an expert answer.
///
/// Wraps up once `max_turns` expert replies exist, or when the question
/// just answered (second to last message) contains the closing phrase.
pub fn route_messages(messages: &[Message], max_turns: usize) -> InterviewRoute {
    let answers = messages
        .iter()
        .filter(|m| m.role == Role::Ai && m.is_named(EXPERT))
        .count();
    if answers >= max_turns {
        return InterviewRoute::SaveInterview;
    }

    match messages.len().checked_sub(2).map(|i| &messages[i]) {
        Some(question) if question.content.contains(CLOSING_PHRASE) => InterviewRoute::SaveInterview,
        _ => InterviewRoute::AskQuestion,
    }
}

fn with_system(system: String, history: &[Message]) -> Vec<Message> {
    std::iter::once(Message::system(system))
        .chain(history.iter().cloned())
        .collect()
}

pub struct AskQuestionVertex {
    id: VertexId,
    llm: Arc<dyn CompletionService>,
}

impl AskQuestionVertex {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self {
            id: VertexId::new(ASK_QUESTION),
            llm,
        }
    }
}

#[async_trait]
impl Vertex<InterviewState, WorkflowMessage> for AskQuestionVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, InterviewState, WorkflowMessage>,
    ) -> Result<ComputeResult<InterviewUpdate>, PregelError> {
        let state = ctx.state;
        let messages = with_system(ReportPrompts::question(&state.persona.sheet()), &state.messages);
        let question = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| e.into_vertex_error(&self.id))?;

        debug!(persona = %state.persona.name, superstep = ctx.superstep, "Question asked");
        Ok(ComputeResult::halt(InterviewUpdate::message(question)))
    }
}

/// Derive a query from the conversation and fetch evidence for it.
pub struct SearchVertex {
    id: VertexId,
    llm: Arc<dyn CompletionService>,
    evidence: EvidenceSources,
    provider: EvidenceProvider,
    max_results: usize,
}

impl SearchVertex {
    pub fn new(
        llm: Arc<dyn CompletionService>,
        evidence: EvidenceSources,
        provider: EvidenceProvider,
        max_results: usize,
    ) -> Self {
        let id = match provider {
            EvidenceProvider::Web => SEARCH_WEB,
            EvidenceProvider::Encyclopedia => SEARCH_ENCYCLOPEDIA,
        };
        Self {
            id: VertexId::new(id),
            llm,
            evidence,
            provider,
            max_results,
        }
    }

    async fn search(&self, state: &InterviewState) -> Result<String, ReportError> {
        let messages = with_system(ReportPrompts::search(), &state.messages);
        let query: SearchQuery = complete_as(self.llm.as_ref(), &messages).await?;
        let documents = self
            .evidence
            .search(&query.search_query, self.provider, self.max_results)
            .await?;
        if documents.is_empty() {
            warn!(provider = %self.provider, query = %query.search_query, "Lookup returned no documents");
        }
        Ok(format_documents(&documents))
    }
}

#[async_trait]
impl Vertex<InterviewState, WorkflowMessage> for SearchVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, InterviewState, WorkflowMessage>,
    ) -> Result<ComputeResult<InterviewUpdate>, PregelError> {
        let blob = self.search(ctx.state).await.map_err(|e| e.into_vertex_error(&self.id))?;
        Ok(ComputeResult::halt(InterviewUpdate::context(blob)))
    }
}

pub struct AnswerQuestionVertex {
    id: VertexId,
    llm: Arc<dyn CompletionService>,
}

impl AnswerQuestionVertex {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self {
            id: VertexId::new(ANSWER_QUESTION),
            llm,
        }
    }
}

#[async_trait]
impl Vertex<InterviewState, WorkflowMessage> for AnswerQuestionVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, InterviewState, WorkflowMessage>,
    ) -> Result<ComputeResult<InterviewUpdate>, PregelError> {
        let state = ctx.state;
        let system = ReportPrompts::answer(&state.persona.sheet(), &state.joined_context());
        let reply = self
            .llm
            .complete(&with_system(system, &state.messages))
            .await
            .map_err(|e| e.into_vertex_error(&self.id))?;
        let reply = Message::ai(reply.content).with_name(EXPERT);

        // route on the history as it will be once this reply lands
        let mut history = state.messages.clone();
        history.push(reply.clone());
        let route = route_messages(&history, state.max_turns);
        debug!(persona = %state.persona.name, next = route.node(), "Expert answered");

        ctx.activate(route.node());
        Ok(ComputeResult::halt(InterviewUpdate::message(reply)))
    }
}

pub struct SaveInterviewVertex {
    id: VertexId,
}

impl Default for SaveInterviewVertex {
    fn default() -> Self {
        Self {
            id: VertexId::new(SAVE_INTERVIEW),
        }
    }
}

#[async_trait]
impl Vertex<InterviewState, WorkflowMessage> for SaveInterviewVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, InterviewState, WorkflowMessage>,
    ) -> Result<ComputeResult<InterviewUpdate>, PregelError> {
        Ok(ComputeResult::halt(InterviewUpdate {
            transcript: Some(buffer_string(&ctx.state.messages)),
            ..Default::default()
        }))
    }
}

pub struct WriteSectionVertex {
    id: VertexId,
    llm: Arc<dyn CompletionService>,
}

impl WriteSectionVertex {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self {
            id: VertexId::new(WRITE_SECTION),
            llm,
        }
    }
}

#[async_trait]
impl Vertex<InterviewState, WorkflowMessage> for WriteSectionVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, InterviewState, WorkflowMessage>,
    ) -> Result<ComputeResult<InterviewUpdate>, PregelError> {
        let state = ctx.state;
        let transcript = state
            .transcript
            .as_deref()
            .ok_or(ReportError::MissingField("transcript"))
            .map_err(|e| e.into_vertex_error(&self.id))?;

        let messages = [
            Message::system(ReportPrompts::section(&state.persona.description)),
            Message::human(format!(
                "Use this source to write your section: {}\n\nInterview transcript:\n{}",
                state.joined_context(),
                transcript
            )),
        ];
        let section = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| e.into_vertex_error(&self.id))?;

        Ok(ComputeResult::complete(InterviewUpdate {
            section: Some(section.content),
            ..Default::default()
        }))
    }
}

/// Builds and runs one interview graph per call.
pub struct InterviewRunner {
    llm: Arc<dyn CompletionService>,
    evidence: EvidenceSources,
    config: ReportConfig,
}

impl InterviewRunner {
    pub fn new(llm: Arc<dyn CompletionService>, evidence: EvidenceSources, config: ReportConfig) -> Self {
        Self { llm, evidence, config }
    }

    fn compile(&self, max_turns: usize) -> Result<CompiledWorkflow<InterviewState>, ReportError> {
        let graph = WorkflowGraph::<InterviewState>::new()
            .name("interview")
            .node(Arc::new(AskQuestionVertex::new(self.llm.clone())))
            .node(Arc::new(SearchVertex::new(
                self.llm.clone(),
                self.evidence.clone(),
                EvidenceProvider::Web,
                self.config.web_results,
            )))
            .node(Arc::new(SearchVertex::new(
                self.llm.clone(),
                self.evidence.clone(),
                EvidenceProvider::Encyclopedia,
                self.config.encyclopedia_results,
            )))
            .node(Arc::new(AnswerQuestionVertex::new(self.llm.clone())))
            .node(Arc::new(SaveInterviewVertex::default()))
            .node(Arc::new(WriteSectionVertex::new(self.llm.clone())))
            .entry(ASK_QUESTION)
            .edge(ASK_QUESTION, SEARCH_WEB)
            .edge(ASK_QUESTION, SEARCH_ENCYCLOPEDIA)
            .edge(SEARCH_WEB, ANSWER_QUESTION)
            .edge(SEARCH_ENCYCLOPEDIA, ANSWER_QUESTION)
            .branches(ANSWER_QUESTION, &[ASK_QUESTION, SAVE_INTERVIEW])
            .edge(SAVE_INTERVIEW, WRITE_SECTION)
            .edge(WRITE_SECTION, END)
            .build()
            .map_err(|e| ReportError::Workflow(PregelError::config_error(e.to_string())))?;

        Ok(CompiledWorkflow::compile(graph, self.config.interview_pregel_config(max_turns)))
    }

    /// Run one interview to completion and return its final state.
    pub async fn run(&self, state: InterviewState) -> Result<InterviewState, ReportError> {
        let mut workflow = self.compile(state.max_turns)?;
        let result = workflow.run(state).await.map_err(ReportError::from_pregel)?;

        if result.state.section.is_none() {
            return Err(ReportError::MissingField("section"));
        }
        Ok(result.state)
    }
}

/// Runs every seeded interview concurrently and collects their sections.
///
/// All interviews run to the end; if any failed, the first failure (in
/// seed order) fails the node.
pub struct ConductInterviewsVertex {
    id: VertexId,
    runner: Arc<InterviewRunner>,
    max_turns: usize,
    concurrency: Option<usize>,
}

impl ConductInterviewsVertex {
    pub fn new(runner: Arc<InterviewRunner>, config: &ReportConfig) -> Self {
        Self {
            id: VertexId::new(CONDUCT_INTERVIEWS),
            runner,
            max_turns: config.max_turns,
            concurrency: config.interview_concurrency,
        }
    }

    async fn conduct(&self, topic: &str, seeds: Vec<InterviewSeed>) -> Result<Vec<String>, ReportError> {
        let limit = self.concurrency.unwrap_or(seeds.len()).max(1);
        info!(interviews = seeds.len(), limit, "Conducting interviews");

        let tasks = seeds.into_iter().enumerate().map(|(index, seed)| {
            let runner = Arc::clone(&self.runner);
            let persona = seed.persona.name.clone();
            let state = InterviewState::seeded(seed, topic, self.max_turns);
            async move {
                info!(persona = %persona, "Interview started");
                let outcome = runner.run(state).await;
                (index, persona, outcome)
            }
        });

        let outcomes: Vec<_> = stream::iter(tasks)
            .buffer_unordered(limit)
            .collect()
            .await;

        // arrival order for sections, seed order for picking the reported failure
        let mut sections = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (index, persona, outcome) in outcomes {
            match outcome {
                Ok(state) => {
                    info!(persona = %persona, turns = state.messages.len(), "Interview finished");
                    sections.extend(state.section);
                }
                Err(e) => {
                    warn!(persona = %persona, error = %e, "Interview failed");
                    failures.push((index, persona, e));
                }
            }
        }

        failures.sort_by_key(|(index, _, _)| *index);
        match failures.into_iter().next() {
            Some((_, persona, source)) => Err(ReportError::InterviewFailed {
                persona,
                source: Box::new(source),
            }),
            None => Ok(sections),
        }
    }
}

fn decode_seeds(messages: &[WorkflowMessage]) -> Result<Vec<InterviewSeed>, ReportError> {
    messages
        .iter()
        .filter_map(|m| m.decode::<InterviewSeed>(INTERVIEW_SEED))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ReportError::InvalidInput(format!("malformed interview seed: {}", e)))
}

#[async_trait]
impl Vertex<RunState, WorkflowMessage> for ConductInterviewsVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, RunState, WorkflowMessage>,
    ) -> Result<ComputeResult<RunUpdate>, PregelError> {
        let seeds = decode_seeds(ctx.messages).map_err(|e| e.into_vertex_error(&self.id))?;
        if seeds.is_empty() {
            return Err(ReportError::MissingField("interview seeds").into_vertex_error(&self.id));
        }

        let sections = self
            .conduct(&ctx.state.topic, seeds)
            .await
            .map_err(|e| e.into_vertex_error(&self.id))?;

        Ok(ComputeResult::halt(RunUpdate::sections(sections)))
    }
}
