//! Requirements and persona synthesis stages
//!
//! Both stages make one structured completion and overwrite their field in
//! [`RunState`]. A schema violation is fatal to the stage.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ReportError;
use crate::llm::{complete_as, CompletionService};
use crate::pregel::{ComputeContext, ComputeResult, PregelError, Vertex, VertexId, WorkflowMessage};
use crate::state::Message;

use super::prompts::ReportPrompts;
use super::review::is_approved;
use super::schema::{PersonaPanel, RequirementsSummary};
use super::state::{Persona, RunState, RunUpdate};
use super::{CREATE_PERSONAS, PROCESS_REQUIREMENTS};

/// Feedback text to show the model; approval carries no instructions.
fn revision_feedback(state: &RunState) -> &str {
    match state.human_feedback.as_deref() {
        Some(feedback) if !is_approved(Some(feedback)) => feedback,
        _ => "",
    }
}

/// Turn the topic and any feedback into a requirements summary.
pub async fn process_requirements(llm: &dyn CompletionService, state: &RunState) -> Result<String, ReportError> {
    if state.topic.trim().is_empty() {
        return Err(ReportError::MissingField("topic"));
    }

    let messages = [
        Message::system(ReportPrompts::requirements(
            &state.topic,
            revision_feedback(state),
            state.max_personas,
        )),
        Message::human("Process the requirements."),
    ];
    let summary: RequirementsSummary = complete_as(llm, &messages).await?;
    Ok(summary.requirements)
}

/// Synthesize at most `max_personas` personas from the requirements.
pub async fn create_personas(llm: &dyn CompletionService, state: &RunState) -> Result<Vec<Persona>, ReportError> {
    let requirements = state
        .requirements
        .as_deref()
        .ok_or(ReportError::MissingField("requirements"))?;

    let messages = [
        Message::system(ReportPrompts::personas(
            &state.topic,
            requirements,
            revision_feedback(state),
            state.max_personas,
        )),
        Message::human("Generate the set of developers."),
    ];
    let panel: PersonaPanel = complete_as(llm, &messages).await?;

    let mut personas = panel.personas;
    if personas.len() > state.max_personas {
        warn!(
            returned = personas.len(),
            max = state.max_personas,
            "Model exceeded the panel size, truncating"
        );
        personas.truncate(state.max_personas);
    }
    Ok(personas)
}

pub struct RequirementsVertex {
    id: VertexId,
    llm: Arc<dyn CompletionService>,
}

impl RequirementsVertex {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self {
            id: VertexId::new(PROCESS_REQUIREMENTS),
            llm,
        }
    }
}

#[async_trait]
impl Vertex<RunState, WorkflowMessage> for RequirementsVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, RunState, WorkflowMessage>,
    ) -> Result<ComputeResult<RunUpdate>, PregelError> {
        let requirements = process_requirements(self.llm.as_ref(), ctx.state)
            .await
            .map_err(|e| e.into_vertex_error(&self.id))?;
        info!(topic = %ctx.state.topic, chars = requirements.len(), "Requirements drafted");
        Ok(ComputeResult::halt(RunUpdate::requirements(requirements)))
    }
}

pub struct PersonaVertex {
    id: VertexId,
    llm: Arc<dyn CompletionService>,
}

impl PersonaVertex {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self {
            id: VertexId::new(CREATE_PERSONAS),
            llm,
        }
    }
}

#[async_trait]
impl Vertex<RunState, WorkflowMessage> for PersonaVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, RunState, WorkflowMessage>,
    ) -> Result<ComputeResult<RunUpdate>, PregelError> {
        let personas = create_personas(self.llm.as_ref(), ctx.state)
            .await
            .map_err(|e| e.into_vertex_error(&self.id))?;
        info!(count = personas.len(), "Persona panel created");
        Ok(ComputeResult::halt(RunUpdate::personas(personas)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pregel::VertexState;
    use crate::report::testing::FakeLlm;
    use serde_json::json;

    fn drafted() -> RunState {
        let mut state = RunState::new("habit-tracking app", 2);
        state.requirements = Some("- streaks\n- reminders".into());
        state
    }

    #[tokio::test]
    async fn test_requirements_prompt_carries_feedback() {
        let llm = FakeLlm::new(2);
        let state = RunState::new("habit-tracking app", 2).with_feedback("Focus on privacy");

        let requirements = process_requirements(&llm, &state).await.unwrap();
        assert!(!requirements.is_empty());

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][0].content.contains("habit-tracking app"));
        assert!(calls[0][0].content.contains("Focus on privacy"));
        assert_eq!(calls[0][1].content, "Process the requirements.");
    }

    #[tokio::test]
    async fn test_approval_is_not_passed_as_feedback() {
        let llm = FakeLlm::new(2);
        let state = RunState::new("habit-tracking app", 2).with_feedback("approve");

        process_requirements(&llm, &state).await.unwrap();
        assert!(!llm.calls()[0][0].content.contains("approve"));
    }

    #[tokio::test]
    async fn test_requirements_need_topic() {
        let err = process_requirements(&FakeLlm::new(2), &RunState::new("  ", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::MissingField("topic")));
    }

    #[tokio::test]
    async fn test_persona_count_capped() {
        for panel_size in 1..=4 {
            let llm = FakeLlm::new(5);
            let mut state = drafted();
            state.max_personas = panel_size;

            let personas = create_personas(&llm, &state).await.unwrap();
            assert_eq!(personas.len(), panel_size);
        }
    }

    #[tokio::test]
    async fn test_personas_need_requirements() {
        let err = create_personas(&FakeLlm::new(2), &RunState::new("habit-tracking app", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::MissingField("requirements")));
    }

    #[tokio::test]
    async fn test_schema_violation_surfaces_from_vertex() {
        let llm = FakeLlm::new(2).with_structured("PersonaPanel", json!({ "developers": [] }));
        let vertex = PersonaVertex::new(Arc::new(llm));
        let state = drafted();
        let mut ctx = ComputeContext::<RunState, WorkflowMessage>::new(CREATE_PERSONAS.into(), &[], 0, &state);

        let err = vertex.compute(&mut ctx).await.unwrap_err();
        assert!(matches!(
            ReportError::from_pregel(err),
            ReportError::SchemaViolation { schema, .. } if schema == "PersonaPanel"
        ));
    }

    #[tokio::test]
    async fn test_requirements_vertex_halts_with_update() {
        let vertex = RequirementsVertex::new(Arc::new(FakeLlm::new(2)));
        let state = RunState::new("habit-tracking app", 2);
        let mut ctx =
            ComputeContext::<RunState, WorkflowMessage>::new(PROCESS_REQUIREMENTS.into(), &[], 0, &state);

        let result = vertex.compute(&mut ctx).await.unwrap();
        assert_eq!(result.state, VertexState::Halted);
        assert!(result.update.requirements.is_some());
    }
}
