//! Human review checkpoints and the fan-out controller
//!
//! `review_requirements` and `review_personas` do no work of their own. The
//! graph pauses before each of them; once resumed they read the feedback
//! and either send the run back for revision or move it forward. Moving past
//! the persona review fans out one interview per persona.

use async_trait::async_trait;
use tracing::info;

use crate::error::ReportError;
use crate::pregel::{ComputeContext, ComputeResult, PregelError, Vertex, VertexId, WorkflowMessage};

use super::state::{InterviewSeed, RunState, RunUpdate};
use super::{CONDUCT_INTERVIEWS, CREATE_PERSONAS, PROCESS_REQUIREMENTS, REVIEW_PERSONAS, REVIEW_REQUIREMENTS};

/// Message key carrying one [`InterviewSeed`]
pub const INTERVIEW_SEED: &str = "interview_seed";

/// Feedback value that lets the run proceed
pub const APPROVE: &str = "approve";

/// Absent, blank, or `approve` (any case) counts as approval.
pub fn is_approved(feedback: Option<&str>) -> bool {
    match feedback.map(|f| f.trim().to_lowercase()) {
        None => true,
        Some(f) => f.is_empty() || f == APPROVE,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStage {
    Requirements,
    Personas,
}

impl ReviewStage {
    pub fn node(&self) -> &'static str {
        match self {
            ReviewStage::Requirements => REVIEW_REQUIREMENTS,
            ReviewStage::Personas => REVIEW_PERSONAS,
        }
    }
}

/// Where a review sends the run
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackRoute {
    /// Regenerate with the feedback
    Revise(&'static str),
    Proceed(&'static str),
    /// One interview per persona
    FanOut(Vec<InterviewSeed>),
}

pub fn route_feedback(stage: ReviewStage, state: &RunState) -> Result<FeedbackRoute, ReportError> {
    let approved = is_approved(state.human_feedback.as_deref());
    match (stage, approved) {
        (ReviewStage::Requirements, false) => Ok(FeedbackRoute::Revise(PROCESS_REQUIREMENTS)),
        (ReviewStage::Requirements, true) => Ok(FeedbackRoute::Proceed(CREATE_PERSONAS)),
        (ReviewStage::Personas, false) => Ok(FeedbackRoute::Revise(CREATE_PERSONAS)),
        (ReviewStage::Personas, true) => {
            if state.personas.is_empty() {
                return Err(ReportError::MissingField("personas"));
            }
            let seeds = state
                .personas
                .iter()
                .map(|persona| InterviewSeed::opening(persona.clone(), &state.topic))
                .collect();
            Ok(FeedbackRoute::FanOut(seeds))
        }
    }
}

pub struct ReviewVertex {
    id: VertexId,
    stage: ReviewStage,
}

impl ReviewVertex {
    pub fn new(stage: ReviewStage) -> Self {
        Self {
            id: VertexId::new(stage.node()),
            stage,
        }
    }
}

#[async_trait]
impl Vertex<RunState, WorkflowMessage> for ReviewVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, RunState, WorkflowMessage>,
    ) -> Result<ComputeResult<RunUpdate>, PregelError> {
        let route = route_feedback(self.stage, ctx.state).map_err(|e| e.into_vertex_error(&self.id))?;

        match route {
            FeedbackRoute::Revise(target) => {
                info!(stage = ?self.stage, feedback = ?ctx.state.human_feedback, "Revision requested");
                ctx.activate(target);
            }
            FeedbackRoute::Proceed(target) => {
                info!(stage = ?self.stage, next = target, "Approved");
                ctx.activate(target);
            }
            FeedbackRoute::FanOut(seeds) => {
                info!(stage = ?self.stage, interviews = seeds.len(), "Approved, starting interviews");
                for seed in seeds {
                    ctx.send_message(CONDUCT_INTERVIEWS, WorkflowMessage::data(INTERVIEW_SEED, seed));
                }
            }
        }

        Ok(ComputeResult::halt(RunUpdate::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::state::Persona;

    fn panel_state(feedback: Option<&str>) -> RunState {
        let mut state = RunState::new("habit-tracking app", 2);
        state.personas = vec![
            Persona::new("Ana", "Designer", "Studio", "Onboarding"),
            Persona::new("Ben", "Engineer", "Studio", "Sync"),
        ];
        state.human_feedback = feedback.map(str::to_string);
        state
    }

    #[test]
    fn test_is_approved() {
        assert!(is_approved(None));
        assert!(is_approved(Some("")));
        assert!(is_approved(Some("  Approve \n")));
        assert!(!is_approved(Some("please add more detail")));
        assert!(!is_approved(Some("approved")));
    }

    #[test]
    fn test_requirements_routes() {
        let state = RunState::new("habit-tracking app", 2);
        assert_eq!(
            route_feedback(ReviewStage::Requirements, &state.clone().with_feedback("")).unwrap(),
            FeedbackRoute::Proceed(CREATE_PERSONAS)
        );
        assert_eq!(
            route_feedback(ReviewStage::Requirements, &state.with_feedback("please add more detail")).unwrap(),
            FeedbackRoute::Revise(PROCESS_REQUIREMENTS)
        );
    }

    #[test]
    fn test_persona_approval_fans_out_one_seed_each() {
        let route = route_feedback(ReviewStage::Personas, &panel_state(Some("approve"))).unwrap();
        let FeedbackRoute::FanOut(seeds) = route else {
            panic!("expected fan-out, got {:?}", route);
        };

        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[1].persona.name, "Ben");
        for seed in &seeds {
            assert_eq!(seed.messages.len(), 1);
            assert!(seed.messages[0].content.contains("habit-tracking app"));
        }
    }

    #[test]
    fn test_persona_rejection_and_empty_panel() {
        assert_eq!(
            route_feedback(ReviewStage::Personas, &panel_state(Some("please add more detail"))).unwrap(),
            FeedbackRoute::Revise(CREATE_PERSONAS)
        );

        let empty = RunState::new("habit-tracking app", 2);
        assert!(matches!(
            route_feedback(ReviewStage::Personas, &empty),
            Err(ReportError::MissingField("personas"))
        ));
    }

    #[tokio::test]
    async fn test_vertex_sends_seeds_to_interviews() {
        let vertex = ReviewVertex::new(ReviewStage::Personas);
        let state = panel_state(None);
        let mut ctx = ComputeContext::<RunState, WorkflowMessage>::new(REVIEW_PERSONAS.into(), &[], 3, &state);

        let result = vertex.compute(&mut ctx).await.unwrap();
        assert!(result.update.personas.is_none());

        let outbox = ctx.into_outbox();
        let seeds: Vec<InterviewSeed> = outbox[&VertexId::new(CONDUCT_INTERVIEWS)]
            .iter()
            .filter_map(|m| m.decode(INTERVIEW_SEED))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(seeds.len(), 2);
    }

    #[tokio::test]
    async fn test_vertex_loops_back_on_feedback() {
        let vertex = ReviewVertex::new(ReviewStage::Requirements);
        let state = RunState::new("habit-tracking app", 2).with_feedback("needs offline mode");
        let mut ctx =
            ComputeContext::<RunState, WorkflowMessage>::new(REVIEW_REQUIREMENTS.into(), &[], 1, &state);

        vertex.compute(&mut ctx).await.unwrap();

        let outbox = ctx.into_outbox();
        assert_eq!(
            outbox[&VertexId::new(PROCESS_REQUIREMENTS)],
            vec![WorkflowMessage::Activate]
        );
    }
}
