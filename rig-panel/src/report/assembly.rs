//! Report assembly
//!
//! Body, introduction and conclusion are three independent nodes that read
//! the same joined sections and run in the same superstep.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::error::ReportError;
use crate::llm::CompletionService;
use crate::pregel::{ComputeContext, ComputeResult, PregelError, Vertex, VertexId, WorkflowMessage};
use crate::state::Message;

use super::prompts::ReportPrompts;
use super::state::{RunState, RunUpdate};
use super::{WRITE_BODY, WRITE_CONCLUSION, WRITE_INTRODUCTION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyPart {
    Body,
    Introduction,
    Conclusion,
}

impl AssemblyPart {
    pub fn node(&self) -> &'static str {
        match self {
            AssemblyPart::Body => WRITE_BODY,
            AssemblyPart::Introduction => WRITE_INTRODUCTION,
            AssemblyPart::Conclusion => WRITE_CONCLUSION,
        }
    }

    fn messages(&self, topic: &str, sections: &str) -> [Message; 2] {
        match self {
            AssemblyPart::Body => [
                Message::system(ReportPrompts::body(topic, sections)),
                Message::human("Write a report based upon these memos."),
            ],
            AssemblyPart::Introduction => [
                Message::system(ReportPrompts::intro_conclusion(topic, sections)),
                Message::human("Write the report introduction"),
            ],
            AssemblyPart::Conclusion => [
                Message::system(ReportPrompts::intro_conclusion(topic, sections)),
                Message::human("Write the report conclusion"),
            ],
        }
    }

    fn update(&self, text: String) -> RunUpdate {
        match self {
            AssemblyPart::Body => RunUpdate {
                body: Some(text),
                ..Default::default()
            },
            AssemblyPart::Introduction => RunUpdate {
                introduction: Some(text),
                ..Default::default()
            },
            AssemblyPart::Conclusion => RunUpdate {
                conclusion: Some(text),
                ..Default::default()
            },
        }
    }
}

/// Write one part of the report from the collected sections.
pub async fn write_part(
    llm: &dyn CompletionService,
    part: AssemblyPart,
    state: &RunState,
) -> Result<String, ReportError> {
    if state.sections.is_empty() {
        return Err(ReportError::MissingField("sections"));
    }
    let reply = llm.complete(&part.messages(&state.topic, &state.joined_sections())).await?;
    Ok(reply.content)
}

pub struct AssemblyVertex {
    id: VertexId,
    part: AssemblyPart,
    llm: Arc<dyn CompletionService>,
}

impl AssemblyVertex {
    pub fn new(part: AssemblyPart, llm: Arc<dyn CompletionService>) -> Self {
        Self {
            id: VertexId::new(part.node()),
            part,
            llm,
        }
    }
}

#[async_trait]
impl Vertex<RunState, WorkflowMessage> for AssemblyVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, RunState, WorkflowMessage>,
    ) -> Result<ComputeResult<RunUpdate>, PregelError> {
        let text = write_part(self.llm.as_ref(), self.part, ctx.state)
            .await
            .map_err(|e| e.into_vertex_error(&self.id))?;
        info!(part = ?self.part, sections = ctx.state.sections.len(), "Report part written");
        Ok(ComputeResult::halt(self.part.update(text)))
    }
}
