//! Final report assembly
//!
//! Pure text transform, no model call.

use async_trait::async_trait;
use tracing::info;

use crate::error::ReportError;
use crate::pregel::{ComputeContext, ComputeResult, PregelError, Vertex, VertexId, WorkflowMessage};

use super::state::{RunState, RunUpdate};
use super::FINALIZE_REPORT;

const INSIGHTS_HEADER: &str = "## Insights";

const SOURCES_DELIMITER: &str = "\n## Sources\n";

const PART_SEPARATOR: &str = "\n\n---\n\n";

/// Split the body into content and its trailing source list.
///
/// Sources are only split off when the delimiter occurs exactly once.
fn split_sources(body: &str) -> (&str, Option<&str>) {
    let content = body.strip_prefix(INSIGHTS_HEADER).unwrap_or(body).trim_start();

    if content.matches(SOURCES_DELIMITER).count() != 1 {
        return (content, None);
    }
    match content.split_once(SOURCES_DELIMITER) {
        Some((content, sources)) => (content, Some(sources)),
        None => (content, None),
    }
}

/// Join introduction, body and conclusion into the final document.
pub fn finalize_report(introduction: &str, body: &str, conclusion: &str) -> String {
    let (content, sources) = split_sources(body);

    let mut report = format!("{introduction}{PART_SEPARATOR}{content}{PART_SEPARATOR}{conclusion}");
    if let Some(sources) = sources {
        report.push_str("\n\n## Sources\n");
        report.push_str(sources);
    }
    report
}

pub struct FinalizeVertex {
    id: VertexId,
}

impl Default for FinalizeVertex {
    fn default() -> Self {
        Self {
            id: VertexId::new(FINALIZE_REPORT),
        }
    }
}

#[async_trait]
impl Vertex<RunState, WorkflowMessage> for FinalizeVertex {
    fn id(&self) -> &VertexId {
        &self.id
    }

    async fn compute(
        &self,
        ctx: &mut ComputeContext<'_, RunState, WorkflowMessage>,
    ) -> Result<ComputeResult<RunUpdate>, PregelError> {
        let state = ctx.state;
        let field = |value: &Option<String>, name: &'static str| {
            value
                .clone()
                .ok_or(ReportError::MissingField(name))
                .map_err(|e| e.into_vertex_error(&self.id))
        };
        let introduction = field(&state.introduction, "introduction")?;
        let body = field(&state.body, "body")?;
        let conclusion = field(&state.conclusion, "conclusion")?;

        let report = finalize_report(&introduction, &body, &conclusion);
        info!(chars = report.len(), "Final report assembled");
        Ok(ComputeResult::complete(RunUpdate::final_report(report)))
    }
}
